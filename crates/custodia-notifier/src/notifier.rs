//! Bounded broadcast of settlement events.
//!
//! Built on `tokio::sync::broadcast`: every subscriber sees every event
//! unless it falls more than `capacity` events behind, in which case the
//! oldest events are overwritten for that subscriber alone. Publishers are
//! never slowed by a slow subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use custodia_types::{NotifierConfig, SettlementEvent};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time publish counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotifierStats {
    /// Events handed to at least one subscriber.
    pub published: u64,
    /// Events dropped because nobody was subscribed.
    pub dropped: u64,
}

/// Cloneable handle used by the ledger, exchange and casino to publish
/// committed events.
#[derive(Debug, Clone)]
pub struct SettlementNotifier {
    sender: broadcast::Sender<SettlementEvent>,
    counters: Arc<Counters>,
}

impl SettlementNotifier {
    /// Create a notifier whose subscribers buffer at most `capacity` events.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            counters: Arc::new(Counters::default()),
        }
    }

    #[must_use]
    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Publish one event. Never blocks and never fails the caller.
    pub fn publish(&self, event: SettlementEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                debug!(event = name, receivers, "settlement event published");
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(event = name, "no subscribers, settlement event dropped");
            }
        }
    }

    /// Open a new subscription. It sees only events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            lagged: 0,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn stats(&self) -> NotifierStats {
        NotifierStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for SettlementNotifier {
    fn default() -> Self {
        Self::from_config(&NotifierConfig::default())
    }
}

/// Receiving end of a [`SettlementNotifier`].
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<SettlementEvent>,
    lagged: u64,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once every notifier handle is
    /// gone and the buffer is drained.
    ///
    /// Overwritten events are skipped and counted in [`Self::lagged`].
    pub async fn recv(&mut self) -> Option<SettlementEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => self.record_lag(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<SettlementEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(missed)) => self.record_lag(missed),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<SettlementEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Total events this subscriber missed by falling behind.
    #[must_use]
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    fn record_lag(&mut self, missed: u64) {
        self.lagged += missed;
        warn!(missed, total = self.lagged, "settlement subscriber lagging");
    }
}
