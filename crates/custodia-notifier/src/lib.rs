//! # custodia-notifier
//!
//! Fan-out of [`SettlementEvent`](custodia_types::SettlementEvent)s to
//! external consumers (real-time transports, audit tails).
//!
//! Delivery is at-most-once and best-effort. Publishing happens after a
//! ledger commit, never blocks, and nothing in the settlement path depends
//! on whether an event was received.

pub mod notifier;

pub use notifier::{NotifierStats, SettlementNotifier, Subscription};
