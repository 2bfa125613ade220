//! Player profit leaderboard, fed from settled-round events.
//!
//! Observability only: it is built from the notifier stream after commit,
//! so a missed event skews the board but never a balance.

use std::collections::HashMap;

use custodia_types::{AccountId, SettlementEvent};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub account: AccountId,
    /// Sum of payout minus bet over all recorded rounds.
    pub profit: Decimal,
}

#[derive(Debug, Default)]
pub struct Leaderboard {
    profits: Mutex<HashMap<AccountId, Decimal>>,
}

impl Leaderboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, account: AccountId, profit: Decimal) {
        *self.profits.lock().entry(account).or_default() += profit;
    }

    /// Fold in a round; other events are ignored. Returns whether it counted.
    pub fn apply(&self, event: &SettlementEvent) -> bool {
        match event {
            SettlementEvent::RoundSettled { round } => {
                self.record(round.account, round.net());
                true
            }
            SettlementEvent::TradeSettled { .. }
            | SettlementEvent::DepositCredited { .. }
            | SettlementEvent::WithdrawalDebited { .. } => false,
        }
    }

    /// Best `n` accounts by profit, ties broken by account id.
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .profits
            .lock()
            .iter()
            .map(|(account, profit)| LeaderboardEntry {
                account: *account,
                profit: *profit,
            })
            .collect();
        entries.sort_by(|a, b| b.profit.cmp(&a.profit).then(a.account.cmp(&b.account)));
        entries.truncate(n);
        entries
    }

    #[must_use]
    pub fn profit_of(&self, account: AccountId) -> Decimal {
        self.profits.lock().get(&account).copied().unwrap_or_default()
    }
}
