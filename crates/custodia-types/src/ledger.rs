//! Journal types for the asset ledger.
//!
//! Every balance mutation appends exactly one [`LedgerEntry`]. Entries are
//! never mutated or deleted; for any committed transaction the entries it
//! wrote sum to the balance delta it applied.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Type alias for asset identifiers (e.g., "BX", "USDT", "TON").
pub type Asset = String;

/// Immutable journal record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Position in the global journal, assigned by the store.
    pub sequence: u64,
    /// Business reference (e.g. `trade:BX/USDT:<id>`, `round:<id>`).
    pub reference: String,
    pub account: AccountId,
    pub asset: Asset,
    /// Positive for credits, negative for debits.
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[must_use]
    pub fn is_credit(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    #[must_use]
    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

/// A committed balance, as returned by store scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub account: AccountId,
    pub asset: Asset,
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(amount: Decimal) -> LedgerEntry {
        LedgerEntry {
            sequence: 1,
            reference: "test".into(),
            account: AccountId::new(),
            asset: "BX".into(),
            amount,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn credit_and_debit_sign() {
        assert!(entry(Decimal::ONE).is_credit());
        assert!(entry(-Decimal::ONE).is_debit());
        let zero = entry(Decimal::ZERO);
        assert!(!zero.is_credit());
        assert!(!zero.is_debit());
    }
}
