//! Journal reconciliation.
//!
//! Invariant checked over the committed state:
//! ```text
//! ∀ (account, asset): balance == Σ(journal entries) ∧ balance ≥ 0
//! ```
//!
//! Trades, rounds and transfers move value between accounts, so per-asset
//! supply only changes through deposits, withdrawals and game outcomes.
//! The report carries the per-asset supply for callers that track those
//! externally.

use std::collections::{BTreeMap, HashMap};

use custodia_types::{AccountId, Asset, BalanceRecord, CustodiaError, LedgerEntry, Result};
use rust_decimal::Decimal;

/// Outcome of a successful reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Distinct (account, asset) pairs verified.
    pub pairs_checked: usize,
    pub entries_checked: usize,
    /// Sum of all balances per asset.
    pub supply: BTreeMap<Asset, Decimal>,
}

impl ReconcileReport {
    #[must_use]
    pub fn supply_of(&self, asset: &str) -> Decimal {
        self.supply.get(asset).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Verify balances against the journal.
///
/// # Errors
/// Returns [`CustodiaError::LedgerIntegrity`] naming the first pair found
/// out of balance or negative.
pub fn reconcile(balances: &[BalanceRecord], entries: &[LedgerEntry]) -> Result<ReconcileReport> {
    let mut journaled: HashMap<(AccountId, &str), Decimal> = HashMap::new();
    for entry in entries {
        *journaled
            .entry((entry.account, entry.asset.as_str()))
            .or_insert(Decimal::ZERO) += entry.amount;
    }

    let mut report = ReconcileReport {
        entries_checked: entries.len(),
        ..ReconcileReport::default()
    };

    for record in balances {
        if record.balance < Decimal::ZERO {
            return Err(CustodiaError::LedgerIntegrity {
                reason: format!(
                    "{} {} has negative balance {}",
                    record.account, record.asset, record.balance
                ),
            });
        }
        let sum = journaled
            .remove(&(record.account, record.asset.as_str()))
            .unwrap_or(Decimal::ZERO);
        if sum != record.balance {
            return Err(CustodiaError::LedgerIntegrity {
                reason: format!(
                    "{} {}: balance {} != journal sum {sum}",
                    record.account, record.asset, record.balance
                ),
            });
        }
        *report
            .supply
            .entry(record.asset.clone())
            .or_insert(Decimal::ZERO) += record.balance;
        report.pairs_checked += 1;
    }

    // Journal activity with no balance row must net to zero.
    if let Some(((account, asset), sum)) = journaled.into_iter().find(|(_, sum)| !sum.is_zero()) {
        return Err(CustodiaError::LedgerIntegrity {
            reason: format!("{account} {asset}: journal sum {sum} has no balance"),
        });
    }

    Ok(report)
}
