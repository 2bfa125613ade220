//! Storage contract behind the ledger.
//!
//! A [`LedgerStore`] hands out one [`StoreTx`] at a time per conflicting
//! row set. The transaction exposes the conditional update the ledger relies
//! on for overdraft safety: [`StoreTx::debit_if_sufficient`] applies only
//! when the current balance covers the amount and reports how many rows it
//! touched, the same way `UPDATE ... WHERE balance >= amount` does.

use std::time::Duration;

use custodia_types::{AccountId, BalanceRecord, LedgerEntry, Result};
use rust_decimal::Decimal;

/// Durable transactional store for balances and the journal.
pub trait LedgerStore: Send + Sync {
    /// Open a transaction, waiting at most `wait` for conflicting ones.
    ///
    /// Fails with `ConcurrencyConflict` when the wait elapses.
    fn begin(&self, wait: Duration) -> Result<Box<dyn StoreTx + '_>>;

    /// Committed balance, zero for unseen pairs.
    fn balance(&self, account: AccountId, asset: &str) -> Result<Decimal>;

    /// Committed journal entries for one pair, in append order.
    fn journal(&self, account: AccountId, asset: &str) -> Result<Vec<LedgerEntry>>;

    /// Every committed balance row.
    fn balances(&self) -> Result<Vec<BalanceRecord>>;

    /// The whole committed journal, in append order.
    fn entries(&self) -> Result<Vec<LedgerEntry>>;
}

/// One open store transaction. Dropping it without commit rolls it back.
pub trait StoreTx {
    /// Balance as seen by this transaction (including its own writes).
    fn balance(&self, account: AccountId, asset: &str) -> Result<Decimal>;

    /// Decrement by `amount` only if the balance covers it.
    ///
    /// Returns the number of rows updated: `1` on success, `0` when the
    /// balance was insufficient (nothing changed).
    fn debit_if_sufficient(&mut self, account: AccountId, asset: &str, amount: Decimal)
    -> Result<u64>;

    /// Increment unconditionally, creating the row if needed.
    fn credit(&mut self, account: AccountId, asset: &str, amount: Decimal) -> Result<()>;

    /// Append one journal entry. The store assigns sequence and timestamp.
    fn append_entry(
        &mut self,
        reference: &str,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<LedgerEntry>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}
