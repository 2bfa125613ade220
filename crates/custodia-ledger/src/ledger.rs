//! Asset ledger: the shared balance authority.
//!
//! Every subsystem that moves value (matching, games, custody) goes through
//! this type. It owns the store handle and the retry policy; callers open a
//! [`LedgerTx`] with [`AssetLedger::begin`] or hand a closure to
//! [`AssetLedger::run`].
//!
//! No balance is cached here. Every read goes to the store.

use std::sync::Arc;

use custodia_types::{AccountId, BalanceRecord, LedgerEntry, Result, RetryPolicy};
use rust_decimal::Decimal;
use tracing::warn;

use crate::memory::MemoryStore;
use crate::reconcile::{ReconcileReport, reconcile};
use crate::retry::with_backoff;
use crate::store::LedgerStore;
use crate::tx::LedgerTx;

/// Transactional multi-asset ledger over a [`LedgerStore`].
#[derive(Clone)]
pub struct AssetLedger {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl AssetLedger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Ledger over a fresh [`MemoryStore`] with the default retry policy.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), RetryPolicy::default())
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Single acquisition attempt with the bounded wait.
    fn try_begin(&self, reference: &str) -> Result<LedgerTx<'_>> {
        let inner = self.store.begin(self.policy.lock_wait())?;
        Ok(LedgerTx::new(inner, reference.to_string()))
    }

    /// Open a unit of work, retrying acquisition with backoff.
    ///
    /// # Errors
    /// [`custodia_types::CustodiaError::ConcurrencyConflict`] once the retry
    /// budget is spent.
    pub fn begin(&self, reference: impl Into<String>) -> Result<LedgerTx<'_>> {
        let reference = reference.into();
        with_backoff(&self.policy, "ledger", || self.try_begin(&reference))
    }

    /// Run `f` inside a unit of work: commit on `Ok`, roll back on `Err`.
    ///
    /// The whole closure is re-run after a concurrency conflict, so it must
    /// not have effects outside the unit of work.
    pub fn run<T>(
        &self,
        reference: &str,
        mut f: impl FnMut(&mut LedgerTx<'_>) -> Result<T>,
    ) -> Result<T> {
        with_backoff(&self.policy, "ledger", || {
            let mut tx = self.try_begin(reference)?;
            match f(&mut tx) {
                Ok(value) => {
                    tx.commit()?;
                    Ok(value)
                }
                Err(err) => {
                    tx.rollback()?;
                    Err(err)
                }
            }
        })
    }

    /// One-shot debit. Returns the new balance.
    pub fn debit(
        &self,
        reference: &str,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<Decimal> {
        self.run(reference, |tx| tx.debit(account, asset, amount))
    }

    /// One-shot credit. Returns the new balance.
    pub fn credit(
        &self,
        reference: &str,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<Decimal> {
        self.run(reference, |tx| tx.credit(account, asset, amount))
    }

    /// One-shot transfer between two accounts.
    pub fn transfer(
        &self,
        reference: &str,
        from: AccountId,
        to: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<()> {
        self.run(reference, |tx| tx.transfer(from, to, asset, amount))
    }

    /// Committed balance, zero if unseen.
    pub fn balance(&self, account: AccountId, asset: &str) -> Result<Decimal> {
        self.store.balance(account, asset)
    }

    /// Committed journal for one pair, in append order.
    pub fn journal(&self, account: AccountId, asset: &str) -> Result<Vec<LedgerEntry>> {
        self.store.journal(account, asset)
    }

    pub fn balances(&self) -> Result<Vec<BalanceRecord>> {
        self.store.balances()
    }

    /// Check every committed balance against its journal.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let balances = self.store.balances()?;
        let entries = self.store.entries()?;
        reconcile(&balances, &entries).inspect_err(|err| {
            warn!(error = %err, "ledger reconciliation failed");
        })
    }
}

impl std::fmt::Debug for AssetLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetLedger")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::{CustodiaError, ErrorKind};

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn run_commits_on_ok() {
        let ledger = AssetLedger::in_memory();
        let alice = AccountId::new();
        let balance = ledger
            .run("deposit", |tx| tx.credit(alice, "USDT", dec(25)))
            .unwrap();
        assert_eq!(balance, dec(25));
        assert_eq!(ledger.balance(alice, "USDT").unwrap(), dec(25));
    }

    #[test]
    fn run_rolls_back_on_err() {
        let ledger = AssetLedger::in_memory();
        let alice = AccountId::new();
        ledger.credit("seed", alice, "USDT", dec(10)).unwrap();

        let err = ledger
            .run("two-legs", |tx| {
                tx.credit(alice, "BX", dec(1))?;
                tx.debit(alice, "USDT", dec(11))
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(ledger.balance(alice, "BX").unwrap(), Decimal::ZERO);
        assert_eq!(ledger.balance(alice, "USDT").unwrap(), dec(10));
        assert_eq!(ledger.journal(alice, "BX").unwrap().len(), 0);
    }

    #[test]
    fn one_shot_helpers() {
        let ledger = AssetLedger::in_memory();
        let alice = AccountId::new();
        let bob = AccountId::new();
        ledger.credit("seed", alice, "TON", dec(5)).unwrap();
        ledger.transfer("gift", alice, bob, "TON", dec(2)).unwrap();
        assert_eq!(ledger.debit("spend", bob, "TON", dec(1)).unwrap(), dec(1));
        assert_eq!(ledger.balance(alice, "TON").unwrap(), dec(3));

        let journal = ledger.journal(bob, "TON").unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].reference, "gift");
        assert_eq!(journal[1].amount, dec(-1));
    }

    #[test]
    fn storage_errors_propagate_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let ledger = AssetLedger::new(store.clone(), RetryPolicy::default());
        let alice = AccountId::new();
        store.fail_next_commits(1);
        let err = ledger.credit("seed", alice, "BX", dec(1)).unwrap_err();
        assert!(matches!(err, CustodiaError::Storage(_)));
        assert_eq!(ledger.balance(alice, "BX").unwrap(), Decimal::ZERO);
        assert!(ledger.reconcile().is_ok());
    }

    #[test]
    fn begin_times_out_as_conflict() {
        let ledger = AssetLedger::new(
            Arc::new(MemoryStore::new()),
            RetryPolicy {
                lock_wait_ms: 1,
                max_retries: 1,
                backoff_base_ms: 1,
                backoff_max_ms: 1,
            },
        );
        let _held = ledger.begin("holder").unwrap();
        let err = ledger.begin("waiter").unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            CustodiaError::ConcurrencyConflict { attempts: 2, .. }
        ));
    }
}
