//! In-memory [`LedgerStore`] for tests and embedding.
//!
//! All transactions serialize on one `parking_lot::Mutex`, acquired with a
//! bounded `try_lock_for`. Writes are applied in place and recorded in an
//! undo log; rollback replays the log backwards and truncates the journal
//! to where the transaction started.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use custodia_types::{
    AccountId, Asset, BalanceRecord, CustodiaError, LedgerEntry, Result, constants,
};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use tracing::warn;

use crate::store::{LedgerStore, StoreTx};

type BalanceKey = (AccountId, Asset);

#[derive(Debug, Default)]
struct State {
    balances: HashMap<BalanceKey, Decimal>,
    journal: Vec<LedgerEntry>,
    next_sequence: u64,
}

/// Single-process store holding balances and the journal in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    /// Bounded wait for committed reads.
    read_wait: Duration,
    /// Commits that will fail with a storage error (fault injection).
    failing_commits: AtomicU32,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_read_wait(Duration::from_millis(constants::DEFAULT_LOCK_WAIT_MS))
    }

    #[must_use]
    pub fn with_read_wait(read_wait: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            read_wait,
            failing_commits: AtomicU32::new(0),
        }
    }

    fn read(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .try_lock_for(self.read_wait)
            .ok_or_else(|| CustodiaError::ConcurrencyConflict {
                resource: "memory-store".into(),
                attempts: 1,
            })
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl MemoryStore {
    /// Make the next `n` commits fail with [`CustodiaError::Storage`] after
    /// rolling back.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryStore {
    fn begin(&self, wait: Duration) -> Result<Box<dyn StoreTx + '_>> {
        let guard =
            self.state
                .try_lock_for(wait)
                .ok_or_else(|| CustodiaError::ConcurrencyConflict {
                    resource: "memory-store".into(),
                    attempts: 1,
                })?;
        let journal_mark = guard.journal.len();
        let sequence_mark = guard.next_sequence;
        Ok(Box::new(MemoryTx {
            guard,
            undo: Vec::new(),
            journal_mark,
            sequence_mark,
            failing_commits: &self.failing_commits,
            finished: false,
        }))
    }

    fn balance(&self, account: AccountId, asset: &str) -> Result<Decimal> {
        let state = self.read()?;
        Ok(lookup(&state, account, asset))
    }

    fn journal(&self, account: AccountId, asset: &str) -> Result<Vec<LedgerEntry>> {
        let state = self.read()?;
        Ok(state
            .journal
            .iter()
            .filter(|e| e.account == account && e.asset == asset)
            .cloned()
            .collect())
    }

    fn balances(&self) -> Result<Vec<BalanceRecord>> {
        let state = self.read()?;
        let mut records: Vec<BalanceRecord> = state
            .balances
            .iter()
            .map(|((account, asset), balance)| BalanceRecord {
                account: *account,
                asset: asset.clone(),
                balance: *balance,
            })
            .collect();
        records.sort_by(|a, b| (a.account, &a.asset).cmp(&(b.account, &b.asset)));
        Ok(records)
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.read()?.journal.clone())
    }
}

fn lookup(state: &State, account: AccountId, asset: &str) -> Decimal {
    state
        .balances
        .get(&(account, asset.to_string()))
        .copied()
        .unwrap_or(Decimal::ZERO)
}

/// Previous value of a balance row before this transaction touched it.
#[derive(Debug)]
struct Undo {
    key: BalanceKey,
    previous: Option<Decimal>,
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, State>,
    undo: Vec<Undo>,
    journal_mark: usize,
    sequence_mark: u64,
    failing_commits: &'a AtomicU32,
    finished: bool,
}

impl MemoryTx<'_> {
    fn write(&mut self, key: BalanceKey, value: Decimal) {
        let previous = self.guard.balances.insert(key.clone(), value);
        self.undo.push(Undo { key, previous });
    }

    fn undo_all(&mut self) {
        while let Some(Undo { key, previous }) = self.undo.pop() {
            match previous {
                Some(value) => {
                    self.guard.balances.insert(key, value);
                }
                None => {
                    self.guard.balances.remove(&key);
                }
            }
        }
        let mark = self.journal_mark;
        self.guard.journal.truncate(mark);
        self.guard.next_sequence = self.sequence_mark;
        self.finished = true;
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl StoreTx for MemoryTx<'_> {
    fn balance(&self, account: AccountId, asset: &str) -> Result<Decimal> {
        Ok(lookup(&self.guard, account, asset))
    }

    fn debit_if_sufficient(
        &mut self,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<u64> {
        let current = lookup(&self.guard, account, asset);
        if current < amount {
            return Ok(0);
        }
        self.write((account, asset.to_string()), current - amount);
        Ok(1)
    }

    fn credit(&mut self, account: AccountId, asset: &str, amount: Decimal) -> Result<()> {
        let current = lookup(&self.guard, account, asset);
        self.write((account, asset.to_string()), current + amount);
        Ok(())
    }

    fn append_entry(
        &mut self,
        reference: &str,
        account: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<LedgerEntry> {
        self.guard.next_sequence += 1;
        let entry = LedgerEntry {
            sequence: self.guard.next_sequence,
            reference: reference.to_string(),
            account,
            asset: asset.to_string(),
            amount,
            recorded_at: Utc::now(),
        };
        self.guard.journal.push(entry.clone());
        Ok(entry)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        if self.take_injected_failure() {
            self.undo_all();
            return Err(CustodiaError::Storage("injected commit failure".into()));
        }
        self.undo.clear();
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.undo_all();
        Ok(())
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(writes = self.undo.len(), "store transaction dropped open, rolling back");
            self.undo_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[test]
    fn conditional_debit_reports_rows() {
        let store = MemoryStore::new();
        let alice = AccountId::new();
        let mut tx = store.begin(WAIT).unwrap();
        tx.credit(alice, "BX", Decimal::new(10, 0)).unwrap();
        assert_eq!(tx.debit_if_sufficient(alice, "BX", Decimal::new(4, 0)).unwrap(), 1);
        assert_eq!(tx.debit_if_sufficient(alice, "BX", Decimal::new(7, 0)).unwrap(), 0);
        assert_eq!(tx.balance(alice, "BX").unwrap(), Decimal::new(6, 0));
        tx.commit().unwrap();
        assert_eq!(store.balance(alice, "BX").unwrap(), Decimal::new(6, 0));
    }

    #[test]
    fn rollback_restores_rows_and_journal() {
        let store = MemoryStore::new();
        let alice = AccountId::new();
        {
            let mut tx = store.begin(WAIT).unwrap();
            tx.credit(alice, "BX", Decimal::new(5, 0)).unwrap();
            tx.append_entry("seed", alice, "BX", Decimal::new(5, 0)).unwrap();
            tx.commit().unwrap();
        }
        let mut tx = store.begin(WAIT).unwrap();
        tx.credit(alice, "BX", Decimal::new(3, 0)).unwrap();
        tx.credit(alice, "USDT", Decimal::new(1, 0)).unwrap();
        tx.append_entry("x", alice, "BX", Decimal::new(3, 0)).unwrap();
        tx.rollback().unwrap();

        assert_eq!(store.balance(alice, "BX").unwrap(), Decimal::new(5, 0));
        assert_eq!(store.balances().unwrap().len(), 1);
        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);

        // Sequence numbers are reused after rollback.
        let mut tx = store.begin(WAIT).unwrap();
        let entry = tx.append_entry("y", alice, "BX", Decimal::ZERO).unwrap();
        assert_eq!(entry.sequence, 2);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        let alice = AccountId::new();
        {
            let mut tx = store.begin(WAIT).unwrap();
            tx.credit(alice, "BX", Decimal::ONE).unwrap();
        }
        assert_eq!(store.balance(alice, "BX").unwrap(), Decimal::ZERO);
    }

    #[test]
    fn second_begin_times_out_while_first_open() {
        let store = MemoryStore::new();
        let _held = store.begin(WAIT).unwrap();
        let err = store.begin(Duration::from_millis(5)).err().unwrap();
        assert!(err.is_retryable());
    }

    #[test]
    fn injected_commit_failure_rolls_back() {
        let store = MemoryStore::new();
        let alice = AccountId::new();
        store.fail_next_commits(1);
        let mut tx = store.begin(WAIT).unwrap();
        tx.credit(alice, "BX", Decimal::ONE).unwrap();
        let err = tx.commit().unwrap_err();
        assert!(matches!(err, CustodiaError::Storage(_)));
        assert_eq!(store.balance(alice, "BX").unwrap(), Decimal::ZERO);

        let mut tx = store.begin(WAIT).unwrap();
        tx.credit(alice, "BX", Decimal::ONE).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.balance(alice, "BX").unwrap(), Decimal::ONE);
    }
}
