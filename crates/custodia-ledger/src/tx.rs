//! The ledger unit of work.
//!
//! A [`LedgerTx`] wraps one store transaction and is the only way to mutate
//! balances. It is closed exactly once: [`LedgerTx::commit`] and
//! [`LedgerTx::rollback`] consume it, and dropping it open rolls back, so
//! every early return through `?` aborts cleanly.
//!
//! Every mutation appends exactly one journal entry. Before committing, the
//! transaction checks that the entries it wrote net to the balance deltas
//! the store actually applied, per (account, asset).

use std::collections::HashMap;

use custodia_types::{AccountId, Asset, CustodiaError, LedgerEntry, Result};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::store::StoreTx;

/// Unit of work over the asset ledger.
pub struct LedgerTx<'a> {
    inner: Option<Box<dyn StoreTx + 'a>>,
    /// Reference stamped on the next journal entries.
    reference: String,
    /// Store-observed balance change per pair.
    applied: HashMap<(AccountId, Asset), Decimal>,
    /// Sum of journal entries written per pair.
    journaled: HashMap<(AccountId, Asset), Decimal>,
    entries: Vec<LedgerEntry>,
}

impl<'a> LedgerTx<'a> {
    pub(crate) fn new(inner: Box<dyn StoreTx + 'a>, reference: String) -> Self {
        Self {
            inner: Some(inner),
            reference,
            applied: HashMap::new(),
            journaled: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn store(&self) -> Result<&(dyn StoreTx + 'a)> {
        self.inner
            .as_deref()
            .ok_or_else(|| CustodiaError::Internal("ledger transaction already closed".into()))
    }

    fn store_mut(&mut self) -> Result<&mut (dyn StoreTx + 'a)> {
        self.inner
            .as_deref_mut()
            .ok_or_else(|| CustodiaError::Internal("ledger transaction already closed".into()))
    }

    /// Reference stamped on subsequent journal entries.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Change the reference for subsequent entries (e.g. one per trade).
    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.reference = reference.into();
    }

    /// Entries written so far, in order.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Balance as seen by this unit of work, zero if unseen.
    pub fn balance(&self, account: AccountId, asset: &str) -> Result<Decimal> {
        self.store()?.balance(account, asset)
    }

    /// Decrease `account`'s `asset` balance by `amount`.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    /// - [`CustodiaError::InvalidAmount`] if `amount` is negative.
    /// - [`CustodiaError::InsufficientFunds`] if the balance is below `amount`;
    ///   nothing is applied.
    pub fn debit(&mut self, account: AccountId, asset: &str, amount: Decimal) -> Result<Decimal> {
        ensure_non_negative(amount)?;
        let before = self.balance(account, asset)?;
        let rows = self.store_mut()?.debit_if_sufficient(account, asset, amount)?;
        if rows == 0 {
            warn!(
                account = %account,
                asset,
                needed = %amount,
                available = %before,
                "debit rejected: insufficient funds"
            );
            return Err(CustodiaError::InsufficientFunds {
                account,
                asset: asset.to_string(),
                needed: amount,
                available: before,
            });
        }
        self.journal(account, asset, before, -amount)
    }

    /// Increase `account`'s `asset` balance by `amount`.
    ///
    /// Returns the new balance.
    pub fn credit(&mut self, account: AccountId, asset: &str, amount: Decimal) -> Result<Decimal> {
        ensure_non_negative(amount)?;
        let before = self.balance(account, asset)?;
        self.store_mut()?.credit(account, asset, amount)?;
        self.journal(account, asset, before, amount)
    }

    /// Move `amount` of `asset` from one account to another.
    ///
    /// If the debit fails no credit is applied. Both legs commit together
    /// with the rest of the unit of work.
    pub fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        asset: &str,
        amount: Decimal,
    ) -> Result<()> {
        if from == to {
            return Err(CustodiaError::InvalidTransfer {
                reason: format!("{from} cannot transfer to itself"),
            });
        }
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)?;
        Ok(())
    }

    fn journal(
        &mut self,
        account: AccountId,
        asset: &str,
        before: Decimal,
        amount: Decimal,
    ) -> Result<Decimal> {
        let after = self.balance(account, asset)?;
        let reference = self.reference.clone();
        let entry = self
            .store_mut()?
            .append_entry(&reference, account, asset, amount)?;
        let key = (account, asset.to_string());
        *self.applied.entry(key.clone()).or_insert(Decimal::ZERO) += after - before;
        *self.journaled.entry(key).or_insert(Decimal::ZERO) += entry.amount;
        debug!(
            reference = %entry.reference,
            sequence = entry.sequence,
            account = %account,
            asset,
            amount = %amount,
            balance = %after,
            "journal entry"
        );
        self.entries.push(entry);
        Ok(after)
    }

    fn verify_balanced(&self) -> Result<()> {
        for (key, applied) in &self.applied {
            let journaled = self.journaled.get(key).copied().unwrap_or(Decimal::ZERO);
            if journaled != *applied {
                return Err(CustodiaError::LedgerIntegrity {
                    reason: format!(
                        "{} {}: applied {applied} but journaled {journaled}",
                        key.0, key.1
                    ),
                });
            }
        }
        Ok(())
    }

    /// Commit every mutation made through this unit of work.
    ///
    /// # Errors
    /// [`CustodiaError::LedgerIntegrity`] if journal and balances disagree;
    /// the transaction is rolled back and the integrity error is what the
    /// caller sees, even if that rollback fails. Store failures propagate
    /// unchanged.
    pub fn commit(mut self) -> Result<Vec<LedgerEntry>> {
        let inner = self.take()?;
        if let Err(err) = self.verify_balanced() {
            warn!(reference = %self.reference, error = %err, "refusing to commit unbalanced unit of work");
            if let Err(rollback_err) = inner.rollback() {
                warn!(
                    reference = %self.reference,
                    error = %rollback_err,
                    "rollback of unbalanced unit of work failed"
                );
            }
            return Err(err);
        }
        inner.commit()?;
        info!(
            reference = %self.reference,
            entries = self.entries.len(),
            "ledger unit of work committed"
        );
        Ok(std::mem::take(&mut self.entries))
    }

    /// Discard every mutation made through this unit of work.
    pub fn rollback(mut self) -> Result<()> {
        let inner = self.take()?;
        debug!(reference = %self.reference, "ledger unit of work rolled back");
        inner.rollback()
    }

    fn take(&mut self) -> Result<Box<dyn StoreTx + 'a>> {
        self.inner
            .take()
            .ok_or_else(|| CustodiaError::Internal("ledger transaction already closed".into()))
    }
}

impl Drop for LedgerTx<'_> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            debug!(reference = %self.reference, "ledger unit of work dropped open, rolling back");
            if let Err(err) = inner.rollback() {
                warn!(reference = %self.reference, error = %err, "rollback on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for LedgerTx<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerTx")
            .field("reference", &self.reference)
            .field("open", &self.inner.is_some())
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn ensure_non_negative(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(CustodiaError::InvalidAmount {
            reason: format!("amount must not be negative, got {amount}"),
        });
    }
    Ok(())
}
