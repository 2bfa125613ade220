//! Custody desk: confirmed deposits in, withdrawals out.
//!
//! Deposits arrive from the chain scanner as [`DepositConfirmed`] events and
//! are credited at most once per external transaction reference.
//! Withdrawals apply a minimum amount, a flat fee debited alongside the
//! amount, and a per-account daily cap that resets at UTC midnight. Each
//! committed withdrawal gets its own [`WithdrawalId`], which is also its
//! journal reference.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use custodia_notifier::SettlementNotifier;
use custodia_types::{
    AccountId, Asset, CustodiaError, CustodyConfig, DepositConfirmed, Result, SettlementEvent,
    WithdrawalId, WithdrawalPolicy,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::idempotency::IdempotencyGuard;
use crate::ledger::AssetLedger;

/// Result of a committed withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReceipt {
    pub id: WithdrawalId,
    /// Journal reference of the amount; the fee entry appends `:fee`.
    pub reference: String,
    pub account: AccountId,
    pub asset: String,
    pub amount: Decimal,
    pub fee: Decimal,
    /// Balance after amount and fee were debited.
    pub balance: Decimal,
    pub debited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct DailyUsage {
    day: NaiveDate,
    used: Decimal,
}

/// Deposit intake and withdrawal processing over the shared ledger.
pub struct CustodyDesk {
    ledger: AssetLedger,
    notifier: SettlementNotifier,
    policy: WithdrawalPolicy,
    deposits: Mutex<IdempotencyGuard<String>>,
    /// Withdrawn amount per pair for the current UTC day. Held for the whole
    /// withdrawal so concurrent requests cannot both pass the cap.
    daily: Mutex<HashMap<(AccountId, Asset), DailyUsage>>,
}

impl CustodyDesk {
    pub fn new(ledger: AssetLedger, notifier: SettlementNotifier, config: &CustodyConfig) -> Self {
        Self {
            ledger,
            notifier,
            policy: config.withdrawals.clone(),
            deposits: Mutex::new(IdempotencyGuard::new(config.deposit_cache_size)),
            daily: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &AssetLedger {
        &self.ledger
    }

    #[must_use]
    pub fn policy(&self) -> &WithdrawalPolicy {
        &self.policy
    }

    /// Credit a confirmed deposit. Returns the new balance.
    ///
    /// # Errors
    /// - [`CustodiaError::InvalidDeposit`] if the amount is not positive or
    ///   `tx_ref` is empty.
    /// - [`CustodiaError::DuplicateDeposit`] if `tx_ref` was already credited.
    pub fn deposit_confirmed(&self, deposit: DepositConfirmed) -> Result<Decimal> {
        if deposit.amount <= Decimal::ZERO {
            return Err(CustodiaError::InvalidDeposit {
                reason: format!("amount must be positive, got {}", deposit.amount),
            });
        }
        if deposit.tx_ref.is_empty() {
            return Err(CustodiaError::InvalidDeposit {
                reason: "tx_ref must not be empty".into(),
            });
        }

        if let Err(err) = self.deposits.lock().admit(deposit.tx_ref.clone()) {
            warn!(tx_ref = %deposit.tx_ref, account = %deposit.account, "duplicate deposit ignored");
            return Err(err);
        }

        let reference = format!("deposit:{}", deposit.tx_ref);
        let credited = self.ledger.run(&reference, |tx| {
            tx.credit(deposit.account, &deposit.asset, deposit.amount)
        });
        let balance = match credited {
            Ok(balance) => balance,
            Err(err) => {
                self.deposits.lock().release(&deposit.tx_ref);
                return Err(err);
            }
        };

        info!(
            tx_ref = %deposit.tx_ref,
            account = %deposit.account,
            asset = %deposit.asset,
            amount = %deposit.amount,
            "deposit credited"
        );
        self.notifier.publish(SettlementEvent::DepositCredited {
            tx_ref: deposit.tx_ref,
            account: deposit.account,
            asset: deposit.asset,
            amount: deposit.amount,
            balance,
            credited_at: Utc::now(),
        });
        Ok(balance)
    }

    /// Debit a withdrawal of `amount` plus the flat fee.
    ///
    /// `now` decides which UTC day the amount counts against.
    ///
    /// # Errors
    /// - [`CustodiaError::WithdrawalBelowMinimum`]
    /// - [`CustodiaError::DailyWithdrawalLimit`]
    /// - [`CustodiaError::InsufficientFunds`] if the balance does not cover
    ///   amount plus fee; nothing is debited.
    pub fn withdraw(
        &self,
        account: AccountId,
        asset: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalReceipt> {
        if amount < self.policy.min_amount {
            return Err(CustodiaError::WithdrawalBelowMinimum {
                amount,
                min: self.policy.min_amount,
            });
        }

        let today = now.date_naive();
        let key = (account, asset.to_string());
        let mut daily = self.daily.lock();
        let used = daily
            .get(&key)
            .filter(|usage| usage.day == today)
            .map_or(Decimal::ZERO, |usage| usage.used);
        if used + amount > self.policy.daily_limit {
            warn!(account = %account, asset, used = %used, requested = %amount, "daily withdrawal cap reached");
            return Err(CustodiaError::DailyWithdrawalLimit {
                used,
                requested: amount,
                limit: self.policy.daily_limit,
            });
        }

        let id = WithdrawalId::new();
        let reference = id.to_string();
        let fee = self.policy.fee;
        let balance = self.ledger.run(&reference, |tx| {
            let available = tx.balance(account, asset)?;
            if available < amount + fee {
                return Err(CustodiaError::InsufficientFunds {
                    account,
                    asset: asset.to_string(),
                    needed: amount + fee,
                    available,
                });
            }
            tx.set_reference(reference.clone());
            tx.debit(account, asset, amount)?;
            tx.set_reference(format!("{reference}:fee"));
            tx.debit(account, asset, fee)
        })?;

        daily.insert(
            key,
            DailyUsage {
                day: today,
                used: used + amount,
            },
        );
        drop(daily);

        info!(withdrawal = %id, account = %account, asset, amount = %amount, fee = %fee, "withdrawal debited");
        self.notifier.publish(SettlementEvent::WithdrawalDebited {
            id,
            account,
            asset: asset.to_string(),
            amount,
            fee,
            balance,
            debited_at: now,
        });
        Ok(WithdrawalReceipt {
            id,
            reference,
            account,
            asset: asset.to_string(),
            amount,
            fee,
            balance,
            debited_at: now,
        })
    }

    /// Amount already withdrawn by `account` on `now`'s UTC day.
    pub fn withdrawn_today(&self, account: AccountId, asset: &str, now: DateTime<Utc>) -> Decimal {
        self.daily
            .lock()
            .get(&(account, asset.to_string()))
            .filter(|usage| usage.day == now.date_naive())
            .map_or(Decimal::ZERO, |usage| usage.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use custodia_types::ErrorKind;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn desk() -> (CustodyDesk, SettlementNotifier) {
        let notifier = SettlementNotifier::new(16);
        let desk = CustodyDesk::new(
            AssetLedger::in_memory(),
            notifier.clone(),
            &CustodyConfig::default(),
        );
        (desk, notifier)
    }

    fn deposit(tx_ref: &str, account: AccountId, amount: Decimal) -> DepositConfirmed {
        DepositConfirmed {
            tx_ref: tx_ref.into(),
            account,
            asset: "BX".into(),
            amount,
        }
    }

    #[test]
    fn duplicate_deposit_credits_once() {
        let (desk, notifier) = desk();
        let mut events = notifier.subscribe();
        let alice = AccountId::new();

        assert_eq!(desk.deposit_confirmed(deposit("tx-1", alice, dec(50))).unwrap(), dec(50));
        let err = desk.deposit_confirmed(deposit("tx-1", alice, dec(50))).unwrap_err();
        assert!(matches!(err, CustodiaError::DuplicateDeposit(_)));
        assert_eq!(desk.ledger.balance(alice, "BX").unwrap(), dec(50));
        assert_eq!(events.drain().len(), 1);
    }

    #[test]
    fn malformed_deposit_rejected() {
        let (desk, _) = desk();
        let alice = AccountId::new();
        for bad in [
            deposit("tx-0", alice, Decimal::ZERO),
            deposit("tx-0", alice, dec(-1)),
            deposit("", alice, dec(10)),
        ] {
            let err = desk.deposit_confirmed(bad).unwrap_err();
            assert!(matches!(err, CustodiaError::InvalidDeposit { .. }), "{err}");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert_eq!(desk.ledger.balance(alice, "BX").unwrap(), Decimal::ZERO);
        // A rejected tx_ref is not remembered.
        desk.deposit_confirmed(deposit("tx-0", alice, dec(10))).unwrap();
    }

    #[test]
    fn withdrawal_debits_amount_and_fee() {
        let (desk, notifier) = desk();
        let alice = AccountId::new();
        desk.deposit_confirmed(deposit("tx-1", alice, dec(100))).unwrap();
        let mut events = notifier.subscribe();

        let receipt = desk.withdraw(alice, "BX", dec(20), Utc::now()).unwrap();
        assert_eq!(receipt.fee, Decimal::new(5, 1));
        assert_eq!(receipt.balance, Decimal::new(795, 1));
        assert_eq!(desk.ledger.journal(alice, "BX").unwrap().len(), 3);
        assert!(matches!(
            events.try_recv(),
            Some(SettlementEvent::WithdrawalDebited { .. })
        ));
        assert!(desk.ledger.reconcile().is_ok());
    }

    #[test]
    fn same_instant_withdrawals_get_distinct_references() {
        let (desk, _) = desk();
        let alice = AccountId::new();
        desk.deposit_confirmed(deposit("tx-1", alice, dec(100))).unwrap();
        let now = Utc::now();

        let first = desk.withdraw(alice, "BX", dec(10), now).unwrap();
        let second = desk.withdraw(alice, "BX", dec(10), now).unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.reference, second.reference);
        assert_eq!(first.reference, first.id.to_string());

        let references: Vec<String> = desk
            .ledger
            .journal(alice, "BX")
            .unwrap()
            .into_iter()
            .skip(1)
            .map(|e| e.reference)
            .collect();
        let expected = vec![
            first.reference.clone(),
            format!("{}:fee", first.reference),
            second.reference.clone(),
            format!("{}:fee", second.reference),
        ];
        assert_eq!(references, expected);
    }

    #[test]
    fn withdrawal_below_minimum_rejected() {
        let (desk, _) = desk();
        let err = desk
            .withdraw(AccountId::new(), "BX", dec(5), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CustodiaError::WithdrawalBelowMinimum { .. }));
    }

    #[test]
    fn balance_must_cover_fee() {
        let (desk, _) = desk();
        let alice = AccountId::new();
        desk.deposit_confirmed(deposit("tx-1", alice, dec(10))).unwrap();
        let err = desk.withdraw(alice, "BX", dec(10), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(desk.ledger.balance(alice, "BX").unwrap(), dec(10));
        assert_eq!(desk.withdrawn_today(alice, "BX", Utc::now()), Decimal::ZERO);
    }

    #[test]
    fn daily_cap_resets_next_utc_day() {
        let (desk, _) = desk();
        let alice = AccountId::new();
        desk.deposit_confirmed(deposit("tx-1", alice, dec(5_000))).unwrap();
        let now = Utc::now();

        desk.withdraw(alice, "BX", dec(1_500), now).unwrap();
        let err = desk.withdraw(alice, "BX", dec(600), now).unwrap_err();
        assert!(matches!(err, CustodiaError::DailyWithdrawalLimit { .. }));
        desk.withdraw(alice, "BX", dec(500), now).unwrap();
        assert_eq!(desk.withdrawn_today(alice, "BX", now), dec(2_000));

        let tomorrow = now + Duration::days(1);
        desk.withdraw(alice, "BX", dec(600), tomorrow).unwrap();
        assert_eq!(desk.withdrawn_today(alice, "BX", tomorrow), dec(600));
    }
}
