//! Inbound and outbound event shapes.
//!
//! [`DepositConfirmed`] arrives from the external chain scanner.
//! [`SettlementEvent`]s leave through the notifier after commit; they are
//! observability only and never carry an unrevealed server seed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, GameRound, Trade, WithdrawalId};

/// A deposit the chain scanner has seen confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositConfirmed {
    /// External transaction reference; credited at most once.
    pub tx_ref: String,
    pub account: AccountId,
    pub asset: String,
    pub amount: Decimal,
}

/// Published once per committed ledger-affecting operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SettlementEvent {
    TradeSettled {
        trade: Trade,
    },
    RoundSettled {
        round: GameRound,
    },
    DepositCredited {
        tx_ref: String,
        account: AccountId,
        asset: String,
        amount: Decimal,
        balance: Decimal,
        credited_at: DateTime<Utc>,
    },
    WithdrawalDebited {
        id: WithdrawalId,
        account: AccountId,
        asset: String,
        amount: Decimal,
        fee: Decimal,
        balance: Decimal,
        debited_at: DateTime<Utc>,
    },
}

impl SettlementEvent {
    /// Short name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TradeSettled { .. } => "TRADE_SETTLED",
            Self::RoundSettled { .. } => "ROUND_SETTLED",
            Self::DepositCredited { .. } => "DEPOSIT_CREDITED",
            Self::WithdrawalDebited { .. } => "WITHDRAWAL_DEBITED",
        }
    }

    /// Accounts whose balances this event touched.
    #[must_use]
    pub fn accounts(&self) -> Vec<AccountId> {
        match self {
            Self::TradeSettled { trade } => vec![trade.buyer, trade.seller],
            Self::RoundSettled { round } => vec![round.account],
            Self::DepositCredited { account, .. } | Self::WithdrawalDebited { account, .. } => {
                vec![*account]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_event_serializes_with_tag() {
        let account = AccountId::new();
        let event = SettlementEvent::DepositCredited {
            tx_ref: "ton:abc".into(),
            account,
            asset: "TON".into(),
            amount: Decimal::new(5, 0),
            balance: Decimal::new(5, 0),
            credited_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"DepositCredited\""));
        assert_eq!(event.name(), "DEPOSIT_CREDITED");
        assert_eq!(event.accounts(), vec![account]);
    }
}
