//! Trade types produced by the continuous matcher.
//!
//! A [`Trade`] is the immutable record of a fill between a buy and a sell
//! order at the resting order's price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, MarketPair, OrderId, OrderSide, TradeId};

/// A single fill between a buyer and a seller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Deterministic from market + fill sequence.
    pub id: TradeId,
    pub market: MarketPair,
    pub buyer: AccountId,
    pub seller: AccountId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    /// Execution price (always the resting order's price).
    pub price: Decimal,
    /// Executed quantity in base asset.
    pub amount: Decimal,
    /// Quote amount = price × amount.
    pub quote_amount: Decimal,
    /// Which side the aggressor was on.
    pub aggressor_side: OrderSide,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    #[must_use]
    pub fn aggressor_is_buyer(&self) -> bool {
        self.aggressor_side == OrderSide::Buy
    }

    /// Ledger reference under which this trade's journal entries are written.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("trade:{}:{}", self.market, self.id)
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade[{}] {} {} {} @ {} = {}",
            self.id,
            self.market,
            self.aggressor_side,
            self.amount,
            self.price,
            self.quote_amount,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_trade() -> Trade {
        let market = MarketPair::new("BX", "USDT");
        Trade {
            id: TradeId::deterministic(crate::SessionId::new(), &market, 0),
            market,
            buyer: AccountId::new(),
            seller: AccountId::new(),
            buy_order_id: OrderId::new(),
            sell_order_id: OrderId::new(),
            price: Decimal::new(10, 0),
            amount: Decimal::new(3, 0),
            quote_amount: Decimal::new(30, 0),
            aggressor_side: OrderSide::Sell,
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn trade_display() {
        let t = make_trade();
        let s = format!("{t}");
        assert!(s.contains("BX/USDT"));
        assert!(s.contains("30"));
        assert!(!t.aggressor_is_buyer());
    }

    #[test]
    fn trade_reference_names_market() {
        let t = make_trade();
        assert!(t.reference().starts_with("trade:BX/USDT:"));
    }

    #[test]
    fn trade_serde_roundtrip() {
        let trade = make_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade.id, back.id);
        assert_eq!(trade.price, back.price);
        assert_eq!(trade.quote_amount, back.quote_amount);
    }
}
