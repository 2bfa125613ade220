//! Order types for the continuous matching engine.
//!
//! Callers submit an [`OrderRequest`]; the engine stamps it with an id,
//! arrival sequence and timestamp to produce the resting [`Order`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, MarketPair, OrderId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A limit order as submitted by the service boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account: AccountId,
    pub market: MarketPair,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
}

impl OrderRequest {
    #[must_use]
    pub fn new(
        account: AccountId,
        market: MarketPair,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            account,
            market,
            side,
            price,
            amount,
        }
    }

    /// Quote-asset value of the full order at its limit price.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.amount
    }
}

/// An order accepted by the engine, possibly resting in the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: AccountId,
    pub market: MarketPair,
    pub side: OrderSide,
    pub price: Decimal,
    /// Original amount in base asset.
    pub amount: Decimal,
    /// Unfilled amount. Never negative, never above `amount`.
    pub remaining: Decimal,
    /// Arrival sequence within the market, assigned under the book lock.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Stamp a request with its identity and arrival position.
    #[must_use]
    pub fn from_request(request: OrderRequest, sequence: u64) -> Self {
        Self {
            id: OrderId::new(),
            account: request.account,
            market: request.market,
            side: request.side,
            price: request.price,
            amount: request.amount,
            remaining: request.amount,
            sequence,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    #[must_use]
    pub fn filled(&self) -> Decimal {
        self.amount - self.remaining
    }

    /// Whether this order is willing to trade at `price`.
    #[must_use]
    pub fn crosses(&self, price: Decimal) -> bool {
        match self.side {
            OrderSide::Buy => self.price >= price,
            OrderSide::Sell => self.price <= price,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy_limit(side: OrderSide, price: Decimal, amount: Decimal) -> Self {
        Self::dummy_limit_for(AccountId::new(), side, price, amount)
    }

    pub fn dummy_limit_for(
        account: AccountId,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
    ) -> Self {
        Self {
            id: OrderId::new(),
            account,
            market: MarketPair::new("BX", "USDT"),
            side,
            price,
            amount,
            remaining: amount,
            sequence: 0,
            created_at: Utc::now(),
        }
    }
}
