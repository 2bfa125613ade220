//! The order book for a single market pair.
//!
//! Uses `BTreeMap` for price-level ordering:
//! - **Bids** (buys): `BTreeMap<Reverse<Decimal>, PriceLevel>` -- highest price first
//! - **Asks** (sells): `BTreeMap<Decimal, PriceLevel>` -- lowest price first
//!
//! An auxiliary `HashMap<OrderId, (Side, Price)>` enables O(log N) cancellation.
//!
//! Fills go through [`OrderBook::fill_best`], which records every change in
//! an [`UndoLog`] so a placement whose settlement fails can be reverted
//! exactly with [`OrderBook::revert`].
//!
//! Every book belongs to one engine [`SessionId`]; trade ids are derived
//! from it, so two engine lifetimes never hand out the same id.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use custodia_types::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::price_level::PriceLevel;

/// One reversible book mutation.
#[derive(Debug, Clone)]
enum BookUndo {
    /// A resting order was partially filled from `previous` remaining.
    Reduced {
        id: OrderId,
        side: OrderSide,
        price: Decimal,
        previous: Decimal,
    },
    /// A resting order was fully filled and removed; holds its pre-fill state.
    Removed { order: Order },
}

/// Book mutations made during one placement, in application order.
#[derive(Debug, Default)]
pub struct UndoLog {
    steps: Vec<BookUndo>,
}

impl UndoLog {
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Aggregated amount at one price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    pub price: Decimal,
    pub amount: Decimal,
    pub orders: usize,
}

/// Read-only view of the top of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub market: MarketPair,
    /// Best (highest) first.
    pub bids: Vec<LevelSnapshot>,
    /// Best (lowest) first.
    pub asks: Vec<LevelSnapshot>,
}

impl BookSnapshot {
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }
}

/// The order book for a single market pair.
#[derive(Debug)]
pub struct OrderBook {
    /// The market this book serves (e.g., BX/USDT).
    pub market: MarketPair,
    /// Buy side: highest price first (`Reverse` key).
    bids: BTreeMap<Reverse<Decimal>, PriceLevel>,
    /// Sell side: lowest price first.
    asks: BTreeMap<Decimal, PriceLevel>,
    /// Fast lookup: `OrderId -> (side, price)` for O(log N) cancel.
    index: HashMap<OrderId, (OrderSide, Decimal)>,
    session: SessionId,
}

impl OrderBook {
    /// An empty book under a fresh session.
    #[must_use]
    pub fn new(market: MarketPair) -> Self {
        Self::with_session(market, SessionId::new())
    }

    #[must_use]
    pub fn with_session(market: MarketPair, session: SessionId) -> Self {
        Self {
            market,
            session,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    // =================================================================
    // Insertion
    // =================================================================

    /// Rest an order at the back of its price level.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.index.contains_key(&order.id) {
            return Err(CustodiaError::DuplicateOrder(order.id));
        }
        self.index.insert(order.id, (order.side, order.price));
        self.level_entry(order.side, order.price).push_back(order);
        Ok(())
    }

    fn level_entry(&mut self, side: OrderSide, price: Decimal) -> &mut PriceLevel {
        match side {
            OrderSide::Buy => self
                .bids
                .entry(Reverse(price))
                .or_insert_with(|| PriceLevel::new(price)),
            OrderSide::Sell => self
                .asks
                .entry(price)
                .or_insert_with(|| PriceLevel::new(price)),
        }
    }

    fn level_mut(&mut self, side: OrderSide, price: Decimal) -> Option<&mut PriceLevel> {
        match side {
            OrderSide::Buy => self.bids.get_mut(&Reverse(price)),
            OrderSide::Sell => self.asks.get_mut(&price),
        }
    }

    fn remove_level_if_empty(&mut self, side: OrderSide, price: Decimal) {
        match side {
            OrderSide::Buy => {
                if self.bids.get(&Reverse(price)).is_some_and(PriceLevel::is_empty) {
                    self.bids.remove(&Reverse(price));
                }
            }
            OrderSide::Sell => {
                if self.asks.get(&price).is_some_and(PriceLevel::is_empty) {
                    self.asks.remove(&price);
                }
            }
        }
    }

    // =================================================================
    // Cancellation
    // =================================================================

    /// Cancel an order by ID. Returns the removed order.
    pub fn cancel_order(&mut self, order_id: &OrderId) -> Result<Order> {
        let (side, price) = self
            .index
            .remove(order_id)
            .ok_or(CustodiaError::OrderNotFound(*order_id))?;
        let order = self
            .level_mut(side, price)
            .and_then(|level| level.remove_order(order_id))
            .ok_or(CustodiaError::OrderNotFound(*order_id))?;
        self.remove_level_if_empty(side, price);
        Ok(order)
    }

    // =================================================================
    // Matching support
    // =================================================================

    /// Highest-priority resting order on `side`.
    #[must_use]
    pub fn best_resting(&self, side: OrderSide) -> Option<&Order> {
        match side {
            OrderSide::Buy => self.bids.values().next().and_then(PriceLevel::front),
            OrderSide::Sell => self.asks.values().next().and_then(PriceLevel::front),
        }
    }

    /// Fill `amount` from the highest-priority resting order on `side`.
    ///
    /// Returns the resting order as it was before the fill. A fully filled
    /// order leaves the book along with its level if that empties.
    ///
    /// # Errors
    /// [`CustodiaError::InvalidOrder`] if `side` is empty or `amount`
    /// exceeds the resting order's remaining amount.
    pub fn fill_best(
        &mut self,
        side: OrderSide,
        amount: Decimal,
        undo: &mut UndoLog,
    ) -> Result<Order> {
        let front = match side {
            OrderSide::Buy => self.bids.values_mut().next().and_then(PriceLevel::front_mut),
            OrderSide::Sell => self.asks.values_mut().next().and_then(PriceLevel::front_mut),
        }
        .ok_or_else(|| CustodiaError::InvalidOrder {
            reason: format!("no resting {side} order to fill"),
        })?;

        if amount > front.remaining || amount <= Decimal::ZERO {
            return Err(CustodiaError::InvalidOrder {
                reason: format!(
                    "fill {amount} out of range for order {} with {} remaining",
                    front.id, front.remaining
                ),
            });
        }

        let before = front.clone();
        front.remaining -= amount;

        if front.remaining.is_zero() {
            if let Some(level) = self.level_mut(side, before.price) {
                level.pop_front();
            }
            self.index.remove(&before.id);
            self.remove_level_if_empty(side, before.price);
            undo.steps.push(BookUndo::Removed {
                order: before.clone(),
            });
        } else {
            undo.steps.push(BookUndo::Reduced {
                id: before.id,
                side,
                price: before.price,
                previous: before.remaining,
            });
        }
        Ok(before)
    }

    /// Undo every mutation in `undo`, newest first.
    pub fn revert(&mut self, undo: UndoLog) {
        for step in undo.steps.into_iter().rev() {
            match step {
                BookUndo::Reduced {
                    id,
                    side,
                    price,
                    previous,
                } => {
                    if let Some(order) = self
                        .level_mut(side, price)
                        .and_then(|level| level.get_mut(&id))
                    {
                        order.remaining = previous;
                    }
                }
                BookUndo::Removed { order } => {
                    self.index.insert(order.id, (order.side, order.price));
                    self.level_entry(order.side, order.price).push_front(order);
                }
            }
        }
    }

    // =================================================================
    // Queries
    // =================================================================

    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// What `account`'s resting orders on `side` would consume if all of
    /// them filled: quote notional for bids, base amount for asks.
    #[must_use]
    pub fn resting_commitment(&self, account: AccountId, side: OrderSide) -> Decimal {
        let own = |level: &PriceLevel| -> Decimal {
            level
                .orders
                .iter()
                .filter(|o| o.account == account)
                .map(|o| match side {
                    OrderSide::Buy => o.price * o.remaining,
                    OrderSide::Sell => o.remaining,
                })
                .sum()
        };
        match side {
            OrderSide::Buy => self.bids.values().map(own).sum(),
            OrderSide::Sell => self.asks.values().map(own).sum(),
        }
    }

    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let (side, price) = self.index.get(order_id)?;
        let level = match side {
            OrderSide::Buy => self.bids.get(&Reverse(*price)),
            OrderSide::Sell => self.asks.get(price),
        }?;
        level.orders.iter().find(|o| o.id == *order_id)
    }

    #[must_use]
    pub fn order_count(&self) -> usize {
        self.index.len()
    }

    /// Bid levels from best (highest) to worst.
    fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    /// Ask levels from best (lowest) to worst.
    fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    /// Aggregate the best `depth` levels on each side.
    #[must_use]
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let aggregate = |level: &PriceLevel| LevelSnapshot {
            price: level.price,
            amount: level.total_remaining(),
            orders: level.len(),
        };
        BookSnapshot {
            market: self.market.clone(),
            bids: self.bid_levels().take(depth).map(aggregate).collect(),
            asks: self.ask_levels().take(depth).map(aggregate).collect(),
        }
    }
}
