//! A single price level in the order book.
//!
//! Orders at the same price are stored in FIFO order (time priority)
//! using a [`VecDeque`].

use std::collections::VecDeque;

use custodia_types::{Order, OrderId};
use rust_decimal::Decimal;

/// All resting orders at one price.
///
/// The front of the deque has the highest time priority and fills first.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Orders in time-priority order (front = oldest).
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    #[must_use]
    pub fn new(price: Decimal) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
        }
    }

    /// Add an order at the lowest time priority.
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Put an order back at the highest time priority (undo of a fill).
    pub fn push_front(&mut self, order: Order) {
        self.orders.push_front(order);
    }

    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    #[must_use]
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    /// Total unfilled amount across all orders at this level.
    #[must_use]
    pub fn total_remaining(&self) -> Decimal {
        self.orders.iter().map(|o| o.remaining).sum()
    }

    pub fn get_mut(&mut self, order_id: &OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == *order_id)
    }

    /// Remove a specific order by ID.
    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == *order_id)?;
        self.orders.remove(pos)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use custodia_types::*;
    use rust_decimal::Decimal;

    use super::*;

    fn make_order(amount: Decimal, seq: u64) -> Order {
        let mut order = Order::dummy_limit(OrderSide::Sell, Decimal::new(100, 0), amount);
        order.sequence = seq;
        order
    }

    #[test]
    fn push_pop_fifo() {
        let mut level = PriceLevel::new(Decimal::new(100, 0));
        let o1 = make_order(Decimal::ONE, 0);
        let o2 = make_order(Decimal::ONE, 1);
        let id1 = o1.id;

        level.push_back(o1);
        level.push_back(o2);

        assert_eq!(level.len(), 2);
        assert_eq!(level.pop_front().unwrap().id, id1, "first in should be first out");
        assert_eq!(level.len(), 1);
    }

    #[test]
    fn push_front_restores_priority() {
        let mut level = PriceLevel::new(Decimal::new(100, 0));
        let o1 = make_order(Decimal::ONE, 0);
        let id1 = o1.id;
        level.push_back(o1);
        level.push_back(make_order(Decimal::ONE, 1));

        let popped = level.pop_front().unwrap();
        level.push_front(popped);
        assert_eq!(level.front().unwrap().id, id1);
    }

    #[test]
    fn total_remaining_tracks_partial_fills() {
        let mut level = PriceLevel::new(Decimal::new(100, 0));
        level.push_back(make_order(Decimal::new(5, 0), 0));
        level.push_back(make_order(Decimal::new(3, 0), 1));
        level.front_mut().unwrap().remaining = Decimal::new(2, 0);
        assert_eq!(level.total_remaining(), Decimal::new(5, 0));
    }

    #[test]
    fn remove_order_by_id() {
        let mut level = PriceLevel::new(Decimal::new(100, 0));
        let o2 = make_order(Decimal::ONE, 1);
        let target = o2.id;
        level.push_back(make_order(Decimal::ONE, 0));
        level.push_back(o2);

        assert_eq!(level.remove_order(&target).unwrap().id, target);
        assert_eq!(level.len(), 1);
        assert!(level.remove_order(&OrderId::new()).is_none());
    }

    #[test]
    fn empty_level() {
        let level = PriceLevel::new(Decimal::new(100, 0));
        assert!(level.is_empty());
        assert_eq!(level.total_remaining(), Decimal::ZERO);
        assert!(level.front().is_none());
    }
}
