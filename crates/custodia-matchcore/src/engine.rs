//! Matching engine: one continuous double auction per market, settled
//! against the shared ledger.
//!
//! Each market's book, arrival counter, fill counter and trade tape sit
//! behind one `parking_lot::Mutex`. A placement holds that lock from
//! sequence assignment through settlement, so trade generation order is
//! lock-acquisition order. Settlement opens a ledger unit of work inside
//! the critical section: lock order is always book, then store.
//!
//! Resting orders are not reserved. Under the book lock the placer must
//! cover the new order plus everything its resting orders on the same side
//! could still consume. A resting counterparty is checked by the settlement
//! debit itself: if its leg fails for lack of funds, the book is reverted,
//! that account's crossed resting orders are pulled and the placement is
//! matched again against what remains. Any other failure reverts the book
//! and counters and reports the error with no trades.

use std::collections::{HashMap, VecDeque};

use custodia_ledger::{AssetLedger, LedgerTx, with_backoff};
use custodia_notifier::SettlementNotifier;
use custodia_types::{
    AccountId, CustodiaError, MarketConfig, MarketPair, Order, OrderId, OrderRequest, OrderSide,
    Result, RetryPolicy, SessionId, SettlementEvent, Trade,
};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::matcher::match_incoming;
use crate::orderbook::{BookSnapshot, OrderBook};

/// Mutable state of one market, guarded as a unit.
#[derive(Debug)]
struct MarketState {
    book: OrderBook,
    next_sequence: u64,
    next_fill: u64,
    /// Most recent trades, oldest at the front.
    tape: VecDeque<Trade>,
}

#[derive(Debug)]
struct Market {
    config: MarketConfig,
    state: Mutex<MarketState>,
}

/// Continuous matching engine over a fixed set of markets.
pub struct MatchingEngine {
    markets: HashMap<MarketPair, Market>,
    ledger: AssetLedger,
    notifier: SettlementNotifier,
    policy: RetryPolicy,
    session: SessionId,
}

impl MatchingEngine {
    /// Build an engine under a fresh session.
    ///
    /// # Errors
    /// [`CustodiaError::Configuration`] if a market fails
    /// [`MarketConfig::validate`] or the same pair is listed twice.
    pub fn new(
        markets: Vec<MarketConfig>,
        ledger: AssetLedger,
        notifier: SettlementNotifier,
        policy: RetryPolicy,
    ) -> Result<Self> {
        Self::with_session(markets, ledger, notifier, policy, SessionId::new())
    }

    /// Build an engine that issues trade ids under `session`. Replaying the
    /// same placements under the same session reproduces the same ids.
    pub fn with_session(
        markets: Vec<MarketConfig>,
        ledger: AssetLedger,
        notifier: SettlementNotifier,
        policy: RetryPolicy,
        session: SessionId,
    ) -> Result<Self> {
        let mut by_pair = HashMap::with_capacity(markets.len());
        for config in markets {
            config.validate()?;
            let pair = config.pair();
            if by_pair.contains_key(&pair) {
                return Err(CustodiaError::Configuration(format!(
                    "market {pair} configured twice"
                )));
            }
            let market = Market {
                state: Mutex::new(MarketState {
                    book: OrderBook::with_session(pair.clone(), session),
                    next_sequence: 0,
                    next_fill: 0,
                    tape: VecDeque::with_capacity(config.trade_tape_len),
                }),
                config,
            };
            by_pair.insert(pair, market);
        }
        info!(session = %session, markets = by_pair.len(), "matching engine ready");
        Ok(Self {
            markets: by_pair,
            ledger,
            notifier,
            policy,
            session,
        })
    }

    #[must_use]
    pub fn ledger(&self) -> &AssetLedger {
        &self.ledger
    }

    /// Session every trade id of this engine is derived from.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Configured markets, sorted.
    #[must_use]
    pub fn markets(&self) -> Vec<MarketPair> {
        let mut pairs: Vec<_> = self.markets.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    fn market(&self, pair: &MarketPair) -> Result<&Market> {
        self.markets
            .get(pair)
            .ok_or_else(|| CustodiaError::UnknownMarket(pair.symbol()))
    }

    fn lock<'m>(&self, market: &'m Market) -> Result<MutexGuard<'m, MarketState>> {
        let resource = format!("book:{}", market.config.symbol());
        with_backoff(&self.policy, &resource, || {
            market
                .state
                .try_lock_for(self.policy.lock_wait())
                .ok_or_else(|| CustodiaError::ConcurrencyConflict {
                    resource: resource.clone(),
                    attempts: 1,
                })
        })
    }

    /// Place a limit order. Returns every trade it generated, possibly none.
    ///
    /// # Errors
    /// - Validation: unknown market, bad price/amount/tick/lot/minimum,
    ///   [`CustodiaError::SelfTrade`].
    /// - [`CustodiaError::InsufficientFunds`] if the placer cannot cover this
    ///   order on top of its resting ones, or its own leg fails in settlement.
    /// - [`CustodiaError::ConcurrencyConflict`] if the book lock or ledger
    ///   could not be acquired within the retry budget.
    pub fn place(&self, request: OrderRequest) -> Result<Vec<Trade>> {
        let market = self.market(&request.market)?;
        validate(&request, &market.config)?;

        let mut state = self.lock(market)?;
        self.ensure_funded(&state.book, &request)?;

        let sequence = state.next_sequence;
        let fill_mark = state.next_fill;
        let template = Order::from_request(request, sequence);

        let (order, trades) = loop {
            let mut order = template.clone();
            state.next_fill = fill_mark;
            let MarketState {
                book, next_fill, ..
            } = &mut *state;
            let outcome = match match_incoming(book, &mut order, next_fill) {
                Ok(outcome) => outcome,
                Err(err) => {
                    state.next_fill = fill_mark;
                    warn!(market = %order.market, account = %order.account, error = %err, "placement rejected");
                    return Err(err);
                }
            };
            if outcome.trades.is_empty() {
                break (order, outcome.trades);
            }

            let reference = format!("place:{}", order.id);
            let Err(err) = self
                .ledger
                .run(&reference, |tx| settle(tx, &outcome.trades))
            else {
                break (order, outcome.trades);
            };
            state.book.revert(outcome.undo);
            state.next_fill = fill_mark;

            let pulled = match unfunded_maker(&err, &order) {
                Some(maker) => pull_resting(&mut state.book, maker, &outcome.trades),
                None => Vec::new(),
            };
            if pulled.is_empty() {
                warn!(
                    market = %order.market,
                    order = %order.id,
                    trades = outcome.trades.len(),
                    error = %err,
                    "settlement failed, book reverted"
                );
                return Err(err);
            }
            for resting in &pulled {
                warn!(
                    market = %resting.market,
                    order = %resting.id,
                    account = %resting.account,
                    remaining = %resting.remaining,
                    error = %err,
                    "unfunded resting order pulled"
                );
            }
        };
        state.next_sequence = sequence + 1;

        if !order.is_filled() {
            state.book.insert_order(order.clone())?;
        }
        let tape_len = market.config.trade_tape_len;
        if tape_len > 0 {
            for trade in &trades {
                if state.tape.len() >= tape_len {
                    state.tape.pop_front();
                }
                state.tape.push_back(trade.clone());
            }
        }
        let book_orders = state.book.order_count();
        drop(state);

        info!(
            market = %order.market,
            order = %order.id,
            side = %order.side,
            price = %order.price,
            filled = %order.filled(),
            resting = %order.remaining,
            trades = trades.len(),
            book_orders,
            "order placed"
        );
        for trade in &trades {
            self.notifier.publish(SettlementEvent::TradeSettled {
                trade: trade.clone(),
            });
        }
        Ok(trades)
    }

    /// Check the placer can fund this order at its limit price on top of
    /// what its resting orders on the same side already claim.
    fn ensure_funded(&self, book: &OrderBook, request: &OrderRequest) -> Result<()> {
        let (asset, order_needs) = match request.side {
            OrderSide::Buy => (&request.market.quote, request.notional()),
            OrderSide::Sell => (&request.market.base, request.amount),
        };
        let committed = book.resting_commitment(request.account, request.side);
        let needed = order_needs + committed;
        let available = self.ledger.balance(request.account, asset)?;
        if available < needed {
            warn!(
                account = %request.account,
                asset = %asset,
                needed = %needed,
                committed = %committed,
                available = %available,
                "order not funded"
            );
            return Err(CustodiaError::InsufficientFunds {
                account: request.account,
                asset: asset.clone(),
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Remove a resting order. Only its owner may cancel it.
    pub fn cancel(&self, market: &MarketPair, order_id: OrderId, account: AccountId) -> Result<Order> {
        let market = self.market(market)?;
        let mut state = self.lock(market)?;
        let owner = state
            .book
            .get(&order_id)
            .map(|o| o.account)
            .ok_or(CustodiaError::OrderNotFound(order_id))?;
        if owner != account {
            warn!(order = %order_id, account = %account, "cancel by non-owner rejected");
            return Err(CustodiaError::NotOrderOwner(order_id));
        }
        let order = state.book.cancel_order(&order_id)?;
        info!(market = %order.market, order = %order.id, remaining = %order.remaining, "order cancelled");
        Ok(order)
    }

    /// Aggregated top-of-book view, `depth` levels per side.
    pub fn snapshot(&self, market: &MarketPair, depth: usize) -> Result<BookSnapshot> {
        let market = self.market(market)?;
        Ok(self.lock(market)?.book.snapshot(depth))
    }

    /// Up to `limit` most recent trades, newest first.
    pub fn recent_trades(&self, market: &MarketPair, limit: usize) -> Result<Vec<Trade>> {
        let market = self.market(market)?;
        let state = self.lock(market)?;
        Ok(state.tape.iter().rev().take(limit).cloned().collect())
    }

    /// A resting order by id, if still in the book.
    pub fn order(&self, market: &MarketPair, order_id: OrderId) -> Result<Option<Order>> {
        let market = self.market(market)?;
        Ok(self.lock(market)?.book.get(&order_id).cloned())
    }
}

impl std::fmt::Debug for MatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingEngine")
            .field("session", &self.session)
            .field("markets", &self.markets())
            .finish_non_exhaustive()
    }
}

/// Move both legs of every trade. Each trade's entries carry its reference.
fn settle(tx: &mut LedgerTx<'_>, trades: &[Trade]) -> Result<()> {
    for trade in trades {
        tx.set_reference(trade.reference());
        tx.transfer(trade.buyer, trade.seller, &trade.market.quote, trade.quote_amount)?;
        tx.transfer(trade.seller, trade.buyer, &trade.market.base, trade.amount)?;
    }
    Ok(())
}

/// The resting counterparty whose leg ran out of funds, if that is what failed.
fn unfunded_maker(err: &CustodiaError, incoming: &Order) -> Option<AccountId> {
    match err {
        CustodiaError::InsufficientFunds { account, .. } if *account != incoming.account => {
            Some(*account)
        }
        _ => None,
    }
}

/// Cancel `maker`'s resting orders that `trades` crossed.
fn pull_resting(book: &mut OrderBook, maker: AccountId, trades: &[Trade]) -> Vec<Order> {
    let mut pulled = Vec::new();
    for trade in trades {
        let (account, order_id) = match trade.aggressor_side {
            OrderSide::Buy => (trade.seller, trade.sell_order_id),
            OrderSide::Sell => (trade.buyer, trade.buy_order_id),
        };
        if account != maker {
            continue;
        }
        if let Ok(order) = book.cancel_order(&order_id) {
            pulled.push(order);
        }
    }
    pulled
}
