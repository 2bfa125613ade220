//! Continuous price-time-priority matcher.
//!
//! ```text
//! match_incoming(&mut OrderBook, &mut Order) -> MatchOutcome
//! ```
//!
//! Pure with respect to the ledger: it mutates only the book and the
//! incoming order, recording every book change in the returned
//! [`UndoLog`]. Settlement and resting the remainder are the caller's job.
//!
//! ## Pricing
//!
//! Every fill executes at the resting order's price. The incoming order is
//! the only order new to this placement, so the resting side always has
//! the earlier arrival.
//!
//! ## Self-Trade Prevention
//!
//! Crossing a resting order of the same account rejects the whole
//! placement with [`CustodiaError::SelfTrade`]; the book is reverted before
//! returning.

use chrono::Utc;
use custodia_types::{CustodiaError, Order, OrderSide, Result, Trade, TradeId};
use tracing::debug;

use crate::orderbook::{OrderBook, UndoLog};

/// Trades generated by one placement plus the means to revert them.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub trades: Vec<Trade>,
    pub undo: UndoLog,
}

/// Match `incoming` against the opposite side of `book`.
///
/// Fill sequence numbers are taken from `fill_sequence`, which is advanced
/// once per trade. Trade ids combine it with the book's session.
pub fn match_incoming(
    book: &mut OrderBook,
    incoming: &mut Order,
    fill_sequence: &mut u64,
) -> Result<MatchOutcome> {
    let mut outcome = MatchOutcome::default();
    let resting_side = incoming.side.opposite();

    while !incoming.remaining.is_zero() {
        let Some(resting) = book.best_resting(resting_side) else {
            break;
        };
        if !incoming.crosses(resting.price) {
            break;
        }
        if resting.account == incoming.account {
            let account = incoming.account;
            book.revert(outcome.undo);
            return Err(CustodiaError::SelfTrade(account));
        }

        let amount = incoming.remaining.min(resting.remaining);
        let resting = match book.fill_best(resting_side, amount, &mut outcome.undo) {
            Ok(resting) => resting,
            Err(err) => {
                book.revert(outcome.undo);
                return Err(err);
            }
        };
        incoming.remaining -= amount;

        let (buy, sell) = match incoming.side {
            OrderSide::Buy => (&*incoming, &resting),
            OrderSide::Sell => (&resting, &*incoming),
        };
        let trade = Trade {
            id: TradeId::deterministic(book.session(), &book.market, *fill_sequence),
            market: book.market.clone(),
            buyer: buy.account,
            seller: sell.account,
            buy_order_id: buy.id,
            sell_order_id: sell.id,
            price: resting.price,
            amount,
            quote_amount: resting.price * amount,
            aggressor_side: incoming.side,
            executed_at: Utc::now(),
        };
        *fill_sequence += 1;

        debug!(
            market = %book.market,
            trade = %trade.id,
            price = %trade.price,
            amount = %trade.amount,
            aggressor = %incoming.side,
            "fill"
        );
        outcome.trades.push(trade);
    }

    Ok(outcome)
}
