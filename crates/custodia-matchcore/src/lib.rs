//! # custodia-matchcore
//!
//! **Continuous limit-order matching for Custodia.**
//!
//! One order book per market pair, price-time priority, fills at the
//! resting order's price. Every placement is settled against the shared
//! [`AssetLedger`](custodia_ledger::AssetLedger) before it returns:
//!
//! - **Atomic settlement**: all trades of one placement commit in a single
//!   ledger unit of work, or none do and the book is reverted
//! - **Self-trade prevention**: crossing your own resting order is rejected
//! - **Market sharding**: each market has its own book and lock

pub mod engine;
pub mod matcher;
pub mod orderbook;
pub mod price_level;

pub use engine::MatchingEngine;
pub use matcher::{MatchOutcome, match_incoming};
pub use orderbook::{BookSnapshot, LevelSnapshot, OrderBook, UndoLog};
pub use price_level::PriceLevel;
