//! # custodia-types
//!
//! Shared types, errors, and configuration for **Custodia**, a custodial
//! exchange ledger with a limit-order matcher and provably fair games.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`OrderId`], [`TradeId`], [`RoundId`], [`EpochId`], [`MarketPair`]
//! - **Order model**: [`OrderRequest`], [`Order`], [`OrderSide`]
//! - **Trade model**: [`Trade`]
//! - **Journal model**: [`LedgerEntry`], [`BalanceRecord`], [`Asset`]
//! - **Game rounds**: [`GameRound`]
//! - **Events**: [`DepositConfirmed`], [`SettlementEvent`]
//! - **Configuration**: [`CustodiaConfig`] and its sections
//! - **Errors**: [`CustodiaError`] with `CU_ERR_` prefix codes and an [`ErrorKind`] taxonomy
//! - **Constants**: system-wide limits and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod ids;
pub mod ledger;
pub mod order;
pub mod round;
pub mod trade;

// Re-export all primary types at crate root for ergonomic imports:
//   use custodia_types::{Order, OrderSide, Trade, LedgerEntry, ...};

pub use config::*;
pub use error::*;
pub use events::*;
pub use ids::*;
pub use ledger::*;
pub use order::*;
pub use round::*;
pub use trade::*;

// Constants are accessed via `custodia_types::constants::FOO`
// (not re-exported to avoid name collisions).
