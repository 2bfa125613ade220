//! # custodia-ledger
//!
//! The single balance authority shared by the exchange, the casino and the
//! custody desk.
//!
//! ## Shape
//!
//! - [`LedgerStore`] / [`StoreTx`]: the storage contract (conditional debit
//!   with affected-row reporting, append-only journal).
//! - [`MemoryStore`]: in-process implementation with bounded lock waits.
//! - [`LedgerTx`]: the unit of work. Closed exactly once; rolls back on drop.
//! - [`AssetLedger`]: opens units of work with bounded retry and exposes
//!   committed reads and [`reconcile()`](AssetLedger::reconcile).
//! - [`CustodyDesk`]: idempotent deposit intake and policy-checked
//!   withdrawals.
//!
//! ## Invariants
//!
//! - Balances never go negative.
//! - A committed unit of work's journal entries net to the deltas it applied.
//! - Journal entries are never mutated or deleted.

pub mod custody;
pub mod idempotency;
pub mod ledger;
pub mod memory;
pub mod reconcile;
pub mod retry;
pub mod store;
pub mod tx;

pub use custody::{CustodyDesk, WithdrawalReceipt};
pub use idempotency::IdempotencyGuard;
pub use ledger::AssetLedger;
pub use memory::MemoryStore;
pub use reconcile::{ReconcileReport, reconcile};
pub use retry::with_backoff;
pub use store::{LedgerStore, StoreTx};
pub use tx::LedgerTx;
