//! # custodia-casino
//!
//! **Provably fair wagering for Custodia.**
//!
//! Every round is rolled from a committed server seed, the player's client
//! seed and a per-account nonce, and settled against the shared ledger in
//! one unit of work:
//!
//! - [`FairnessEngine`]: seed epochs, commitments, rotation and reveal
//! - [`RiskGovernor`]: bet limits and the adaptive house edge
//! - [`GameKind`]: the closed set of payout rules
//! - [`RoundExecutor`]: gate, debit, roll, resolve, credit, publish
//! - [`Leaderboard`]: profit ranking built from `RoundSettled` events

pub mod executor;
pub mod fairness;
pub mod games;
pub mod leaderboard;
pub mod risk;

pub use executor::{PlayRequest, RoundExecutor};
pub use fairness::{
    FairnessEngine, RevealedSeed, RollOutcome, RoundTicket, SeedEpoch, commitment, roll,
    verify_revealed,
};
pub use games::{GameKind, PayoutTier, Resolution, apply_edge};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use risk::{RiskGovernor, RiskTotals};
