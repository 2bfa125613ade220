//! Settled game round records.
//!
//! A [`GameRound`] carries everything a player needs to re-derive the roll
//! once the epoch's seed has been revealed: client seed, nonce, epoch and the
//! commitment published before the round was played.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, EpochId, RoundId};

/// Immutable record of one wager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRound {
    pub id: RoundId,
    pub account: AccountId,
    /// Label of the game kind (e.g. `threshold`, `fixed-threshold`).
    pub game: String,
    pub asset: String,
    pub bet: Decimal,
    pub parameter: Option<Decimal>,
    pub client_seed: String,
    pub epoch_id: EpochId,
    pub nonce: u64,
    /// Roll in [0, 100) at two-decimal resolution.
    pub roll: Decimal,
    /// Hex HMAC digest the roll was derived from.
    pub proof: String,
    pub win: bool,
    /// Amount credited after the edge discount (zero on loss).
    pub payout: Decimal,
    /// House edge applied to this round.
    pub edge: Decimal,
    /// Commitment hash of the epoch's server seed.
    pub seed_commitment: String,
    pub settled_at: DateTime<Utc>,
}

impl GameRound {
    /// Ledger reference under which this round's journal entries are written.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("{}", self.id)
    }

    /// Net change to the player's balance.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.payout - self.bet
    }
}
