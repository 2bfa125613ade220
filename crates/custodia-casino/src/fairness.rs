//! Provably fair rolls over rotating seed epochs.
//!
//! Each [`SeedEpoch`] owns one secret server seed, the SHA-256 commitment
//! published for it, and the per-account nonce counters of rounds played
//! under it. A round captures the active epoch as an `Arc` together with its
//! nonce, so a rotation between capture and settlement never changes which
//! seed the round is rolled and verified against.
//!
//! ```text
//! roll = u32_be(HMAC-SHA256(key = server_seed, msg = "{client_seed}:{nonce}")[..4])
//!        % 10000 / 100
//! ```
//!
//! ## Rotation
//!
//! The replacement seed is generated and committed before it is swapped in;
//! only after the swap is the outgoing epoch marked retired, which is what
//! makes its seed revealable. The active seed is never revealed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use custodia_types::constants::{ROLL_MODULUS, ROLL_SCALE, SEED_BYTES};
use custodia_types::{AccountId, CustodiaError, EpochId, FairnessConfig, GameRound, Result};
use hmac::{Hmac, Mac};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use rand::rngs::OsRng;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// A roll value in [0, 100) and the hex digest it was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub value: Decimal,
    pub proof: String,
}

/// A retired epoch's seed, published so players can re-derive their rolls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedSeed {
    pub epoch_id: EpochId,
    pub server_seed: String,
    pub commitment: String,
    pub started_at: DateTime<Utc>,
    pub retired_at: DateTime<Utc>,
}

/// Derive a roll. Identical inputs always yield identical output.
pub fn roll(server_seed: &str, client_seed: &str, nonce: u64) -> Result<RollOutcome> {
    let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
        .map_err(|e| CustodiaError::Internal(format!("HMAC key rejected: {e}")))?;
    mac.update(format!("{client_seed}:{nonce}").as_bytes());
    let digest = mac.finalize().into_bytes();

    let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    Ok(RollOutcome {
        value: Decimal::new(i64::from(head % ROLL_MODULUS), ROLL_SCALE),
        proof: hex::encode(digest),
    })
}

/// Hex SHA-256 of the seed string.
#[must_use]
pub fn commitment(server_seed: &str) -> String {
    hex::encode(Sha256::digest(server_seed.as_bytes()))
}

/// Player-side check of a round against a revealed seed.
///
/// # Errors
/// [`CustodiaError::FairnessIntegrity`] if the seed does not hash to the
/// round's commitment or the recomputed roll differs.
pub fn verify_revealed(seed: &RevealedSeed, round: &GameRound) -> Result<()> {
    if seed.epoch_id != round.epoch_id {
        return Err(CustodiaError::FairnessIntegrity {
            reason: format!(
                "round {} was played under {}, not {}",
                round.id, round.epoch_id, seed.epoch_id
            ),
        });
    }
    if commitment(&seed.server_seed) != round.seed_commitment {
        return Err(CustodiaError::FairnessIntegrity {
            reason: format!("revealed seed does not match commitment of round {}", round.id),
        });
    }
    check_roll(&seed.server_seed, round)
}

fn check_roll(server_seed: &str, round: &GameRound) -> Result<()> {
    let expected = roll(server_seed, &round.client_seed, round.nonce)?;
    if expected.value != round.roll || expected.proof != round.proof {
        return Err(CustodiaError::FairnessIntegrity {
            reason: format!(
                "round {} recorded roll {} but seed yields {}",
                round.id, round.roll, expected.value
            ),
        });
    }
    Ok(())
}

/// One server seed and the rounds played under it.
#[derive(Debug)]
pub struct SeedEpoch {
    id: EpochId,
    secret: SecretString,
    commitment: String,
    started_at: DateTime<Utc>,
    retired_at: Mutex<Option<DateTime<Utc>>>,
    /// Next nonce per account. Starts at zero.
    nonces: Mutex<HashMap<AccountId, u64>>,
}

impl SeedEpoch {
    /// Fresh epoch with a seed from the OS RNG.
    #[must_use]
    pub fn generate(id: EpochId, now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; SEED_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self::from_secret(id, hex::encode(bytes), now)
    }

    /// Epoch over a known seed, e.g. one restored from secure storage.
    #[must_use]
    pub fn from_secret(id: EpochId, server_seed: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            commitment: commitment(&server_seed),
            secret: SecretString::new(server_seed),
            started_at: now,
            retired_at: Mutex::new(None),
            nonces: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> EpochId {
        self.id
    }

    #[must_use]
    pub fn commitment(&self) -> &str {
        &self.commitment
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn retired_at(&self) -> Option<DateTime<Utc>> {
        *self.retired_at.lock()
    }

    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired_at().is_some()
    }

    /// Claim the next nonce for `account`. Each value is handed out once.
    pub fn next_nonce(&self, account: AccountId) -> u64 {
        let mut nonces = self.nonces.lock();
        let slot = nonces.entry(account).or_insert(0);
        let nonce = *slot;
        *slot += 1;
        nonce
    }

    /// Number of nonces issued to `account` so far.
    #[must_use]
    pub fn issued_nonces(&self, account: AccountId) -> u64 {
        self.nonces.lock().get(&account).copied().unwrap_or(0)
    }

    pub fn roll(&self, client_seed: &str, nonce: u64) -> Result<RollOutcome> {
        roll(self.secret.expose_secret(), client_seed, nonce)
    }

    fn retire(&self, at: DateTime<Utc>) {
        self.retired_at.lock().get_or_insert(at);
    }

    fn reveal(&self) -> Result<RevealedSeed> {
        let retired_at = self
            .retired_at()
            .ok_or(CustodiaError::EpochStillActive(self.id))?;
        Ok(RevealedSeed {
            epoch_id: self.id,
            server_seed: self.secret.expose_secret().clone(),
            commitment: self.commitment.clone(),
            started_at: self.started_at,
            retired_at,
        })
    }
}

/// Epoch and nonce captured for one round.
#[derive(Debug, Clone)]
pub struct RoundTicket {
    pub epoch: Arc<SeedEpoch>,
    pub nonce: u64,
}

impl RoundTicket {
    pub fn roll(&self, client_seed: &str) -> Result<RollOutcome> {
        self.epoch.roll(client_seed, self.nonce)
    }
}

/// Active epoch, retired epochs, and the rotation schedule.
#[derive(Debug)]
pub struct FairnessEngine {
    active: RwLock<Arc<SeedEpoch>>,
    retired: RwLock<BTreeMap<EpochId, Arc<SeedEpoch>>>,
    rotation_interval: Duration,
}

impl FairnessEngine {
    /// Start at epoch 1 with a freshly generated seed.
    #[must_use]
    pub fn new(config: &FairnessConfig) -> Self {
        Self::with_epoch(config, SeedEpoch::generate(EpochId(1), Utc::now()))
    }

    #[must_use]
    pub fn with_epoch(config: &FairnessConfig, epoch: SeedEpoch) -> Self {
        info!(epoch = %epoch.id, commitment = %epoch.commitment, "seed epoch started");
        Self {
            active: RwLock::new(Arc::new(epoch)),
            retired: RwLock::new(BTreeMap::new()),
            rotation_interval: config.rotation_interval(),
        }
    }

    /// Commitment hash of the active seed.
    #[must_use]
    pub fn current_commitment(&self) -> String {
        self.active.read().commitment.clone()
    }

    #[must_use]
    pub fn active_epoch(&self) -> Arc<SeedEpoch> {
        Arc::clone(&self.active.read())
    }

    /// Look up an active or retired epoch.
    pub fn epoch(&self, id: EpochId) -> Result<Arc<SeedEpoch>> {
        let active = self.active_epoch();
        if active.id == id {
            return Ok(active);
        }
        self.retired
            .read()
            .get(&id)
            .cloned()
            .ok_or(CustodiaError::UnknownEpoch(id))
    }

    /// Roll against the active seed without consuming a nonce.
    pub fn roll(&self, client_seed: &str, nonce: u64) -> Result<RollOutcome> {
        self.active_epoch().roll(client_seed, nonce)
    }

    /// Capture the active epoch and claim the account's next nonce in it.
    ///
    /// The read lock is held across both steps, so the nonce always belongs
    /// to the returned epoch.
    pub fn begin_round(&self, account: AccountId) -> RoundTicket {
        let active = self.active.read();
        let nonce = active.next_nonce(account);
        RoundTicket {
            epoch: Arc::clone(&active),
            nonce,
        }
    }

    /// Replace the active seed. Returns the new commitment.
    pub fn rotate(&self, now: DateTime<Utc>) -> String {
        let mut active = self.active.write();
        self.rotate_locked(&mut active, now)
    }

    /// Rotate if the active epoch is older than the rotation interval.
    pub fn maybe_rotate(&self, now: DateTime<Utc>) -> Option<String> {
        if now - self.active.read().started_at < self.rotation_interval {
            return None;
        }
        let mut active = self.active.write();
        // Another caller may have rotated between the two locks.
        if now - active.started_at < self.rotation_interval {
            return None;
        }
        Some(self.rotate_locked(&mut active, now))
    }

    fn rotate_locked(&self, active: &mut Arc<SeedEpoch>, now: DateTime<Utc>) -> String {
        let next = Arc::new(SeedEpoch::generate(active.id.next(), now));
        let commitment = next.commitment.clone();
        let outgoing = std::mem::replace(active, next);
        outgoing.retire(now);
        info!(
            retired = %outgoing.id,
            epoch = %active.id,
            commitment = %commitment,
            "seed rotated"
        );
        self.retired.write().insert(outgoing.id, outgoing);
        commitment
    }

    /// Seed of the most recently retired epoch.
    pub fn reveal_previous_seed(&self) -> Result<RevealedSeed> {
        let retired = self.retired.read();
        let (_, epoch) = retired
            .last_key_value()
            .ok_or(CustodiaError::NoRetiredEpoch)?;
        epoch.reveal()
    }

    /// Seed of a specific retired epoch.
    pub fn reveal(&self, id: EpochId) -> Result<RevealedSeed> {
        if self.active_epoch().id == id {
            warn!(epoch = %id, "reveal of active seed refused");
            return Err(CustodiaError::EpochStillActive(id));
        }
        self.retired
            .read()
            .get(&id)
            .ok_or(CustodiaError::UnknownEpoch(id))?
            .reveal()
    }

    /// Recompute `round` against its own epoch.
    ///
    /// # Errors
    /// [`CustodiaError::UnknownEpoch`] if the epoch is not known here;
    /// [`CustodiaError::FairnessIntegrity`] if the commitment, nonce or roll
    /// do not match what the epoch produces.
    pub fn verify(&self, round: &GameRound) -> Result<()> {
        let epoch = self.epoch(round.epoch_id)?;
        if epoch.commitment != round.seed_commitment {
            return Err(CustodiaError::FairnessIntegrity {
                reason: format!(
                    "round {} carries a commitment that is not {}'s",
                    round.id, epoch.id
                ),
            });
        }
        if round.nonce >= epoch.issued_nonces(round.account) {
            return Err(CustodiaError::FairnessIntegrity {
                reason: format!(
                    "nonce {} was never issued to {} in {}",
                    round.nonce, round.account, epoch.id
                ),
            });
        }
        check_roll(epoch.secret.expose_secret(), round)
    }
}

impl Default for FairnessEngine {
    fn default() -> Self {
        Self::new(&FairnessConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = "a3f1c9e2d4b5a6978877665544332211ffeeddccbbaa99887766554433221100";

    fn engine() -> FairnessEngine {
        FairnessEngine::with_epoch(
            &FairnessConfig::default(),
            SeedEpoch::from_secret(EpochId(1), SEED.into(), Utc::now()),
        )
    }

    #[test]
    fn roll_is_deterministic_and_bounded() {
        for nonce in 0..200 {
            let a = roll(SEED, "lucky", nonce).unwrap();
            let b = roll(SEED, "lucky", nonce).unwrap();
            assert_eq!(a, b);
            assert!(a.value >= Decimal::ZERO && a.value < Decimal::ONE_HUNDRED);
            assert_eq!(a.value.scale(), ROLL_SCALE);
            assert_eq!(a.proof.len(), 64);
        }
    }

    #[test]
    fn roll_uses_first_four_digest_bytes() {
        let outcome = roll(SEED, "lucky", 3).unwrap();
        let head = u32::from_str_radix(&outcome.proof[..8], 16).unwrap();
        assert_eq!(
            outcome.value,
            Decimal::new(i64::from(head % 10_000), 2)
        );
    }

    #[test]
    fn inputs_change_the_roll() {
        let base = roll(SEED, "lucky", 0).unwrap();
        assert_ne!(base.proof, roll(SEED, "lucky", 1).unwrap().proof);
        assert_ne!(base.proof, roll(SEED, "other", 0).unwrap().proof);
        assert_ne!(base.proof, roll("another-seed", "lucky", 0).unwrap().proof);
    }

    #[test]
    fn nonces_are_per_account_and_start_at_zero() {
        let engine = engine();
        let alice = AccountId::new();
        let bob = AccountId::new();
        assert_eq!(engine.begin_round(alice).nonce, 0);
        assert_eq!(engine.begin_round(alice).nonce, 1);
        assert_eq!(engine.begin_round(bob).nonce, 0);
        assert_eq!(engine.active_epoch().issued_nonces(alice), 2);
    }

    #[test]
    fn rotation_resets_nonces_and_retires_old_epoch() {
        let engine = engine();
        let alice = AccountId::new();
        let before = engine.current_commitment();
        engine.begin_round(alice);

        let after = engine.rotate(Utc::now());
        assert_ne!(before, after);
        assert_eq!(engine.current_commitment(), after);
        assert_eq!(engine.active_epoch().id(), EpochId(2));
        assert_eq!(engine.begin_round(alice).nonce, 0);

        let revealed = engine.reveal_previous_seed().unwrap();
        assert_eq!(revealed.epoch_id, EpochId(1));
        assert_eq!(revealed.server_seed, SEED);
        assert_eq!(revealed.commitment, before);
        assert_eq!(commitment(&revealed.server_seed), before);
    }

    #[test]
    fn active_seed_is_never_revealed() {
        let engine = engine();
        assert!(matches!(
            engine.reveal_previous_seed(),
            Err(CustodiaError::NoRetiredEpoch)
        ));
        assert!(matches!(
            engine.reveal(EpochId(1)),
            Err(CustodiaError::EpochStillActive(_))
        ));
        assert!(matches!(
            engine.reveal(EpochId(9)),
            Err(CustodiaError::UnknownEpoch(_))
        ));
    }

    #[test]
    fn maybe_rotate_honours_interval() {
        let engine = engine();
        let started = engine.active_epoch().started_at();
        assert!(engine.maybe_rotate(started + Duration::hours(1)).is_none());
        assert!(engine.maybe_rotate(started + Duration::hours(25)).is_some());
        assert_eq!(engine.active_epoch().id(), EpochId(2));
        assert!(engine.maybe_rotate(started + Duration::hours(26)).is_none());
    }

    #[test]
    fn ticket_keeps_its_epoch_across_rotation() {
        let engine = engine();
        let alice = AccountId::new();
        let ticket = engine.begin_round(alice);
        engine.rotate(Utc::now());
        assert_eq!(ticket.epoch.id(), EpochId(1));
        assert!(ticket.epoch.is_retired());
        assert_eq!(ticket.roll("x").unwrap(), roll(SEED, "x", ticket.nonce).unwrap());
    }
}
