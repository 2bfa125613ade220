//! Round executor: one wager, settled atomically.
//!
//! ```text
//! play ─► gate (freeze, seed, risk, parameter)
//!      ─► ledger unit of work { debit bet ─► ticket ─► roll ─► resolve ─► credit }
//!      ─► commit ─► risk.record ─► publish RoundSettled
//! ```
//!
//! Nothing moves before every gate has passed. A failure anywhere inside the
//! unit of work rolls back both the debit and the credit. The nonce is
//! claimed after the debit succeeds; a round that aborts later leaves a gap
//! in the account's nonce sequence, never a reuse.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use custodia_ledger::AssetLedger;
use custodia_notifier::SettlementNotifier;
use custodia_types::constants::MAX_CLIENT_SEED_LEN;
use custodia_types::{
    AccountId, CasinoConfig, CustodiaError, GameRound, Result, RoundId, SettlementEvent,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::fairness::FairnessEngine;
use crate::games::{GameKind, apply_edge};
use crate::risk::RiskGovernor;

/// A player's wager.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub account: AccountId,
    pub game: GameKind,
    pub bet: Decimal,
    pub client_seed: String,
    /// Target multiplier for threshold games.
    pub parameter: Option<Decimal>,
}

pub struct RoundExecutor {
    ledger: AssetLedger,
    fairness: Arc<FairnessEngine>,
    risk: Arc<RiskGovernor>,
    notifier: SettlementNotifier,
    asset: String,
    enabled: AtomicBool,
}

impl RoundExecutor {
    pub fn new(
        ledger: AssetLedger,
        fairness: Arc<FairnessEngine>,
        risk: Arc<RiskGovernor>,
        notifier: SettlementNotifier,
        config: &CasinoConfig,
    ) -> Self {
        Self {
            ledger,
            fairness,
            risk,
            notifier,
            asset: config.primary_asset.clone(),
            enabled: AtomicBool::new(config.games_enabled),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &AssetLedger {
        &self.ledger
    }

    #[must_use]
    pub fn fairness(&self) -> &FairnessEngine {
        &self.fairness
    }

    #[must_use]
    pub fn risk(&self) -> &RiskGovernor {
        &self.risk
    }

    /// Asset wagered and paid out.
    #[must_use]
    pub fn asset(&self) -> &str {
        &self.asset
    }

    /// Operator freeze switch. Rounds already inside the ledger finish.
    pub fn set_games_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "games switch changed");
    }

    #[must_use]
    pub fn games_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Play one round.
    ///
    /// # Errors
    /// - [`CustodiaError::GamesDisabled`], [`CustodiaError::InvalidClientSeed`],
    ///   [`CustodiaError::InvalidBet`], [`CustodiaError::BetExceedsLimit`],
    ///   [`CustodiaError::InvalidGameParameter`] before any funds move.
    /// - [`CustodiaError::InsufficientFunds`] if the bet cannot be debited.
    /// - Storage and concurrency errors from the ledger, with nothing applied.
    pub fn play(&self, request: PlayRequest) -> Result<GameRound> {
        if !self.games_enabled() {
            return Err(CustodiaError::GamesDisabled);
        }
        check_client_seed(&request.client_seed)?;
        self.risk.validate(request.bet)?;
        request.game.validate_parameter(request.parameter)?;

        let now = Utc::now();
        self.fairness.maybe_rotate(now);

        let id = RoundId::new();
        let reference = id.to_string();
        let PlayRequest {
            account,
            game,
            bet,
            client_seed,
            parameter,
        } = request;

        let settled = self.ledger.run(&reference, |tx| {
            tx.debit(account, &self.asset, bet)?;

            let ticket = self.fairness.begin_round(account);
            let rolled = ticket.roll(&client_seed)?;
            let resolution = game.resolve(bet, rolled.value, parameter)?;

            let edge = self.risk.current_edge();
            let payout = if resolution.win {
                apply_edge(resolution.payout, edge)
            } else {
                Decimal::ZERO
            };
            if resolution.win && payout > Decimal::ZERO {
                tx.credit(account, &self.asset, payout)?;
            }

            Ok(GameRound {
                id,
                account,
                game: game.label().to_string(),
                asset: self.asset.clone(),
                bet,
                parameter,
                client_seed: client_seed.clone(),
                epoch_id: ticket.epoch.id(),
                nonce: ticket.nonce,
                roll: rolled.value,
                proof: rolled.proof,
                win: resolution.win,
                payout,
                edge,
                seed_commitment: ticket.epoch.commitment().to_string(),
                settled_at: Utc::now(),
            })
        });
        let round = match settled {
            Ok(round) => round,
            Err(err) => {
                warn!(account = %account, bet = %bet, error = %err, "round aborted");
                return Err(err);
            }
        };

        self.risk.record(round.bet, round.payout);
        info!(
            round = %round.id,
            account = %round.account,
            game = %round.game,
            bet = %round.bet,
            roll = %round.roll,
            win = round.win,
            payout = %round.payout,
            epoch = %round.epoch_id,
            nonce = round.nonce,
            "round settled"
        );
        self.notifier.publish(SettlementEvent::RoundSettled {
            round: round.clone(),
        });
        Ok(round)
    }

    /// Check a settled round against the epoch it was played under.
    pub fn verify(&self, round: &GameRound) -> Result<()> {
        self.fairness.verify(round)
    }
}

impl std::fmt::Debug for RoundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundExecutor")
            .field("asset", &self.asset)
            .field("enabled", &self.games_enabled())
            .finish_non_exhaustive()
    }
}

fn check_client_seed(seed: &str) -> Result<()> {
    if seed.is_empty() {
        return Err(CustodiaError::InvalidClientSeed {
            reason: "client seed must not be empty".into(),
        });
    }
    if seed.len() > MAX_CLIENT_SEED_LEN {
        return Err(CustodiaError::InvalidClientSeed {
            reason: format!(
                "client seed is {} bytes, limit {MAX_CLIENT_SEED_LEN}",
                seed.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use custodia_types::{EpochId, ErrorKind, FairnessConfig, RiskConfig};

    use super::*;
    use crate::fairness::SeedEpoch;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn executor() -> RoundExecutor {
        let fairness = FairnessEngine::with_epoch(
            &FairnessConfig::default(),
            SeedEpoch::from_secret(EpochId(1), "unit-test-seed".into(), Utc::now()),
        );
        RoundExecutor::new(
            AssetLedger::in_memory(),
            Arc::new(fairness),
            Arc::new(RiskGovernor::new(RiskConfig::default())),
            SettlementNotifier::new(64),
            &CasinoConfig::default(),
        )
    }

    fn funded(executor: &RoundExecutor, amount: Decimal) -> AccountId {
        let account = AccountId::new();
        executor.ledger().credit("seed", account, "BX", amount).unwrap();
        account
    }

    fn coin(account: AccountId, bet: Decimal) -> PlayRequest {
        PlayRequest {
            account,
            game: GameKind::coin_flip(),
            bet,
            client_seed: "seed-1".into(),
            parameter: None,
        }
    }

    #[test]
    fn balance_moves_by_net_of_round() {
        let executor = executor();
        let alice = funded(&executor, dec(100));
        let round = executor.play(coin(alice, dec(10))).unwrap();

        let expected = dec(100) - dec(10) + round.payout;
        assert_eq!(executor.ledger().balance(alice, "BX").unwrap(), expected);
        if round.win {
            assert_eq!(round.payout, Decimal::new(194, 1));
        } else {
            assert_eq!(round.payout, Decimal::ZERO);
        }
        assert_eq!(round.nonce, 0);
        assert_eq!(round.edge, Decimal::new(300, 4));
        executor.verify(&round).unwrap();

        let journal = executor.ledger().journal(alice, "BX").unwrap();
        assert!(journal.iter().skip(1).all(|e| e.reference == round.reference()));
    }

    #[test]
    fn gates_reject_before_funds_move() {
        let executor = executor();
        let alice = funded(&executor, dec(100));

        let mut empty_seed = coin(alice, dec(1));
        empty_seed.client_seed.clear();
        let mut long_seed = coin(alice, dec(1));
        long_seed.client_seed = "x".repeat(MAX_CLIENT_SEED_LEN + 1);
        let mut stray_parameter = coin(alice, dec(1));
        stray_parameter.parameter = Some(dec(2));

        for request in [
            empty_seed,
            long_seed,
            coin(alice, dec(5_000)),
            coin(alice, Decimal::ZERO),
            stray_parameter,
        ] {
            let err = executor.play(request).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
        }
        assert_eq!(executor.ledger().balance(alice, "BX").unwrap(), dec(100));
        assert_eq!(executor.risk().totals().rounds, 0);
        assert_eq!(executor.fairness().active_epoch().issued_nonces(alice), 0);
    }

    #[test]
    fn unfunded_bet_claims_no_nonce() {
        let executor = executor();
        let alice = funded(&executor, dec(1));
        let err = executor.play(coin(alice, dec(2))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(executor.fairness().active_epoch().issued_nonces(alice), 0);
    }

    #[test]
    fn frozen_games_reject() {
        let executor = executor();
        let alice = funded(&executor, dec(10));
        executor.set_games_enabled(false);
        assert!(matches!(
            executor.play(coin(alice, dec(1))),
            Err(CustodiaError::GamesDisabled)
        ));
        executor.set_games_enabled(true);
        assert!(executor.play(coin(alice, dec(1))).is_ok());
    }
}
