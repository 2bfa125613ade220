//! Risk governor: bet limits and the adaptive house edge.
//!
//! Every wager passes [`RiskGovernor::validate`] before any funds move.
//! The live edge is derived from platform-wide running totals:
//!
//! - platform net below `-loss_threshold`: widened edge
//! - platform net above `win_threshold`: narrowed edge
//! - otherwise: base edge
//!
//! Both totals sit behind one lock and move together in
//! [`RiskGovernor::record`], so an edge read never sees one updated
//! without the other.

use custodia_types::{CustodiaError, Result, RiskConfig};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cumulative wagering since start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskTotals {
    pub rounds: u64,
    pub wagered: Decimal,
    pub paid_out: Decimal,
}

impl RiskTotals {
    /// Platform result: positive when the house is ahead.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.wagered - self.paid_out
    }
}

/// Bet gate and edge controller shared by all game rounds.
#[derive(Debug)]
pub struct RiskGovernor {
    config: RiskConfig,
    totals: Mutex<RiskTotals>,
}

impl RiskGovernor {
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            totals: Mutex::new(RiskTotals::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Reject bets that are non-positive, below the minimum or above the
    /// maximum.
    pub fn validate(&self, bet: Decimal) -> Result<()> {
        if bet <= Decimal::ZERO {
            return Err(CustodiaError::InvalidBet {
                reason: format!("bet must be positive, got {bet}"),
            });
        }
        if bet < self.config.min_bet {
            return Err(CustodiaError::InvalidBet {
                reason: format!("bet {bet} below minimum {}", self.config.min_bet),
            });
        }
        if bet > self.config.max_bet {
            warn!(bet = %bet, max = %self.config.max_bet, "bet over limit");
            return Err(CustodiaError::BetExceedsLimit {
                bet,
                max: self.config.max_bet,
            });
        }
        Ok(())
    }

    /// House edge for the next round.
    #[must_use]
    pub fn current_edge(&self) -> Decimal {
        edge_for(&self.config, &self.totals.lock())
    }

    /// Account for one settled round.
    pub fn record(&self, bet: Decimal, payout: Decimal) {
        let mut totals = self.totals.lock();
        totals.rounds += 1;
        totals.wagered += bet;
        totals.paid_out += payout;
        debug!(
            rounds = totals.rounds,
            net = %totals.net(),
            edge = %edge_for(&self.config, &totals),
            "risk totals updated"
        );
    }

    #[must_use]
    pub fn totals(&self) -> RiskTotals {
        *self.totals.lock()
    }
}

impl Default for RiskGovernor {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

fn edge_for(config: &RiskConfig, totals: &RiskTotals) -> Decimal {
    let net = totals.net();
    if net < -config.loss_threshold {
        config.widened_edge
    } else if net > config.win_threshold {
        config.narrowed_edge
    } else {
        config.base_edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn bet_bounds() {
        let risk = RiskGovernor::default();
        assert!(matches!(
            risk.validate(Decimal::ZERO),
            Err(CustodiaError::InvalidBet { .. })
        ));
        assert!(matches!(
            risk.validate(dec(-5)),
            Err(CustodiaError::InvalidBet { .. })
        ));
        assert!(matches!(
            risk.validate(Decimal::new(1, 3)),
            Err(CustodiaError::InvalidBet { .. })
        ));
        assert!(matches!(
            risk.validate(dec(1_001)),
            Err(CustodiaError::BetExceedsLimit { .. })
        ));
        assert!(risk.validate(dec(1_000)).is_ok());
        assert!(risk.validate(Decimal::new(1, 2)).is_ok());
    }

    #[test]
    fn edge_starts_at_base() {
        let risk = RiskGovernor::default();
        assert_eq!(risk.current_edge(), Decimal::new(300, 4));
        assert_eq!(risk.totals(), RiskTotals::default());
    }

    #[test]
    fn edge_widens_after_heavy_house_losses() {
        let risk = RiskGovernor::default();
        risk.record(dec(1_000), dec(11_500));
        assert_eq!(risk.totals().net(), dec(-10_500));
        assert_eq!(risk.current_edge(), Decimal::new(500, 4));
    }

    #[test]
    fn edge_narrows_after_large_house_wins() {
        let risk = RiskGovernor::default();
        for _ in 0..51 {
            risk.record(dec(1_000), Decimal::ZERO);
        }
        assert_eq!(risk.totals().rounds, 51);
        assert_eq!(risk.current_edge(), Decimal::new(150, 4));
    }

    #[test]
    fn thresholds_are_exclusive() {
        let risk = RiskGovernor::default();
        risk.record(Decimal::ZERO, dec(10_000));
        assert_eq!(risk.current_edge(), Decimal::new(300, 4));
    }
}
