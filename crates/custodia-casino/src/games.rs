//! Game kinds and their payout rules.
//!
//! A closed set: every kind is resolved by one exhaustive `match`, and the
//! roll is always a value in [0, 100). Payouts returned here are gross; the
//! house edge is applied by the executor.

use custodia_types::constants::AMOUNT_PRECISION;
use custodia_types::{CasinoConfig, CustodiaError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One step of a tiered payout table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutTier {
    /// Smallest roll that reaches this tier.
    pub min_roll: Decimal,
    pub multiplier: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GameKind {
    /// Player picks a target multiplier `m`; wins when `roll < 100 / m`.
    Threshold { max_multiplier: Decimal },
    /// Wins when `roll < threshold`, paying a fixed multiple.
    FixedThreshold {
        threshold: Decimal,
        multiplier: Decimal,
    },
    /// Highest tier at or below the roll pays; rolls under every tier lose.
    Tiered { tiers: Vec<PayoutTier> },
}

/// Gross outcome of one round, before the house edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub win: bool,
    pub payout: Decimal,
}

impl Resolution {
    const LOSS: Self = Self {
        win: false,
        payout: Decimal::ZERO,
    };
}

impl GameKind {
    #[must_use]
    pub fn threshold(max_multiplier: Decimal) -> Self {
        Self::Threshold { max_multiplier }
    }

    /// 50 / 2x.
    #[must_use]
    pub fn coin_flip() -> Self {
        Self::FixedThreshold {
            threshold: Decimal::new(50, 0),
            multiplier: Decimal::TWO,
        }
    }

    /// 48 / 2x.
    #[must_use]
    pub fn fast_blackjack() -> Self {
        Self::FixedThreshold {
            threshold: Decimal::new(48, 0),
            multiplier: Decimal::TWO,
        }
    }

    /// 50 / 1.8x.
    #[must_use]
    pub fn crash() -> Self {
        Self::FixedThreshold {
            threshold: Decimal::new(50, 0),
            multiplier: Decimal::new(18, 1),
        }
    }

    /// 70 → 2x, 90 → 5x, 97 → 10x.
    #[must_use]
    pub fn slots() -> Self {
        let tier = |min_roll: i64, multiplier: i64| PayoutTier {
            min_roll: Decimal::new(min_roll, 0),
            multiplier: Decimal::new(multiplier, 0),
        };
        Self::Tiered {
            tiers: vec![tier(70, 2), tier(90, 5), tier(97, 10)],
        }
    }

    /// Catalogue lookup by public game name.
    #[must_use]
    pub fn preset(name: &str, config: &CasinoConfig) -> Option<Self> {
        match name {
            "dice" | "limbo" => Some(Self::threshold(config.max_multiplier)),
            "coin-flip" => Some(Self::coin_flip()),
            "fast-blackjack" => Some(Self::fast_blackjack()),
            "crash" => Some(Self::crash()),
            "slots" => Some(Self::slots()),
            _ => None,
        }
    }

    /// Label recorded on settled rounds.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Threshold { .. } => "threshold",
            Self::FixedThreshold { .. } => "fixed-threshold",
            Self::Tiered { .. } => "tiered",
        }
    }

    /// Check the player's parameter before any funds move.
    ///
    /// Threshold games need a multiplier in `(1, max_multiplier]`; the
    /// other kinds take none.
    pub fn validate_parameter(&self, parameter: Option<Decimal>) -> Result<()> {
        match (self, parameter) {
            (Self::Threshold { max_multiplier }, Some(m)) => {
                if m <= Decimal::ONE || m > *max_multiplier {
                    return Err(CustodiaError::InvalidGameParameter {
                        reason: format!("multiplier must be in (1, {max_multiplier}], got {m}"),
                    });
                }
                Ok(())
            }
            (Self::Threshold { .. }, None) => Err(CustodiaError::InvalidGameParameter {
                reason: "threshold game needs a target multiplier".into(),
            }),
            (Self::FixedThreshold { .. } | Self::Tiered { .. }, Some(_)) => {
                Err(CustodiaError::InvalidGameParameter {
                    reason: format!("{} game takes no parameter", self.label()),
                })
            }
            (Self::FixedThreshold { .. } | Self::Tiered { .. }, None) => Ok(()),
        }
    }

    /// Decide win and gross payout for `roll`.
    pub fn resolve(&self, bet: Decimal, roll: Decimal, parameter: Option<Decimal>) -> Result<Resolution> {
        self.validate_parameter(parameter)?;
        let paying = |multiplier: Decimal| Resolution {
            win: true,
            payout: bet * multiplier,
        };
        Ok(match self {
            Self::Threshold { .. } => {
                let multiplier = parameter.unwrap_or(Decimal::ONE);
                let win_probability = Decimal::ONE_HUNDRED / multiplier;
                if roll < win_probability {
                    paying(multiplier)
                } else {
                    Resolution::LOSS
                }
            }
            Self::FixedThreshold {
                threshold,
                multiplier,
            } => {
                if roll < *threshold {
                    paying(*multiplier)
                } else {
                    Resolution::LOSS
                }
            }
            Self::Tiered { tiers } => tiers
                .iter()
                .filter(|tier| tier.min_roll <= roll)
                .max_by_key(|tier| tier.min_roll)
                .map_or(Resolution::LOSS, |tier| paying(tier.multiplier)),
        })
    }
}

/// Discount a gross payout by the house edge, rounded to ledger precision.
#[must_use]
pub fn apply_edge(gross: Decimal, edge: Decimal) -> Decimal {
    (gross * (Decimal::ONE - edge))
        .round_dp_with_strategy(AMOUNT_PRECISION, RoundingStrategy::ToZero)
}
