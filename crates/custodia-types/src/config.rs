//! Configuration types for the ledger, markets, casino and custody desk.
//!
//! Every section has a `Default` drawn from [`crate::constants`], so a TOML
//! file only needs to name what it overrides.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{CustodiaError, MarketPair, Result, constants};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodiaConfig {
    /// Store transaction acquisition.
    pub ledger: RetryPolicy,
    /// Book lock acquisition.
    pub matching: RetryPolicy,
    pub markets: Vec<MarketConfig>,
    pub fairness: FairnessConfig,
    pub risk: RiskConfig,
    pub casino: CasinoConfig,
    pub custody: CustodyConfig,
    pub notifier: NotifierConfig,
}

impl Default for CustodiaConfig {
    fn default() -> Self {
        Self {
            ledger: RetryPolicy::default(),
            matching: RetryPolicy::default(),
            markets: vec![MarketConfig::bx_usdt(), MarketConfig::ton_usdt()],
            fairness: FairnessConfig::default(),
            risk: RiskConfig::default(),
            casino: CasinoConfig::default(),
            custody: CustodyConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl CustodiaConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| CustodiaError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make operations ill-defined.
    pub fn validate(&self) -> Result<()> {
        self.ledger.validate("ledger")?;
        self.matching.validate("matching")?;
        for market in &self.markets {
            market.validate()?;
        }
        self.risk.validate()?;
        if self.casino.primary_asset.is_empty() {
            return Err(CustodiaError::Configuration(
                "casino.primary_asset must not be empty".into(),
            ));
        }
        if self.casino.max_multiplier <= Decimal::ONE {
            return Err(CustodiaError::Configuration(
                "casino.max_multiplier must be > 1".into(),
            ));
        }
        if self.fairness.rotation_interval_secs == 0 {
            return Err(CustodiaError::Configuration(
                "fairness.rotation_interval_secs must be > 0".into(),
            ));
        }
        if self.notifier.capacity == 0 {
            return Err(CustodiaError::Configuration(
                "notifier.capacity must be > 0".into(),
            ));
        }
        if self.custody.deposit_cache_size == 0 {
            return Err(CustodiaError::Configuration(
                "custody.deposit_cache_size must be > 0".into(),
            ));
        }
        self.custody.withdrawals.validate()
    }
}

/// Bounded wait plus exponential backoff for lock acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum time to wait for one acquisition attempt.
    pub lock_wait_ms: u64,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            lock_wait_ms: constants::DEFAULT_LOCK_WAIT_MS,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            backoff_base_ms: constants::DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: constants::DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    /// Un-jittered delay before retry number `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        let ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.lock_wait_ms == 0 {
            return Err(CustodiaError::Configuration(format!(
                "{section}.lock_wait_ms must be > 0"
            )));
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(CustodiaError::Configuration(format!(
                "{section}.backoff_base_ms must not exceed backoff_max_ms"
            )));
        }
        Ok(())
    }
}

/// Per-market configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Base asset (e.g., "BX").
    pub base: String,
    /// Quote asset (e.g., "USDT").
    pub quote: String,
    /// Minimum order size in base asset.
    pub min_order_size: Decimal,
    /// Tick size (price granularity).
    pub tick_size: Decimal,
    /// Lot size (quantity granularity).
    pub lot_size: Decimal,
    /// Trades retained for the recent-trade tape.
    #[serde(default = "default_trade_tape_len")]
    pub trade_tape_len: usize,
}

fn default_trade_tape_len() -> usize {
    constants::DEFAULT_TRADE_TAPE_LEN
}

impl MarketConfig {
    /// Create a default BX/USDT market config.
    #[must_use]
    pub fn bx_usdt() -> Self {
        Self {
            base: "BX".to_string(),
            quote: "USDT".to_string(),
            min_order_size: Decimal::new(1, 2), // 0.01 BX
            tick_size: Decimal::new(1, 4),      // 0.0001 USDT
            lot_size: Decimal::new(1, 2),       // 0.01 BX
            trade_tape_len: constants::DEFAULT_TRADE_TAPE_LEN,
        }
    }

    /// Create a default TON/USDT market config.
    #[must_use]
    pub fn ton_usdt() -> Self {
        Self {
            base: "TON".to_string(),
            quote: "USDT".to_string(),
            min_order_size: Decimal::new(1, 3), // 0.001 TON
            tick_size: Decimal::new(1, 3),      // 0.001 USDT
            lot_size: Decimal::new(1, 3),       // 0.001 TON
            trade_tape_len: constants::DEFAULT_TRADE_TAPE_LEN,
        }
    }

    #[must_use]
    pub fn pair(&self) -> MarketPair {
        MarketPair::new(self.base.clone(), self.quote.clone())
    }

    /// Returns the market symbol (e.g., "BX/USDT").
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    /// A market needs two distinct assets and positive tick and lot sizes.
    pub fn validate(&self) -> Result<()> {
        if self.base.is_empty() || self.quote.is_empty() || self.base == self.quote {
            return Err(CustodiaError::Configuration(format!(
                "market {} must name two distinct assets",
                self.symbol()
            )));
        }
        if self.tick_size <= Decimal::ZERO || self.lot_size <= Decimal::ZERO {
            return Err(CustodiaError::Configuration(format!(
                "market {} tick_size and lot_size must be > 0",
                self.symbol()
            )));
        }
        if self.min_order_size < Decimal::ZERO {
            return Err(CustodiaError::Configuration(format!(
                "market {} min_order_size must be >= 0",
                self.symbol()
            )));
        }
        Ok(())
    }
}

/// Seed epoch lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FairnessConfig {
    pub rotation_interval_secs: u64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            rotation_interval_secs: constants::DEFAULT_SEED_ROTATION_SECS,
        }
    }
}

impl FairnessConfig {
    #[must_use]
    pub fn rotation_interval(&self) -> chrono::Duration {
        let secs = u32::try_from(self.rotation_interval_secs).unwrap_or(u32::MAX);
        chrono::Duration::seconds(i64::from(secs))
    }
}

/// Bet limits and the feedback-controlled house edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    /// Edge while the house position is within both thresholds.
    pub base_edge: Decimal,
    /// Edge once the house has lost more than `loss_threshold`.
    pub widened_edge: Decimal,
    /// Edge once the house has won more than `win_threshold`.
    pub narrowed_edge: Decimal,
    pub loss_threshold: Decimal,
    pub win_threshold: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_bet: Decimal::new(constants::DEFAULT_MIN_BET_CENTS, 2),
            max_bet: Decimal::new(constants::DEFAULT_MAX_BET, 0),
            base_edge: Decimal::new(constants::DEFAULT_BASE_EDGE_BPS, 4),
            widened_edge: Decimal::new(constants::DEFAULT_WIDENED_EDGE_BPS, 4),
            narrowed_edge: Decimal::new(constants::DEFAULT_NARROWED_EDGE_BPS, 4),
            loss_threshold: Decimal::new(constants::DEFAULT_LOSS_THRESHOLD, 0),
            win_threshold: Decimal::new(constants::DEFAULT_WIN_THRESHOLD, 0),
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<()> {
        if self.min_bet < Decimal::ZERO || self.max_bet <= Decimal::ZERO {
            return Err(CustodiaError::Configuration(
                "risk.min_bet must be >= 0 and risk.max_bet > 0".into(),
            ));
        }
        if self.min_bet > self.max_bet {
            return Err(CustodiaError::Configuration(
                "risk.min_bet must not exceed risk.max_bet".into(),
            ));
        }
        for (name, edge) in [
            ("base_edge", self.base_edge),
            ("widened_edge", self.widened_edge),
            ("narrowed_edge", self.narrowed_edge),
        ] {
            if edge < Decimal::ZERO || edge >= Decimal::ONE {
                return Err(CustodiaError::Configuration(format!(
                    "risk.{name} must be in [0, 1)"
                )));
            }
        }
        if self.loss_threshold < Decimal::ZERO || self.win_threshold < Decimal::ZERO {
            return Err(CustodiaError::Configuration(
                "risk thresholds must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// Game round execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CasinoConfig {
    /// Asset wagered and paid out.
    pub primary_asset: String,
    /// Operator freeze switch.
    pub games_enabled: bool,
    /// Largest target multiplier the threshold game accepts.
    pub max_multiplier: Decimal,
}

impl Default for CasinoConfig {
    fn default() -> Self {
        Self {
            primary_asset: constants::DEFAULT_PRIMARY_ASSET.to_string(),
            games_enabled: true,
            max_multiplier: Decimal::new(constants::DEFAULT_MAX_MULTIPLIER, 0),
        }
    }
}

/// Deposit intake and withdrawal policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    pub deposit_cache_size: usize,
    pub withdrawals: WithdrawalPolicy,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            deposit_cache_size: constants::DEPOSIT_IDEMPOTENCY_CACHE_SIZE,
            withdrawals: WithdrawalPolicy::default(),
        }
    }
}

/// Limits applied to every withdrawal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalPolicy {
    pub min_amount: Decimal,
    /// Flat fee debited on top of the withdrawn amount.
    pub fee: Decimal,
    /// Cap on the sum of withdrawn amounts per account per UTC day.
    pub daily_limit: Decimal,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(constants::DEFAULT_WITHDRAW_MIN, 0),
            fee: Decimal::new(constants::DEFAULT_WITHDRAW_FEE_TENTHS, 1),
            daily_limit: Decimal::new(constants::DEFAULT_WITHDRAW_DAILY_LIMIT, 0),
        }
    }
}

impl WithdrawalPolicy {
    fn validate(&self) -> Result<()> {
        if self.min_amount <= Decimal::ZERO || self.fee < Decimal::ZERO {
            return Err(CustodiaError::Configuration(
                "withdrawals.min_amount must be > 0 and fee >= 0".into(),
            ));
        }
        if self.daily_limit < self.min_amount {
            return Err(CustodiaError::Configuration(
                "withdrawals.daily_limit must be >= min_amount".into(),
            ));
        }
        Ok(())
    }
}

/// Settlement event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub capacity: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            capacity: constants::DEFAULT_NOTIFIER_CAPACITY,
        }
    }
}
