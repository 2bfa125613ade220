//! Error types for Custodia.
//!
//! All errors use the `CU_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (amounts, orders, markets)
//! - 2xx: Funds errors
//! - 3xx: Concurrency errors (retryable)
//! - 4xx: Storage / ledger integrity errors
//! - 5xx: Fairness integrity errors
//! - 6xx: Casino validation errors
//! - 7xx: Custody (deposit / withdrawal) validation errors
//! - 9xx: General / internal errors
//!
//! Every variant maps onto one stable [`ErrorKind`], which is what callers
//! at the service boundary should branch on.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AccountId, EpochId, OrderId};

/// Stable error taxonomy reported for every rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input, self-trade, bet out of range.
    Validation,
    /// Balance check failed.
    InsufficientFunds,
    /// Lock / transaction wait timed out. Retryable.
    ConcurrencyConflict,
    /// Underlying store unavailable or inconsistent. Fatal to the operation.
    Storage,
    /// Seed / nonce inconsistency. Requires audit.
    FairnessIntegrity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::InsufficientFunds => write!(f, "INSUFFICIENT_FUNDS"),
            Self::ConcurrencyConflict => write!(f, "CONCURRENCY_CONFLICT"),
            Self::Storage => write!(f, "STORAGE"),
            Self::FairnessIntegrity => write!(f, "FAIRNESS_INTEGRITY"),
        }
    }
}

/// Central error enum for all Custodia operations.
#[derive(Debug, Error)]
pub enum CustodiaError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A ledger amount was negative or otherwise unusable.
    #[error("CU_ERR_100: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    /// The order failed validation (bad price, size, tick, lot).
    #[error("CU_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// No market is configured for this pair.
    #[error("CU_ERR_102: Unknown market: {0}")]
    UnknownMarket(String),

    /// The requested order was not found in the book.
    #[error("CU_ERR_103: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with this ID already exists in the book.
    #[error("CU_ERR_104: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The incoming order would cross a resting order of the same account.
    #[error("CU_ERR_105: Self-trade prevented: account {0} is on both sides")]
    SelfTrade(AccountId),

    /// The caller does not own the order it tried to cancel.
    #[error("CU_ERR_106: Order {0} is not owned by the caller")]
    NotOrderOwner(OrderId),

    /// A transfer named the same account on both sides.
    #[error("CU_ERR_107: Invalid transfer: {reason}")]
    InvalidTransfer { reason: String },

    // =================================================================
    // Funds Errors (2xx)
    // =================================================================
    /// Not enough balance to perform the operation.
    #[error(
        "CU_ERR_200: Insufficient funds for {account} {asset}: need {needed}, have {available}"
    )]
    InsufficientFunds {
        account: AccountId,
        asset: String,
        needed: Decimal,
        available: Decimal,
    },

    // =================================================================
    // Concurrency Errors (3xx)
    // =================================================================
    /// A lock or transaction slot could not be acquired within the bounded wait.
    #[error("CU_ERR_300: Concurrency conflict on {resource} after {attempts} attempt(s)")]
    ConcurrencyConflict { resource: String, attempts: u32 },

    // =================================================================
    // Storage Errors (4xx)
    // =================================================================
    /// The underlying store failed.
    #[error("CU_ERR_400: Storage error: {0}")]
    Storage(String),

    /// Journal entries and balances disagree.
    #[error("CU_ERR_401: Ledger integrity violation: {reason}")]
    LedgerIntegrity { reason: String },

    // =================================================================
    // Fairness Integrity Errors (5xx)
    // =================================================================
    /// Seed, commitment or nonce inconsistency.
    #[error("CU_ERR_500: Fairness integrity violation: {reason}")]
    FairnessIntegrity { reason: String },

    /// No epoch with this ID is known.
    #[error("CU_ERR_501: Unknown seed epoch: {0}")]
    UnknownEpoch(EpochId),

    /// The seed of the active epoch cannot be revealed.
    #[error("CU_ERR_502: Seed of {0} is still active")]
    EpochStillActive(EpochId),

    /// No epoch has been retired yet.
    #[error("CU_ERR_503: No retired seed epoch to reveal")]
    NoRetiredEpoch,

    // =================================================================
    // Casino Validation Errors (6xx)
    // =================================================================
    /// The bet is zero, negative or below the minimum.
    #[error("CU_ERR_600: Invalid bet: {reason}")]
    InvalidBet { reason: String },

    /// The bet exceeds the configured maximum.
    #[error("CU_ERR_601: Bet {bet} exceeds limit {max}")]
    BetExceedsLimit { bet: Decimal, max: Decimal },

    /// The game parameter is missing or out of range.
    #[error("CU_ERR_602: Invalid game parameter: {reason}")]
    InvalidGameParameter { reason: String },

    /// The client seed is empty or too long.
    #[error("CU_ERR_603: Invalid client seed: {reason}")]
    InvalidClientSeed { reason: String },

    /// All games are frozen by the operator.
    #[error("CU_ERR_604: Games are disabled")]
    GamesDisabled,

    // =================================================================
    // Custody Validation Errors (7xx)
    // =================================================================
    /// The deposit reference was already credited.
    #[error("CU_ERR_700: Deposit already credited: {0}")]
    DuplicateDeposit(String),

    /// The withdrawal is below the configured minimum.
    #[error("CU_ERR_701: Withdrawal {amount} below minimum {min}")]
    WithdrawalBelowMinimum { amount: Decimal, min: Decimal },

    /// The withdrawal would exceed today's cap.
    #[error("CU_ERR_702: Daily withdrawal limit exceeded: used {used}, requested {requested}, limit {limit}")]
    DailyWithdrawalLimit {
        used: Decimal,
        requested: Decimal,
        limit: Decimal,
    },

    /// A confirmed deposit notification that cannot be credited.
    #[error("CU_ERR_703: Invalid deposit: {reason}")]
    InvalidDeposit { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CU_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CU_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CU_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl CustodiaError {
    /// The stable taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. }
            | Self::InvalidOrder { .. }
            | Self::UnknownMarket(_)
            | Self::OrderNotFound(_)
            | Self::DuplicateOrder(_)
            | Self::SelfTrade(_)
            | Self::NotOrderOwner(_)
            | Self::InvalidTransfer { .. }
            | Self::UnknownEpoch(_)
            | Self::EpochStillActive(_)
            | Self::NoRetiredEpoch
            | Self::InvalidBet { .. }
            | Self::BetExceedsLimit { .. }
            | Self::InvalidGameParameter { .. }
            | Self::InvalidClientSeed { .. }
            | Self::GamesDisabled
            | Self::DuplicateDeposit(_)
            | Self::WithdrawalBelowMinimum { .. }
            | Self::DailyWithdrawalLimit { .. }
            | Self::InvalidDeposit { .. }
            | Self::Configuration(_) => ErrorKind::Validation,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            Self::Storage(_)
            | Self::LedgerIntegrity { .. }
            | Self::Internal(_)
            | Self::Serialization(_) => ErrorKind::Storage,
            Self::FairnessIntegrity { .. } => ErrorKind::FairnessIntegrity,
        }
    }

    /// Only concurrency conflicts may be retried by the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }

    /// The numeric `CU_ERR_` code embedded in the display string.
    #[must_use]
    pub fn code(&self) -> String {
        let msg = self.to_string();
        msg.split(':').next().unwrap_or_default().to_string()
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CustodiaError>;

impl From<serde_json::Error> for CustodiaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
