//! System-wide constants for Custodia.

/// Decimal places kept for ledger amounts (payouts are rounded to this).
pub const AMOUNT_PRECISION: u32 = 8;

/// Rolls are reduced modulo this value, then divided by 100.
pub const ROLL_MODULUS: u32 = 10_000;

/// Decimal places of a roll value.
pub const ROLL_SCALE: u32 = 2;

/// Bytes of entropy in a freshly generated server seed.
pub const SEED_BYTES: usize = 32;

/// Default seed rotation interval (24 hours).
pub const DEFAULT_SEED_ROTATION_SECS: u64 = 86_400;

/// Maximum accepted client seed length in bytes.
pub const MAX_CLIENT_SEED_LEN: usize = 64;

/// Default bounded wait when acquiring a store transaction or book lock.
pub const DEFAULT_LOCK_WAIT_MS: u64 = 250;

/// Default number of retries after a concurrency conflict.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default first backoff delay after a conflict.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Upper bound for a single backoff delay.
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 200;

/// Asset wagered and paid out by the casino.
pub const DEFAULT_PRIMARY_ASSET: &str = "BX";

/// Default minimum bet, in hundredths of the primary asset.
pub const DEFAULT_MIN_BET_CENTS: i64 = 1;

/// Default maximum bet, in whole units of the primary asset.
pub const DEFAULT_MAX_BET: i64 = 1_000;

/// Base house edge in basis points (RTP 97%).
pub const DEFAULT_BASE_EDGE_BPS: i64 = 300;

/// Edge applied while the house is losing beyond the loss threshold.
pub const DEFAULT_WIDENED_EDGE_BPS: i64 = 500;

/// Edge applied while the house is winning beyond the win threshold.
pub const DEFAULT_NARROWED_EDGE_BPS: i64 = 150;

/// House net loss that widens the edge.
pub const DEFAULT_LOSS_THRESHOLD: i64 = 10_000;

/// House net win that narrows the edge.
pub const DEFAULT_WIN_THRESHOLD: i64 = 50_000;

/// Largest target multiplier accepted by the threshold game.
pub const DEFAULT_MAX_MULTIPLIER: i64 = 100;

/// Minimum withdrawal amount.
pub const DEFAULT_WITHDRAW_MIN: i64 = 10;

/// Flat withdrawal fee, in tenths.
pub const DEFAULT_WITHDRAW_FEE_TENTHS: i64 = 5;

/// Per-account daily withdrawal cap.
pub const DEFAULT_WITHDRAW_DAILY_LIMIT: i64 = 2_000;

/// Deposit references remembered for idempotency.
pub const DEPOSIT_IDEMPOTENCY_CACHE_SIZE: usize = 500_000;

/// Trades retained per market for the recent-trade tape.
pub const DEFAULT_TRADE_TAPE_LEN: usize = 500;

/// Bounded capacity of the settlement event channel.
pub const DEFAULT_NOTIFIER_CAPACITY: usize = 1_024;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Custodia";
