// retry loop constants
pub const RETRY_LIMIT: u32 = 10_000;
pub const LOCK_WAIT_MILLIS: u64 = 100;
pub const BARGE_WAIT_NANOS: u64 = 10 * 1_000_000;
pub const BLOCK_WAIT_MILLIS: u64 = 100;

// history constants
pub const DEFAULT_MIN_HISTORY: usize = 0;
pub const DEFAULT_MAX_HISTORY: usize = 10;

// event constants
pub const ON_ABORT_CHANNEL: &str = "on-abort";
pub const ON_COMMIT_CHANNEL: &str = "on-commit";
pub const AFTER_COMMIT_CHANNEL: &str = "after-commit";

pub const MVSTM_VERSION: &str = env!("CARGO_PKG_VERSION");
