//! Configuration of the transaction engine.

use crate::common::{
    atomic, Atomic, ReadExecutor, WriteExecutor, BARGE_WAIT_NANOS, BLOCK_WAIT_MILLIS,
    DEFAULT_MAX_HISTORY, DEFAULT_MIN_HISTORY, LOCK_WAIT_MILLIS, RETRY_LIMIT,
};
use crate::errors::{ErrorKind, StmError, StmResult};
use once_cell::sync::Lazy;
use std::time::Duration;

static DEFAULT_CONFIG: Lazy<Atomic<StmConfig>> = Lazy::new(|| atomic(StmConfig::new()));

/// Returns the process-wide configuration used by [`run`](crate::run) and new refs.
pub fn default_config() -> StmConfig {
    DEFAULT_CONFIG.read_with(|config| *config)
}

/// Replaces the process-wide configuration. Transactions already running keep
/// the configuration they started with.
pub fn set_default_config(config: StmConfig) {
    DEFAULT_CONFIG.write_with(|current| *current = config);
}

/// Tunables of the retry loop and the default history bounds of new refs.
///
/// # Examples
///
/// ```rust,ignore
/// use mvstm::config::StmBuilder;
/// use std::time::Duration;
///
/// let config = StmBuilder::new()
///     .retry_limit(500)
///     .barge_wait(Duration::from_millis(5))
///     .build()?;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StmConfig {
    retry_limit: u32,
    lock_wait: Duration,
    barge_wait: Duration,
    block_wait: Duration,
    min_history: usize,
    max_history: usize,
}

impl Default for StmConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StmConfig {
    pub fn new() -> Self {
        StmConfig {
            retry_limit: RETRY_LIMIT,
            lock_wait: Duration::from_millis(LOCK_WAIT_MILLIS),
            barge_wait: Duration::from_nanos(BARGE_WAIT_NANOS),
            block_wait: Duration::from_millis(BLOCK_WAIT_MILLIS),
            min_history: DEFAULT_MIN_HISTORY,
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Maximum number of attempts before a transaction fails.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Bound on write-lock acquisition and on the block-and-bail wait.
    pub fn lock_wait(&self) -> Duration {
        self.lock_wait
    }

    /// Minimum age of a transaction before it may barge a younger one.
    pub fn barge_wait(&self) -> Duration {
        self.barge_wait
    }

    /// Bound on one blocking-retry suspension.
    pub fn block_wait(&self) -> Duration {
        self.block_wait
    }

    pub fn min_history(&self) -> usize {
        self.min_history
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn set_retry_limit(&mut self, retry_limit: u32) -> StmResult<()> {
        if retry_limit == 0 {
            log::error!("Retry limit must be positive");
            return Err(StmError::new(
                "Retry limit must be positive",
                ErrorKind::InvalidArgument,
            ));
        }
        self.retry_limit = retry_limit;
        Ok(())
    }

    pub fn set_lock_wait(&mut self, lock_wait: Duration) {
        self.lock_wait = lock_wait;
    }

    pub fn set_barge_wait(&mut self, barge_wait: Duration) {
        self.barge_wait = barge_wait;
    }

    pub fn set_block_wait(&mut self, block_wait: Duration) {
        self.block_wait = block_wait;
    }

    /// Sets the default history bounds of new refs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `max_history` is zero or below `min_history`.
    pub fn set_history(&mut self, min_history: usize, max_history: usize) -> StmResult<()> {
        validate_history(min_history, max_history)?;
        self.min_history = min_history;
        self.max_history = max_history;
        Ok(())
    }
}

pub(crate) fn validate_history(min_history: usize, max_history: usize) -> StmResult<()> {
    if max_history == 0 {
        log::error!("Max history must be positive");
        return Err(StmError::new(
            "Max history must be positive",
            ErrorKind::InvalidArgument,
        ));
    }
    if min_history > max_history {
        log::error!(
            "Min history {} exceeds max history {}",
            min_history,
            max_history
        );
        return Err(StmError::new(
            &format!(
                "Min history {} exceeds max history {}",
                min_history, max_history
            ),
            ErrorKind::InvalidArgument,
        ));
    }
    Ok(())
}

/// Fluent builder for [`StmConfig`].
///
/// The first invalid setting is captured and returned from [`build`](StmBuilder::build);
/// later settings are ignored once an error is held.
pub struct StmBuilder {
    config: StmConfig,
    error: Option<StmError>,
}

impl Default for StmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StmBuilder {
    pub fn new() -> Self {
        StmBuilder {
            config: StmConfig::new(),
            error: None,
        }
    }

    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_retry_limit(retry_limit) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn lock_wait(mut self, lock_wait: Duration) -> Self {
        self.config.set_lock_wait(lock_wait);
        self
    }

    pub fn barge_wait(mut self, barge_wait: Duration) -> Self {
        self.config.set_barge_wait(barge_wait);
        self
    }

    pub fn block_wait(mut self, block_wait: Duration) -> Self {
        self.config.set_block_wait(block_wait);
        self
    }

    pub fn history(mut self, min_history: usize, max_history: usize) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_history(min_history, max_history) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Returns the configuration, or the first error captured while building it.
    pub fn build(self) -> StmResult<StmConfig> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.config),
        }
    }
}
