//! # mvstm - Multi-Version Software Transactional Memory
//!
//! mvstm lets threads share mutable state through versioned cells ([`Ref`])
//! that are only changed inside atomic, automatically retried transactions.
//!
//! ## Key Features
//!
//! - **Snapshot reads**: a transaction sees every commit up to its read point and nothing after
//! - **Optimistic writes**: write intent is claimed per ref; locks are held only while committing
//! - **Barging**: an older transaction may kill a younger one holding a ref it needs
//! - **Commute**: deferred updates re-applied at commit time, so concurrent commuters never conflict
//! - **Ensure**: guard a ref against other writers without writing it
//! - **Blocking retry**: park a transaction until the refs it read change
//! - **Or-else**: fall back to alternative branches when one retries
//! - **Events**: global, thread-local and transaction-local listeners, including
//!   `on-abort`, `on-commit` and `after-commit` hooks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mvstm::{run, read, write, commute, val, Ref};
//! use mvstm::reference::adder;
//!
//! let from = Ref::new(val!(100));
//! let to = Ref::new(val!(0));
//!
//! run(|| {
//!     let balance = read(&from)?.as_i64().unwrap_or_default();
//!     write(&from, val!(balance - 25))?;
//!     commute(&to, adder(), vec![val!(25)])
//! })?;
//!
//! assert_eq!(to.current_value()?, val!(25));
//! ```
//!
//! ## Module Organization
//!
//! - [`blocking`] - Blocking retry predicates
//! - [`common`] - Values, callables, channels and shared utilities
//! - [`config`] - Retry-loop tunables and default history bounds
//! - [`errors`] - Error types and result definitions
//! - [`event`] - Event listeners and notification
//! - [`reference`] - The versioned [`Ref`] cell
//! - [`transaction`] - The transaction manager and transactional operations

use std::thread::available_parallelism;

pub mod blocking;
pub mod common;
pub mod config;
pub mod errors;
pub mod event;
pub mod reference;
pub mod transaction;

pub use blocking::BlockOn;
pub use common::{callable, Callable, Channel, DeferredCall, ListenerHandle, Value};
pub use config::{StmBuilder, StmConfig};
pub use errors::{ErrorKind, StmError, StmResult};
pub use reference::Ref;
pub use transaction::{
    abort, alter, alternative, block_retry, commute, current_point, enqueue, ensure, is_running,
    or_else, read, run, run_with, write, OrElseMode,
};

/// Returns the number of available CPU cores, or 1 if it cannot be detected.
pub fn get_cpu_count() -> usize {
    available_parallelism()
        .map(|p| p.get())
        .unwrap_or_else(|err| {
            log::warn!(
                "Failed to detect available parallelism: {}. Defaulting to single thread.",
                err
            );
            1
        })
}
