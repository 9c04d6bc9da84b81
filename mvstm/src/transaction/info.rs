use crate::common::Latch;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of one transaction attempt.
///
/// `Running` and `Committing` are alive; the other states end the attempt.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Running = 0,
    Committing = 1,
    Retry = 2,
    Killed = 3,
    Committed = 4,
}

impl TransactionStatus {
    fn from_u8(value: u8) -> TransactionStatus {
        match value {
            0 => TransactionStatus::Running,
            1 => TransactionStatus::Committing,
            2 => TransactionStatus::Retry,
            3 => TransactionStatus::Killed,
            _ => TransactionStatus::Committed,
        }
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, TransactionStatus::Running | TransactionStatus::Committing)
    }
}

/// Shared state of one attempt, visible to other transactions through the
/// refs it owns. A barging transaction kills an attempt by swapping its
/// status to `Killed` and opening its latch.
pub struct TransactionInfo {
    status: AtomicU8,
    start_point: u64,
    latch: Latch,
}

impl TransactionInfo {
    pub fn new(status: TransactionStatus, start_point: u64) -> Self {
        TransactionInfo {
            status: AtomicU8::new(status as u8),
            start_point,
            latch: Latch::new(),
        }
    }

    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: TransactionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn start_point(&self) -> u64 {
        self.start_point
    }

    pub fn latch(&self) -> &Latch {
        &self.latch
    }

    pub fn running(&self) -> bool {
        self.status().is_alive()
    }

    pub fn compare_and_set(&self, expected: TransactionStatus, new: TransactionStatus) -> bool {
        self.status
            .compare_exchange(expected as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Ends the attempt with `status` and releases everyone waiting on it.
    pub fn stop(&self, status: TransactionStatus) {
        self.set_status(status);
        self.latch.count_down();
    }
}

impl Debug for TransactionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionInfo")
            .field("status", &self.status())
            .field("start_point", &self.start_point)
            .finish()
    }
}
