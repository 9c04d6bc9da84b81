use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A one-shot gate: closed until `count_down`, open forever after.
///
/// Every transaction attempt owns one; it opens when the attempt stops so that
/// transactions blocked on its locks can stop waiting.
pub struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Latch {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn count_down(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.cond.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Waits up to `timeout` for the gate to open. Returns `true` if it opened.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let mut open = self.open.lock();
        if !*open {
            self.cond.wait_while_for(&mut open, |open| !*open, timeout);
        }
        *open
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}
