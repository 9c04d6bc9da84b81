use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

struct LockState {
    readers: usize,
    writer: Option<ThreadId>,
}

/// The read/write lock guarding one ref.
///
/// Unlike a scoped `RwLock` guard, a `CellLock` is released explicitly, because a
/// transaction keeps ensure read locks and commit write locks across many calls
/// and releases them together when the attempt finishes.
///
/// - Many readers may hold the lock at once; readers exclude writers.
/// - At most one writer holds it, and only through a timed attempt.
/// - The thread holding the write lock may still take read locks, so listeners
///   running during commit can read the refs being committed.
pub(crate) struct CellLock {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl CellLock {
    pub fn new() -> Self {
        CellLock {
            state: Mutex::new(LockState {
                readers: 0,
                writer: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquires a read lock, waiting while another thread holds the write lock.
    pub fn lock_read(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while matches!(state.writer, Some(writer) if writer != me) {
            self.cond.wait(&mut state);
        }
        state.readers += 1;
    }

    pub fn unlock_read(&self) {
        let mut state = self.state.lock();
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.cond.notify_all();
        }
    }

    /// Acquires a read lock released when the returned guard drops.
    pub fn read(&self) -> CellReadGuard<'_> {
        self.lock_read();
        CellReadGuard { lock: self }
    }

    /// Tries to take the write lock within `timeout`.
    ///
    /// # Returns
    ///
    /// `true` if the lock is now held by the calling thread
    pub fn try_lock_write_for(&self, timeout: Duration) -> bool {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.readers > 0 || state.writer.is_some() {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                if state.readers == 0 && state.writer.is_none() {
                    break;
                }
                return false;
            }
        }
        state.writer = Some(me);
        true
    }

    pub fn unlock_write(&self) {
        let mut state = self.state.lock();
        state.writer = None;
        self.cond.notify_all();
    }

    pub fn reader_count(&self) -> usize {
        self.state.lock().readers
    }

    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer.is_some()
    }
}

impl Default for CellLock {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct CellReadGuard<'a> {
    lock: &'a CellLock,
}

impl Drop for CellReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}
