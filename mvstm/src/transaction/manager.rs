use crate::blocking::{self, BlockOn, BlockingPredicate};
use crate::common::{
    async_task, Channel, DeferredCall, ListenerHandle, Value, AFTER_COMMIT, ON_ABORT, ON_COMMIT,
};
use crate::config::StmConfig;
use crate::errors::{ErrorKind, StmError, StmResult};
use crate::event::{fire_listeners, ListenerTable};
use crate::reference::Ref;
use crate::transaction::clock::next_point;
use crate::transaction::info::{TransactionInfo, TransactionStatus};
use im::OrdSet;
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Which failures of an `or_else` alternative move on to the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrElseMode {
    /// Only a blocking retry falls through; an ordinary conflict restarts the
    /// whole attempt.
    BlockingRetryOnly,
    /// Both ordinary and blocking retries fall through.
    AnyRetry,
}

/// One branch of an `or_else`.
pub type Alternative<'a, T> = Box<dyn FnOnce() -> StmResult<T> + 'a>;

/// Boxes a closure as an [`Alternative`].
pub fn alternative<'a, T, F>(f: F) -> Alternative<'a, T>
where
    F: FnOnce() -> StmResult<T> + 'a,
{
    Box::new(f)
}

/// How one attempt of the retry loop ended.
enum AttemptOutcome<T> {
    Committed(T),
    Retry,
    RetryBlocking,
    Abort,
    Fatal(StmError),
}

impl<T> AttemptOutcome<T> {
    /// `Ok(None)` is an attempt that lost its status to a barging transaction.
    fn classify(result: StmResult<Option<T>>) -> AttemptOutcome<T> {
        match result {
            Ok(Some(value)) => AttemptOutcome::Committed(value),
            Ok(None) => AttemptOutcome::Retry,
            Err(e) => match e.kind() {
                ErrorKind::Retry => AttemptOutcome::Retry,
                ErrorKind::BlockingRetry => AttemptOutcome::RetryBlocking,
                ErrorKind::Abort => AttemptOutcome::Abort,
                _ => AttemptOutcome::Fatal(e),
            },
        }
    }
}

struct Notification {
    r: Ref,
    old: Value,
    new: Value,
}

/// Per-attempt bookkeeping. Borrowed only between user callbacks, never across one.
struct TxState {
    info: Option<Arc<TransactionInfo>>,
    read_point: u64,
    start_point: u64,
    start_time: Instant,
    /// Pending value of every ref written or commuted.
    vals: IndexMap<Ref, Value>,
    sets: IndexSet<Ref>,
    gets: IndexSet<Ref>,
    commutes: BTreeMap<Ref, Vec<DeferredCall>>,
    /// Refs whose read lock this attempt holds.
    ensures: IndexSet<Ref>,
    /// Refs whose write lock this attempt holds, in acquisition order.
    locked: Vec<Ref>,
    actions: Vec<DeferredCall>,
    notify: Vec<Notification>,
    listeners: ListenerTable,
    or_else_running: bool,
    blocking: Option<Arc<BlockingPredicate>>,
}

impl TxState {
    fn new() -> Self {
        TxState {
            info: None,
            read_point: 0,
            start_point: 0,
            start_time: Instant::now(),
            vals: IndexMap::new(),
            sets: IndexSet::new(),
            gets: IndexSet::new(),
            commutes: BTreeMap::new(),
            ensures: IndexSet::new(),
            locked: Vec::new(),
            actions: Vec::new(),
            notify: Vec::new(),
            listeners: ListenerTable::new(),
            or_else_running: false,
            blocking: None,
        }
    }

    fn running_info(&self) -> StmResult<Arc<TransactionInfo>> {
        match &self.info {
            Some(info) if info.running() => Ok(info.clone()),
            _ => Err(StmError::retry()),
        }
    }

    fn clear_writes(&mut self) {
        self.vals.clear();
        self.sets.clear();
        self.commutes.clear();
    }
}

/// Values, writes, commutes and ensures of an attempt, restored when an
/// `or_else` alternative fails.
struct Checkpoint {
    vals: IndexMap<Ref, Value>,
    sets: IndexSet<Ref>,
    commutes: BTreeMap<Ref, Vec<DeferredCall>>,
    ensures: IndexSet<Ref>,
}

/// Opens the lock of every ref an attempt still holds if the body panics.
struct UnwindGuard<'a> {
    tx: &'a LockingTransaction,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.tx.release_after_panic();
        }
    }
}

/// A multi-version transaction bound to one thread.
///
/// The same transaction object runs every attempt of one [`run`](crate::run)
/// call. Each attempt reads at a fresh read point, claims write intent on the
/// refs it sets, and takes their write locks only while committing.
pub(crate) struct LockingTransaction {
    id: Uuid,
    config: StmConfig,
    state: RefCell<TxState>,
}

impl LockingTransaction {
    pub fn new(config: StmConfig) -> Self {
        LockingTransaction {
            id: Uuid::new_v4(),
            config,
            state: RefCell::new(TxState::new()),
        }
    }

    /// `true` while an attempt is installed, even one that already stopped.
    pub fn has_info(&self) -> bool {
        self.state.borrow().info.is_some()
    }

    pub fn read_point(&self) -> u64 {
        self.state.borrow().read_point
    }

    // ---- retry loop ----

    /// Runs `body` until an attempt commits, aborts, fails or the retry limit is reached.
    ///
    /// # Returns
    ///
    /// `Ok(Some(value))` on commit, `Ok(None)` on abort.
    pub fn run<T, F>(&self, mut body: F) -> StmResult<Option<T>>
    where
        F: FnMut() -> StmResult<T>,
    {
        for attempt in 0..self.config.retry_limit() {
            self.await_blocking();
            let info = self.begin(attempt == 0);

            let guard = UnwindGuard { tx: self };
            let result = self.attempt(&mut body, &info);
            let outcome = match AttemptOutcome::classify(result) {
                AttemptOutcome::Retry => match self.run_abort_listeners() {
                    Ok(()) => AttemptOutcome::Retry,
                    Err(e) => AttemptOutcome::Fatal(e),
                },
                AttemptOutcome::RetryBlocking => match self.run_abort_listeners() {
                    Ok(()) => AttemptOutcome::RetryBlocking,
                    Err(e) => AttemptOutcome::Fatal(e),
                },
                AttemptOutcome::Fatal(e) => {
                    if let Err(abort_error) = self.run_abort_listeners() {
                        log::warn!(
                            "Transaction {} on-abort listener failed while failing: {}",
                            self.id,
                            abort_error
                        );
                    }
                    AttemptOutcome::Fatal(e)
                }
                other => other,
            };
            if !matches!(outcome, AttemptOutcome::RetryBlocking) {
                self.discard_blocking();
            }
            self.finish(matches!(outcome, AttemptOutcome::Committed(_)));
            drop(guard);

            match outcome {
                AttemptOutcome::Committed(value) => return Ok(Some(value)),
                AttemptOutcome::Abort => {
                    log::debug!("Transaction {} aborted", self.id);
                    return Ok(None);
                }
                AttemptOutcome::Fatal(e) => return Err(e),
                AttemptOutcome::Retry => {
                    log::debug!("Transaction {} retrying, attempt {}", self.id, attempt + 1);
                }
                AttemptOutcome::RetryBlocking => {
                    log::debug!("Transaction {} blocked, attempt {}", self.id, attempt + 1);
                }
            }
        }

        self.discard_blocking();
        log::error!(
            "Transaction {} failed after {} attempts",
            self.id,
            self.config.retry_limit()
        );
        Err(StmError::new(
            "Transaction failed after reaching retry limit",
            ErrorKind::RetryLimitExceeded,
        ))
    }

    fn attempt<T, F>(&self, body: &mut F, info: &Arc<TransactionInfo>) -> StmResult<Option<T>>
    where
        F: FnMut() -> StmResult<T>,
    {
        let value = body()?;
        if !info.compare_and_set(TransactionStatus::Running, TransactionStatus::Committing) {
            log::debug!("Transaction {} was barged before commit", self.id);
            return Ok(None);
        }
        self.commit(info)?;
        Ok(Some(value))
    }

    fn begin(&self, first: bool) -> Arc<TransactionInfo> {
        let mut state = self.state.borrow_mut();
        state.gets.clear();
        state.clear_writes();
        state.or_else_running = false;
        state.read_point = next_point();
        if first {
            state.start_point = state.read_point;
            state.start_time = Instant::now();
        }
        let info = Arc::new(TransactionInfo::new(
            TransactionStatus::Running,
            state.start_point,
        ));
        state.info = Some(info.clone());
        info
    }

    fn await_blocking(&self) {
        let predicate = self.state.borrow_mut().blocking.take();
        if let Some(predicate) = predicate {
            let woken = predicate.await_unblock(self.config.block_wait());
            log::debug!(
                "Transaction {} resumed from blocking retry (woken: {})",
                self.id,
                woken
            );
            blocking::unregister(predicate.id());
        }
    }

    fn discard_blocking(&self) {
        let predicate = self.state.borrow_mut().blocking.take();
        if let Some(predicate) = predicate {
            blocking::unregister(predicate.id());
        }
    }

    /// Stops the current attempt and opens its latch.
    fn stop(&self, status: TransactionStatus) {
        let info = {
            let mut state = self.state.borrow_mut();
            state.clear_writes();
            state.info.take()
        };
        if let Some(info) = info {
            info.stop(status);
        }
    }

    /// Releases every lock of the attempt, stops it and, after a commit, hands
    /// out notifications, actions, blocking wake-ups and after-commit events.
    fn finish(&self, committed: bool) {
        let (locked, ensures, notify, actions, after_commit) = {
            let mut state = self.state.borrow_mut();
            let after_commit = state.listeners.snapshot(&AFTER_COMMIT);
            state.listeners.clear();
            (
                std::mem::take(&mut state.locked),
                std::mem::take(&mut state.ensures),
                std::mem::take(&mut state.notify),
                std::mem::take(&mut state.actions),
                after_commit,
            )
        };

        for r in locked.iter().rev() {
            r.cell_lock().unlock_write();
        }
        for r in ensures.iter() {
            r.cell_lock().unlock_read();
        }
        self.stop(if committed {
            TransactionStatus::Committed
        } else {
            TransactionStatus::Retry
        });

        if !committed {
            return;
        }
        for notification in notify {
            notification
                .r
                .notify_watches(&notification.old, &notification.new);
        }
        for action in actions {
            let id = self.id;
            async_task(move || {
                if let Err(e) = action.invoke() {
                    log::error!("Post-commit action of transaction {} failed: {}", id, e);
                }
            });
        }
        blocking::wake_all();
        let (result, _) = fire_listeners(&after_commit, Value::Null);
        if let Err(e) = result {
            log::error!("After-commit listener of transaction {} failed: {}", self.id, e);
        }
    }

    fn release_after_panic(&self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            for r in state.locked.drain(..).rev() {
                r.cell_lock().unlock_write();
            }
            for r in state.ensures.drain(..) {
                r.cell_lock().unlock_read();
            }
            state.clear_writes();
            state.listeners.clear();
            if let Some(predicate) = state.blocking.take() {
                blocking::unregister(predicate.id());
            }
            if let Some(info) = state.info.take() {
                info.stop(TransactionStatus::Killed);
            }
        }
    }

    // ---- events ----

    /// Fires the attempt's own on-abort listeners.
    ///
    /// A running attempt is marked committing first so it can no longer be
    /// barged while listeners run. A listener raising a retry is an `EventError`.
    fn run_abort_listeners(&self) -> StmResult<()> {
        let info = match self.state.borrow().info.clone() {
            Some(info) => info,
            None => return Ok(()),
        };
        // a killed attempt stays killed
        info.compare_and_set(TransactionStatus::Running, TransactionStatus::Committing);
        self.fire(&ON_ABORT, Value::Null)
            .map_err(|e| escalate(e, "on-abort"))
    }

    pub fn listen(&self, channel: Channel, call: DeferredCall) -> ListenerHandle {
        self.state.borrow_mut().listeners.register(channel, call)
    }

    pub fn fire(&self, channel: &Channel, context: Value) -> StmResult<()> {
        let calls = self.state.borrow().listeners.snapshot(channel);
        let (result, spent) = fire_listeners(&calls, context);
        if !spent.is_empty() {
            self.state
                .borrow_mut()
                .listeners
                .remove_all(channel, &spent);
        }
        result
    }

    pub fn enqueue(&self, action: DeferredCall) {
        self.state.borrow_mut().actions.push(action);
    }

    // ---- locking ----

    fn try_write_lock(&self, r: &Ref) -> StmResult<()> {
        if !r.cell_lock().try_lock_write_for(self.config.lock_wait()) {
            log::trace!("Transaction {} timed out locking {:?}", self.id, r);
            return Err(StmError::retry());
        }
        self.state.borrow_mut().locked.push(r.clone());
        Ok(())
    }

    fn release_if_ensured(&self, r: &Ref) {
        let was_ensured = self.state.borrow_mut().ensures.shift_remove(r);
        if was_ensured {
            r.cell_lock().unlock_read();
        }
    }

    /// Claims write intent on `r` and returns its newest value.
    fn lock(&self, r: &Ref) -> StmResult<Value> {
        self.release_if_ensured(r);
        let (info, read_point) = {
            let state = self.state.borrow();
            (state.running_info()?, state.read_point)
        };

        if !r.cell_lock().try_lock_write_for(self.config.lock_wait()) {
            log::trace!("Transaction {} timed out locking {:?}", self.id, r);
            return Err(StmError::retry());
        }
        if r.newest_point().is_some_and(|point| point > read_point) {
            r.cell_lock().unlock_write();
            return Err(StmError::retry());
        }
        if let Some(owner) = r.owner() {
            if !Arc::ptr_eq(&owner, &info) && owner.running() && !self.barge(&owner) {
                r.cell_lock().unlock_write();
                return self.block_and_bail(&owner);
            }
        }
        r.set_owner(Some(info));
        let value = r.newest_value();
        r.cell_lock().unlock_write();
        Ok(value)
    }

    /// Kills a younger running owner. Only a transaction past the barge wait may barge.
    fn barge(&self, owner: &TransactionInfo) -> bool {
        let (start_point, start_time) = {
            let state = self.state.borrow();
            (state.start_point, state.start_time)
        };
        if start_time.elapsed() > self.config.barge_wait()
            && start_point < owner.start_point()
            && owner.compare_and_set(TransactionStatus::Running, TransactionStatus::Killed)
        {
            owner.latch().count_down();
            log::debug!(
                "Transaction {} barged a transaction started at point {}",
                self.id,
                owner.start_point()
            );
            return true;
        }
        false
    }

    /// Gives up the attempt and waits briefly for `owner` to finish. Always a retry.
    fn block_and_bail<T>(&self, owner: &TransactionInfo) -> StmResult<T> {
        if self.state.borrow().or_else_running {
            return Err(StmError::retry());
        }
        self.run_abort_listeners()?;

        let ensures = std::mem::take(&mut self.state.borrow_mut().ensures);
        for r in ensures.iter() {
            r.cell_lock().unlock_read();
        }
        self.stop(TransactionStatus::Retry);

        log::debug!("Transaction {} blocking on a conflicting writer", self.id);
        owner.latch().wait_for(self.config.lock_wait());
        Err(StmError::retry())
    }

    // ---- commit ----

    /// Write-locks `r` for commit and folds its commutes over the newest value.
    fn lock_and_fold(
        &self,
        r: &Ref,
        calls: &[DeferredCall],
        info: &Arc<TransactionInfo>,
        read_point: u64,
    ) -> StmResult<()> {
        let was_ensured = self.state.borrow().ensures.contains(r);
        self.release_if_ensured(r);
        self.try_write_lock(r)?;
        if was_ensured && r.newest_point().is_some_and(|point| point > read_point) {
            return Err(StmError::retry());
        }
        if let Some(owner) = r.owner() {
            if !Arc::ptr_eq(&owner, info) && owner.running() && !self.barge(&owner) {
                return Err(StmError::retry());
            }
        }
        let mut value = r.newest_value();
        for call in calls {
            value = call.invoke_with(value)?;
        }
        self.state.borrow_mut().vals.insert(r.clone(), value);
        Ok(())
    }

    /// Locks and validates every pending write that is not locked yet.
    fn lock_pending(&self, info: &Arc<TransactionInfo>) -> StmResult<()> {
        let read_point = self.read_point();
        let commutes: Vec<(Ref, Vec<DeferredCall>)> = {
            let state = self.state.borrow();
            state
                .commutes
                .iter()
                .filter(|(r, _)| !state.sets.contains(*r) && !state.locked.contains(*r))
                .map(|(r, calls)| (r.clone(), calls.clone()))
                .collect()
        };
        for (r, calls) in commutes {
            self.lock_and_fold(&r, &calls, info, read_point)?;
        }

        let sets: Vec<Ref> = {
            let state = self.state.borrow();
            state
                .sets
                .iter()
                .filter(|r| !state.locked.contains(*r))
                .cloned()
                .collect()
        };
        for r in sets {
            self.try_write_lock(&r)?;
        }
        Ok(())
    }

    fn validate_pending(&self) -> StmResult<()> {
        let vals: Vec<(Ref, Value)> = self
            .state
            .borrow()
            .vals
            .iter()
            .map(|(r, v)| (r.clone(), v.clone()))
            .collect();
        for (r, value) in vals.iter() {
            r.validate(value)?;
        }
        Ok(())
    }

    fn commit(&self, info: &Arc<TransactionInfo>) -> StmResult<()> {
        self.lock_pending(info)?;
        self.validate_pending()?;

        let touched: OrdSet<Ref> = self.state.borrow().vals.keys().cloned().collect();
        self.fire(&ON_COMMIT, Value::Refs(touched))
            .map_err(|e| escalate(e, "on-commit"))?;
        // on-commit listeners may have written further refs
        let late = {
            let state = self.state.borrow();
            state.vals.keys().any(|r| !state.locked.contains(r))
        };
        if late {
            self.lock_pending(info)?;
            self.validate_pending()?;
        }

        let commit_point = next_point();
        let vals = std::mem::take(&mut self.state.borrow_mut().vals);
        let mut notify = Vec::new();
        for (r, value) in vals {
            let old = r.install(value.clone(), commit_point);
            if r.has_watches() {
                notify.push(Notification { r, old, new: value });
            }
        }
        self.state.borrow_mut().notify = notify;
        info.set_status(TransactionStatus::Committed);
        log::trace!("Transaction {} committed at point {}", self.id, commit_point);
        Ok(())
    }

    // ---- operations ----

    pub fn do_get(&self, r: &Ref) -> StmResult<Value> {
        let read_point = {
            let mut state = self.state.borrow_mut();
            state.running_info()?;
            state.gets.insert(r.clone());
            if let Some(value) = state.vals.get(r) {
                return Ok(value.clone());
            }
            state.read_point
        };
        r.read_at(read_point)
    }

    pub fn do_set(&self, r: &Ref, value: Value) -> StmResult<Value> {
        let needs_lock = {
            let state = self.state.borrow();
            state.running_info()?;
            if state.commutes.contains_key(r) {
                log::error!("Transaction {} set {:?} after commuting it", self.id, r);
                return Err(StmError::new(
                    "Can't set after commute",
                    ErrorKind::IllegalState,
                ));
            }
            !state.sets.contains(r)
        };
        if needs_lock {
            self.lock(r)?;
            self.state.borrow_mut().sets.insert(r.clone());
        }
        self.state.borrow_mut().vals.insert(r.clone(), value.clone());
        Ok(value)
    }

    pub fn do_ensure(&self, r: &Ref) -> StmResult<()> {
        let (info, read_point) = {
            let state = self.state.borrow();
            let info = state.running_info()?;
            if state.ensures.contains(r) {
                return Ok(());
            }
            (info, state.read_point)
        };

        r.cell_lock().lock_read();
        if r.newest_point().is_some_and(|point| point > read_point) {
            r.cell_lock().unlock_read();
            return Err(StmError::retry());
        }
        match r.owner() {
            Some(owner) if owner.running() => {
                r.cell_lock().unlock_read();
                if !Arc::ptr_eq(&owner, &info) {
                    return self.block_and_bail(&owner);
                }
                Ok(())
            }
            _ => {
                self.state.borrow_mut().ensures.insert(r.clone());
                Ok(())
            }
        }
    }

    pub fn do_commute(&self, r: &Ref, call: DeferredCall) -> StmResult<Value> {
        let seeded = {
            let state = self.state.borrow();
            state.running_info()?;
            state.vals.contains_key(r)
        };
        if !seeded {
            let seed = r.snapshot_value();
            self.state.borrow_mut().vals.insert(r.clone(), seed);
        }
        let current = {
            let mut state = self.state.borrow_mut();
            state
                .commutes
                .entry(r.clone())
                .or_default()
                .push(call.clone());
            state.vals.get(r).cloned().unwrap_or_default()
        };
        let value = call.invoke_with(current)?;
        self.state.borrow_mut().vals.insert(r.clone(), value.clone());
        Ok(value)
    }

    /// Registers a blocking predicate over `refs`, or over every ref read so
    /// far, and raises a blocking retry.
    pub fn do_blocking<T>(
        &self,
        refs: Option<Vec<Ref>>,
        guard: Option<DeferredCall>,
        quantifier: BlockOn,
    ) -> StmResult<T> {
        let (refs, read_point) = {
            let state = self.state.borrow();
            state.running_info()?;
            let refs = refs.unwrap_or_else(|| state.gets.iter().cloned().collect());
            (refs, state.read_point)
        };
        if refs.is_empty() {
            log::error!("Transaction {} tried to block on no refs", self.id);
            return Err(StmError::new(
                "The set of refs to block on cannot be empty",
                ErrorKind::InvalidArgument,
            ));
        }

        let predicate = BlockingPredicate::new(refs, read_point, quantifier, guard);
        blocking::register(predicate.clone());
        let previous = self.state.borrow_mut().blocking.replace(predicate);
        if let Some(previous) = previous {
            blocking::unregister(previous.id());
        }
        Err(StmError::blocking_retry())
    }

    fn checkpoint(&self) -> Checkpoint {
        let state = self.state.borrow();
        Checkpoint {
            vals: state.vals.clone(),
            sets: state.sets.clone(),
            commutes: state.commutes.clone(),
            ensures: state.ensures.clone(),
        }
    }

    /// Rolls the attempt back to `checkpoint`. Ensures taken since are
    /// unlocked and write intent claimed since is given up.
    fn restore(&self, checkpoint: Checkpoint) {
        let (released, abandoned, info) = {
            let mut state = self.state.borrow_mut();
            let released: Vec<Ref> = state
                .ensures
                .iter()
                .filter(|r| !checkpoint.ensures.contains(*r))
                .cloned()
                .collect();
            for r in released.iter() {
                state.ensures.shift_remove(r);
            }
            let abandoned: Vec<Ref> = state
                .sets
                .iter()
                .filter(|r| !checkpoint.sets.contains(*r))
                .cloned()
                .collect();
            state.vals = checkpoint.vals;
            state.sets = checkpoint.sets;
            state.commutes = checkpoint.commutes;
            (released, abandoned, state.info.clone())
        };

        for r in released.iter() {
            r.cell_lock().unlock_read();
        }
        if let Some(info) = info {
            for r in abandoned.iter() {
                r.release_owner(&info);
            }
        }
    }

    /// Tries `alternatives` in order until one returns.
    ///
    /// The writes of a failed alternative are rolled back before the next one
    /// runs. Exhausting every alternative raises a blocking retry.
    pub fn do_or_else<'a, T>(
        &self,
        mode: OrElseMode,
        alternatives: Vec<Alternative<'a, T>>,
    ) -> StmResult<T> {
        let previous = {
            let mut state = self.state.borrow_mut();
            state.running_info()?;
            std::mem::replace(&mut state.or_else_running, true)
        };

        let mut result = Err(StmError::blocking_retry());
        for alternative in alternatives {
            let checkpoint = self.checkpoint();
            match alternative() {
                Err(e) if falls_through(mode, &e) => {
                    if !self.has_info() {
                        result = Err(e);
                        break;
                    }
                    self.restore(checkpoint);
                }
                other => {
                    result = other;
                    break;
                }
            }
        }

        self.state.borrow_mut().or_else_running = previous;
        result
    }

    /// Runs on-abort listeners and kills the attempt.
    pub fn abort<T>(&self) -> StmResult<T> {
        self.run_abort_listeners()?;
        self.stop(TransactionStatus::Killed);
        Err(StmError::abort())
    }
}

fn falls_through(mode: OrElseMode, error: &StmError) -> bool {
    match mode {
        OrElseMode::BlockingRetryOnly => error.kind() == &ErrorKind::BlockingRetry,
        OrElseMode::AnyRetry => error.is_retry(),
    }
}

/// A listener may not restart a transaction that is committing or aborting.
fn escalate(error: StmError, channel: &str) -> StmError {
    if error.is_retry() {
        log::error!("Transaction restarted during {} event", channel);
        StmError::new_with_cause(
            &format!("Transaction restarted during {} event", channel),
            ErrorKind::EventError,
            error,
        )
    } else {
        error
    }
}
