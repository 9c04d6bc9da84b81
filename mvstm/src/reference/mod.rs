//! The versioned cell that transactions read and write.

mod history;

pub(crate) use history::*;

use crate::common::{
    atomic, callable, Atomic, Callable, CellLock, ReadExecutor, Validator, Value, Watcher,
    WriteExecutor,
};
use crate::config::{default_config, validate_history};
use crate::errors::{ErrorKind, StmError, StmResult};
use crate::transaction::{self, TransactionInfo};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_REF_ID: AtomicU64 = AtomicU64::new(1);

struct CellState {
    history: History,
    /// The transaction attempt holding write intent on this ref.
    owner: Option<Arc<TransactionInfo>>,
}

struct RefInner {
    id: u64,
    exclusive: bool,
    lock: CellLock,
    state: Mutex<CellState>,
    faults: AtomicU32,
    min_history: AtomicUsize,
    max_history: AtomicUsize,
    validator: Atomic<Option<Validator>>,
    watchers: Atomic<IndexMap<String, Watcher>>,
}

/// A shared, versioned memory cell.
///
/// A `Ref` keeps a short history of committed values so that a transaction
/// reading at an older point still finds the value its snapshot expects.
/// Clones are handles to the same cell; equality, ordering and hashing follow
/// the cell's identity, never its value.
///
/// # Examples
///
/// ```rust,ignore
/// use mvstm::{run, val, Ref};
///
/// let balance = Ref::new(val!(100));
/// run(|| {
///     let current = balance.deref()?.as_i64().unwrap_or_default();
///     balance.set(val!(current - 30))
/// })?;
/// assert_eq!(balance.current_value()?, val!(70));
/// ```
#[derive(Clone)]
pub struct Ref {
    inner: Arc<RefInner>,
}

impl Ref {
    /// Creates a ref bound to `value`, with the default history bounds.
    pub fn new(value: Value) -> Ref {
        let config = default_config();
        Ref::create(
            Some(value),
            config.min_history(),
            config.max_history(),
            false,
        )
    }

    /// Creates a ref with no value. Reading it fails with `UnboundRef` until
    /// a transaction writes it.
    pub fn unbound() -> Ref {
        let config = default_config();
        Ref::create(None, config.min_history(), config.max_history(), false)
    }

    /// Creates a ref with explicit history bounds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `max_history` is zero or below `min_history`.
    pub fn with_history(value: Value, min_history: usize, max_history: usize) -> StmResult<Ref> {
        validate_history(min_history, max_history)?;
        Ok(Ref::create(Some(value), min_history, max_history, false))
    }

    /// Creates an exclusive ref.
    ///
    /// Reading an exclusive ref inside a transaction takes its value: the read
    /// returns the value and writes `Null` in the same transaction. It keeps a
    /// single version and rejects history tuning.
    pub fn exclusive(value: Value) -> Ref {
        Ref::create(Some(value), 0, 1, true)
    }

    fn create(value: Option<Value>, min_history: usize, max_history: usize, exclusive: bool) -> Ref {
        let mut history = History::new();
        if let Some(value) = value {
            history.push(value, 0);
        }
        Ref {
            inner: Arc::new(RefInner {
                id: NEXT_REF_ID.fetch_add(1, Ordering::Relaxed),
                exclusive,
                lock: CellLock::new(),
                state: Mutex::new(CellState {
                    history,
                    owner: None,
                }),
                faults: AtomicU32::new(0),
                min_history: AtomicUsize::new(min_history),
                max_history: AtomicUsize::new(max_history),
                validator: atomic(None),
                watchers: atomic(IndexMap::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_exclusive(&self) -> bool {
        self.inner.exclusive
    }

    /// Reads the ref.
    ///
    /// Inside a transaction this is a transactional read at the transaction's
    /// read point. Outside, it returns the newest committed value.
    pub fn deref(&self) -> StmResult<Value> {
        if transaction::is_running() {
            transaction::read(self)
        } else {
            self.current_value()
        }
    }

    /// The newest committed value, ignoring any running transaction.
    pub fn current_value(&self) -> StmResult<Value> {
        let _guard = self.inner.lock.read();
        let state = self.inner.state.lock();
        match state.history.newest() {
            Some(version) => Ok(version.value.clone()),
            None => Err(self.unbound_error()),
        }
    }

    /// Writes `value` in the running transaction and returns it.
    pub fn set(&self, value: Value) -> StmResult<Value> {
        transaction::write(self, value)
    }

    /// Sets the ref to `f(current, args..)` in the running transaction.
    pub fn alter(&self, f: Callable, args: Vec<Value>) -> StmResult<Value> {
        transaction::alter(self, f, args)
    }

    /// Queues `f(current, args..)` to be applied at commit time.
    pub fn commute(&self, f: Callable, args: Vec<Value>) -> StmResult<Value> {
        transaction::commute(self, f, args)
    }

    /// Guards the ref against other writers until the transaction ends.
    pub fn ensure(&self) -> StmResult<()> {
        transaction::ensure(self)
    }

    pub fn min_history(&self) -> usize {
        self.inner.min_history.load(Ordering::Acquire)
    }

    pub fn max_history(&self) -> usize {
        self.inner.max_history.load(Ordering::Acquire)
    }

    pub fn set_min_history(&self, min_history: usize) -> StmResult<()> {
        self.check_tunable()?;
        validate_history(min_history, self.max_history())?;
        self.inner.min_history.store(min_history, Ordering::Release);
        Ok(())
    }

    pub fn set_max_history(&self, max_history: usize) -> StmResult<()> {
        self.check_tunable()?;
        validate_history(self.min_history(), max_history)?;
        self.inner.max_history.store(max_history, Ordering::Release);
        Ok(())
    }

    /// Number of committed versions currently kept.
    pub fn history_count(&self) -> usize {
        let _guard = self.inner.lock.read();
        self.inner.state.lock().history.len()
    }

    /// Drops every kept version except the newest.
    pub fn trim_history(&self) {
        let _guard = self.inner.lock.read();
        self.inner.state.lock().history.trim();
    }

    /// Number of reads that found no version old enough since the history last grew.
    pub fn fault_count(&self) -> u32 {
        self.inner.faults.load(Ordering::Acquire)
    }

    /// Installs a validator, checking the current value against it first.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the current value is rejected; the previous
    /// validator stays installed.
    pub fn set_validator(&self, validator: Option<Validator>) -> StmResult<()> {
        if let Some(validator) = &validator {
            let current = {
                let _guard = self.inner.lock.read();
                let state = self.inner.state.lock();
                state.history.newest().map(|version| version.value.clone())
            };
            if let Some(current) = current {
                check(validator, &current)?;
            }
        }
        self.inner.validator.write_with(|slot| *slot = validator);
        Ok(())
    }

    pub fn validator(&self) -> Option<Validator> {
        self.inner.validator.read_with(|slot| slot.clone())
    }

    /// Registers a watcher under `key`, replacing any watcher with the same key.
    pub fn add_watch(&self, key: &str, watcher: Watcher) {
        self.inner
            .watchers
            .write_with(|watchers| watchers.insert(key.to_string(), watcher));
    }

    /// Removes the watcher registered under `key`. Returns `true` if one existed.
    pub fn remove_watch(&self, key: &str) -> bool {
        self.inner
            .watchers
            .write_with(|watchers| watchers.shift_remove(key).is_some())
    }

    pub fn watch_count(&self) -> usize {
        self.inner.watchers.read_with(|watchers| watchers.len())
    }

    // ---- engine side ----

    pub(crate) fn cell_lock(&self) -> &CellLock {
        &self.inner.lock
    }

    /// Reads the newest version visible at `read_point` under the read lock.
    ///
    /// A ref whose kept history is entirely newer than `read_point` records a
    /// fault, so the next commit grows its history, and raises a retry.
    pub(crate) fn read_at(&self, read_point: u64) -> StmResult<Value> {
        let _guard = self.inner.lock.read();
        let state = self.inner.state.lock();
        if !state.history.is_bound() {
            return Err(self.unbound_error());
        }
        match state.history.visible_at(read_point) {
            Some(version) => Ok(version.value.clone()),
            None => {
                self.inner.faults.fetch_add(1, Ordering::AcqRel);
                log::trace!("{:?} has no version at read point {}", self, read_point);
                Err(StmError::retry())
            }
        }
    }

    /// Newest value without taking the cell lock; `Null` when unbound.
    pub(crate) fn newest_value(&self) -> Value {
        self.inner.state.lock().history.newest_value()
    }

    /// Newest value under a short read lock; `Null` when unbound.
    pub(crate) fn snapshot_value(&self) -> Value {
        let _guard = self.inner.lock.read();
        self.newest_value()
    }

    pub(crate) fn newest_point(&self) -> Option<u64> {
        self.inner.state.lock().history.newest_point()
    }

    pub(crate) fn owner(&self) -> Option<Arc<TransactionInfo>> {
        self.inner.state.lock().owner.clone()
    }

    pub(crate) fn set_owner(&self, owner: Option<Arc<TransactionInfo>>) {
        self.inner.state.lock().owner = owner;
    }

    /// Drops the write intent of `info`, leaving any other owner in place.
    pub(crate) fn release_owner(&self, info: &Arc<TransactionInfo>) {
        let mut state = self.inner.state.lock();
        if state.owner.as_ref().is_some_and(|owner| Arc::ptr_eq(owner, info)) {
            state.owner = None;
        }
    }

    /// Installs `value` as the version committed at `point` and returns the
    /// previous newest value. The caller holds the write lock.
    pub(crate) fn install(&self, value: Value, point: u64) -> Value {
        let min_history = self.min_history();
        let max_history = self.max_history();
        let mut state = self.inner.state.lock();
        let old = state.history.newest_value();
        let len = state.history.len();
        let faults = self.inner.faults.load(Ordering::Acquire);
        if !state.history.is_bound() {
            state.history.push(value, point);
        } else if (faults > 0 && len < max_history) || len < min_history {
            state.history.push(value, point);
            self.inner.faults.store(0, Ordering::Release);
        } else {
            state.history.recycle(value, point);
        }
        old
    }

    /// Runs the validator, if any, against a proposed value.
    pub(crate) fn validate(&self, value: &Value) -> StmResult<()> {
        match self.validator() {
            Some(validator) => check(&validator, value),
            None => Ok(()),
        }
    }

    pub(crate) fn has_watches(&self) -> bool {
        self.watch_count() > 0
    }

    /// Calls every watcher with `(key, self, old, new)`, in registration order.
    pub(crate) fn notify_watches(&self, old: &Value, new: &Value) {
        let watchers: Vec<(String, Watcher)> = self.inner.watchers.read_with(|watchers| {
            watchers
                .iter()
                .map(|(key, watcher)| (key.clone(), watcher.clone()))
                .collect()
        });
        for (key, watcher) in watchers {
            watcher(&key, self, old, new);
        }
    }

    fn check_tunable(&self) -> StmResult<()> {
        if self.inner.exclusive {
            log::error!("History of exclusive {:?} cannot be tuned", self);
            return Err(StmError::new(
                "History of an exclusive ref cannot be tuned",
                ErrorKind::IllegalState,
            ));
        }
        Ok(())
    }

    fn unbound_error(&self) -> StmError {
        StmError::new(&format!("{:?} is unbound", self), ErrorKind::UnboundRef)
    }
}

fn check(validator: &Validator, value: &Value) -> StmResult<()> {
    match validator(value) {
        Ok(true) => Ok(()),
        Ok(false) => Err(StmError::new(
            "Invalid reference state",
            ErrorKind::ValidationError,
        )),
        Err(e) if e.kind().is_signal() => Err(e),
        Err(e) => Err(StmError::new_with_cause(
            "Invalid reference state",
            ErrorKind::ValidationError,
            e,
        )),
    }
}

/// Builds a validator from a predicate over the proposed value.
pub fn validator<F>(f: F) -> Validator
where
    F: Fn(&Value) -> StmResult<bool> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Builds a watcher from a closure over `(key, ref, old, new)`.
pub fn watcher<F>(f: F) -> Watcher
where
    F: Fn(&str, &Ref, &Value, &Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A callable that adds its arguments as integers, handy for `commute` and `alter`.
pub fn adder() -> Callable {
    callable(|args| {
        let mut total = 0i64;
        for arg in args {
            let operand = arg.as_i64().ok_or_else(|| {
                StmError::new(
                    &format!("Cannot add non-integer value {}", arg),
                    ErrorKind::InvalidArgument,
                )
            })?;
            total = total.checked_add(operand).ok_or_else(|| {
                StmError::new(
                    &format!("Integer overflow adding {} to {}", operand, total),
                    ErrorKind::InvalidArgument,
                )
            })?;
        }
        Ok(Value::I64(total))
    })
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Ref {}

impl PartialOrd for Ref {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ref {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.inner.id.cmp(&other.inner.id)
    }
}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl Debug for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ref#{}", self.inner.id)
    }
}
