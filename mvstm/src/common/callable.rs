use crate::common::Value;
use crate::errors::StmResult;
use crate::reference::Ref;
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// An opaque function over values. It may fail with any [`StmError`](crate::errors::StmError),
/// including the retry signals.
pub type Callable = Arc<dyn Fn(&[Value]) -> StmResult<Value> + Send + Sync>;

/// Rejects a proposed ref value by returning `false` or an error.
pub type Validator = Arc<dyn Fn(&Value) -> StmResult<bool> + Send + Sync>;

/// Called after commit with `(key, ref, old, new)`.
pub type Watcher = Arc<dyn Fn(&str, &Ref, &Value, &Value) + Send + Sync>;

/// Argument list of a deferred call. Most calls carry a handful of arguments.
pub type Args = SmallVec<[Value; 4]>;

/// Wraps a closure as a [`Callable`].
pub fn callable<F>(f: F) -> Callable
where
    F: Fn(&[Value]) -> StmResult<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identifies a registered listener for later removal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    fn next() -> ListenerHandle {
        ListenerHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

struct DeferredCallInner {
    handle: ListenerHandle,
    callable: Callable,
    args: Args,
    one_shot: bool,
    spent: AtomicBool,
}

/// A callable bound to its arguments, queued for later invocation.
///
/// Used for commute queues, post-commit actions, blocking guards and event
/// listeners. Clones share one identity, so a one-shot call fires once across
/// every table that holds it.
#[derive(Clone)]
pub struct DeferredCall {
    inner: Arc<DeferredCallInner>,
}

impl DeferredCall {
    pub fn new(callable: Callable, args: impl IntoIterator<Item = Value>, one_shot: bool) -> Self {
        DeferredCall {
            inner: Arc::new(DeferredCallInner {
                handle: ListenerHandle::next(),
                callable,
                args: args.into_iter().collect(),
                one_shot,
                spent: AtomicBool::new(false),
            }),
        }
    }

    pub fn handle(&self) -> ListenerHandle {
        self.inner.handle
    }

    pub fn is_one_shot(&self) -> bool {
        self.inner.one_shot
    }

    pub fn is_spent(&self) -> bool {
        self.inner.spent.load(Ordering::Acquire)
    }

    pub fn args(&self) -> &[Value] {
        &self.inner.args
    }

    /// Claims the right to fire. Always succeeds for a repeating call; for a
    /// one-shot call only the first claim succeeds.
    pub fn claim(&self) -> bool {
        if !self.inner.one_shot {
            return true;
        }
        self.inner
            .spent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Calls the function with the bound arguments.
    pub fn invoke(&self) -> StmResult<Value> {
        (self.inner.callable)(&self.inner.args)
    }

    /// Calls the function with `first` prepended to the bound arguments.
    pub fn invoke_with(&self, first: Value) -> StmResult<Value> {
        let mut args: Args = SmallVec::with_capacity(self.inner.args.len() + 1);
        args.push(first);
        args.extend(self.inner.args.iter().cloned());
        (self.inner.callable)(&args)
    }
}

impl PartialEq for DeferredCall {
    fn eq(&self, other: &Self) -> bool {
        self.inner.handle == other.inner.handle
    }
}

impl Eq for DeferredCall {}

impl Debug for DeferredCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredCall")
            .field("handle", &self.inner.handle)
            .field("args", &self.inner.args)
            .field("one_shot", &self.inner.one_shot)
            .finish()
    }
}
