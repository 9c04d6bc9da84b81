//! Transactions and the operations that run inside them.
//!
//! Every thread has at most one running transaction. [`run`] starts one, or
//! simply calls the body when the thread is already inside a transaction, and
//! the free functions here route reads and writes to it.

mod clock;
mod info;
mod manager;

pub use clock::current_point;
pub use info::{TransactionInfo, TransactionStatus};
pub use manager::{alternative, Alternative, OrElseMode};

use crate::blocking::BlockOn;
use crate::common::{Callable, Channel, DeferredCall, ListenerHandle, Value};
use crate::config::{default_config, StmConfig};
use crate::errors::{ErrorKind, StmError, StmResult};
use crate::reference::Ref;
use manager::LockingTransaction;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static TRANSACTION: RefCell<Option<Rc<LockingTransaction>>> = const { RefCell::new(None) };
}

/// Installs a transaction on this thread and puts back the previous one on drop.
struct TransactionScope {
    previous: Option<Rc<LockingTransaction>>,
}

impl TransactionScope {
    fn enter(tx: Rc<LockingTransaction>) -> TransactionScope {
        let previous = TRANSACTION.with(|slot| slot.replace(Some(tx)));
        TransactionScope { previous }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        TRANSACTION.with(|slot| {
            slot.replace(previous);
        });
    }
}

/// The transaction with a live attempt on this thread, if any.
fn current() -> Option<Rc<LockingTransaction>> {
    TRANSACTION
        .with(|slot| slot.borrow().clone())
        .filter(|tx| tx.has_info())
}

fn current_or_err() -> StmResult<Rc<LockingTransaction>> {
    current().ok_or_else(|| StmError::new("No transaction running", ErrorKind::NoTransaction))
}

/// Returns `true` if this thread is inside a transaction.
pub fn is_running() -> bool {
    current().is_some()
}

/// Runs `body` in a transaction with the process default configuration.
///
/// See [`run_with`].
pub fn run<T, F>(body: F) -> StmResult<Option<T>>
where
    F: FnMut() -> StmResult<T>,
{
    run_with(&default_config(), body)
}

/// Runs `body` atomically, retrying it until it commits.
///
/// The body may run many times; only the attempt that commits is observable.
/// Inside a running transaction the body is simply called once, as part of the
/// enclosing transaction.
///
/// # Returns
///
/// * `Ok(Some(value))` - the body's value from the attempt that committed
/// * `Ok(None)` - the body called [`abort`]
/// * `Err(_)` - the body failed with a non-retry error, or every attempt of
///   the configured retry limit was discarded (`RetryLimitExceeded`)
pub fn run_with<T, F>(config: &StmConfig, mut body: F) -> StmResult<Option<T>>
where
    F: FnMut() -> StmResult<T>,
{
    if current().is_some() {
        return body().map(Some);
    }
    let tx = Rc::new(LockingTransaction::new(*config));
    let _scope = TransactionScope::enter(tx.clone());
    tx.run(body)
}

/// Transactional read of `r` at the transaction's read point.
///
/// Reading an exclusive ref also writes `Null` to it in this transaction.
pub fn read(r: &Ref) -> StmResult<Value> {
    let tx = current_or_err()?;
    let value = tx.do_get(r)?;
    if r.is_exclusive() {
        tx.do_set(r, Value::Null)?;
    }
    Ok(value)
}

/// Writes `value` to `r` in the running transaction.
pub fn write(r: &Ref, value: Value) -> StmResult<Value> {
    current_or_err()?.do_set(r, value)
}

/// Sets `r` to `f(current, args..)` in the running transaction.
pub fn alter(r: &Ref, f: Callable, args: Vec<Value>) -> StmResult<Value> {
    let tx = current_or_err()?;
    let current = tx.do_get(r)?;
    let mut call_args: SmallVec<[Value; 4]> = SmallVec::with_capacity(args.len() + 1);
    call_args.push(current);
    call_args.extend(args);
    let value = f(&call_args)?;
    tx.do_set(r, value)
}

/// Queues `f(current, args..)` on `r`, applied again at commit time over the
/// newest committed value. Returns the value as seen by this transaction.
pub fn commute(r: &Ref, f: Callable, args: Vec<Value>) -> StmResult<Value> {
    current_or_err()?.do_commute(r, DeferredCall::new(f, args, false))
}

/// Keeps other transactions from writing `r` until this one ends.
pub fn ensure(r: &Ref) -> StmResult<()> {
    current_or_err()?.do_ensure(r)
}

/// Abandons the attempt until a watched ref changes.
///
/// # Arguments
///
/// * `refs` - refs to watch; `None` watches every ref read so far
/// * `guard` - optional call that must also return a truthy value to resume
/// * `on` - whether any or all of the refs must change
///
/// # Errors
///
/// Always fails: with `BlockingRetry` normally, with `InvalidArgument` if
/// there is nothing to watch.
pub fn block_retry<T>(
    refs: Option<Vec<Ref>>,
    guard: Option<DeferredCall>,
    on: BlockOn,
) -> StmResult<T> {
    current_or_err()?.do_blocking(refs, guard, on)
}

/// Runs `alternatives` in order, moving on when one retries as `mode` allows.
pub fn or_else<'a, T>(mode: OrElseMode, alternatives: Vec<Alternative<'a, T>>) -> StmResult<T> {
    current_or_err()?.do_or_else(mode, alternatives)
}

/// Ends the transaction without committing; [`run`] returns `Ok(None)`.
pub fn abort<T>() -> StmResult<T> {
    current_or_err()?.abort()
}

/// Queues `f(args..)` to run on its own thread once the transaction commits.
pub fn enqueue(f: Callable, args: Vec<Value>) -> StmResult<()> {
    current_or_err()?.enqueue(DeferredCall::new(f, args, false));
    Ok(())
}

pub(crate) fn register_tx_listener(channel: Channel, call: DeferredCall) -> StmResult<ListenerHandle> {
    Ok(current_or_err()?.listen(channel, call))
}

pub(crate) fn fire_tx_listeners(channel: &Channel, context: Value) -> StmResult<()> {
    current_or_err()?.fire(channel, context)
}
