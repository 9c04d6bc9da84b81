//! Event listeners: global, thread-local and transaction-local.
//!
//! Global and thread-local listeners are managed with [`listen`], [`notify`] and
//! [`dismiss`], which refuse to run inside a transaction. Listeners registered
//! with [`listen_in_tx`] belong to the running transaction and are dropped when
//! its attempt ends; the transaction itself fires them on the `on-abort`,
//! `on-commit` and `after-commit` channels.

mod registry;

pub(crate) use registry::{fire_listeners, ListenerTable};
pub use registry::current_context;

use crate::common::{Callable, Channel, DeferredCall, ListenerHandle, Value};
use crate::errors::{ErrorKind, StmError, StmResult};
use crate::transaction;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;

static GLOBAL_LISTENERS: Lazy<Mutex<ListenerTable>> = Lazy::new(|| Mutex::new(ListenerTable::new()));

thread_local! {
    static LOCAL_LISTENERS: RefCell<ListenerTable> = RefCell::new(ListenerTable::new());
}

/// Tables a [`dismiss`] call removes a listener from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DismissScope {
    Local,
    Global,
    All,
}

fn reject_in_transaction(operation: &str) -> StmResult<()> {
    if transaction::is_running() {
        log::error!("{} is not allowed in a transaction", operation);
        return Err(StmError::new(
            &format!("{} is not allowed in a transaction", operation),
            ErrorKind::IllegalState,
        ));
    }
    Ok(())
}

/// Registers a listener on `channel`.
///
/// # Arguments
///
/// * `channel` - the channel to listen on
/// * `callable` - invoked with `args` whenever the channel is notified
/// * `args` - arguments bound to the call
/// * `thread_local` - register on this thread only instead of globally
/// * `one_shot` - remove the listener after it fires once
///
/// # Errors
///
/// Returns `IllegalState` inside a transaction; use [`listen_in_tx`] there.
pub fn listen(
    channel: impl Into<Channel>,
    callable: Callable,
    args: Vec<Value>,
    thread_local: bool,
    one_shot: bool,
) -> StmResult<ListenerHandle> {
    reject_in_transaction("Listen")?;
    let call = DeferredCall::new(callable, args, one_shot);
    let channel = channel.into();
    let handle = if thread_local {
        LOCAL_LISTENERS.with(|table| table.borrow_mut().register(channel, call))
    } else {
        GLOBAL_LISTENERS.lock().register(channel, call)
    };
    Ok(handle)
}

/// Fires the global, then the thread-local listeners of `channel`, with
/// `context` readable through [`current_context`].
///
/// The listener lists are copied before firing, so listeners may register or
/// dismiss listeners, and other threads may notify the same channel meanwhile.
///
/// # Errors
///
/// Returns `IllegalState` inside a transaction, or the first listener failure.
pub fn notify(channel: impl Into<Channel>, context: Value) -> StmResult<()> {
    reject_in_transaction("Notify")?;
    let channel = channel.into();

    let global = GLOBAL_LISTENERS.lock().snapshot(&channel);
    let (result, spent) = fire_listeners(&global, context.clone());
    GLOBAL_LISTENERS.lock().remove_all(&channel, &spent);
    result?;

    let local = LOCAL_LISTENERS.with(|table| table.borrow().snapshot(&channel));
    let (result, spent) = fire_listeners(&local, context);
    LOCAL_LISTENERS.with(|table| table.borrow_mut().remove_all(&channel, &spent));
    result
}

/// Removes a listener from the tables named by `scope`.
///
/// # Returns
///
/// `true` if the listener was found in any of them.
pub fn dismiss(
    channel: impl Into<Channel>,
    handle: ListenerHandle,
    scope: DismissScope,
) -> StmResult<bool> {
    reject_in_transaction("Dismiss")?;
    let channel = channel.into();
    let mut removed = false;
    if matches!(scope, DismissScope::Global | DismissScope::All) {
        removed |= GLOBAL_LISTENERS.lock().remove(&channel, handle);
    }
    if matches!(scope, DismissScope::Local | DismissScope::All) {
        removed |= LOCAL_LISTENERS.with(|table| table.borrow_mut().remove(&channel, handle));
    }
    Ok(removed)
}

/// Registers a listener on the running transaction.
///
/// # Errors
///
/// Returns `NoTransaction` outside a transaction.
pub fn listen_in_tx(
    channel: impl Into<Channel>,
    callable: Callable,
    args: Vec<Value>,
    one_shot: bool,
) -> StmResult<ListenerHandle> {
    let call = DeferredCall::new(callable, args, one_shot);
    transaction::register_tx_listener(channel.into(), call)
}

/// Fires the running transaction's listeners of `channel`.
pub fn notify_in_tx(channel: impl Into<Channel>, context: Value) -> StmResult<()> {
    transaction::fire_tx_listeners(&channel.into(), context)
}

/// Number of global and thread-local listeners on `channel` visible from this thread.
pub fn listener_count(channel: impl Into<Channel>) -> usize {
    let channel = channel.into();
    let global = GLOBAL_LISTENERS.lock().listener_count(&channel);
    let local = LOCAL_LISTENERS.with(|table| table.borrow().listener_count(&channel));
    global + local
}
