use crate::common::{Channel, DeferredCall, ListenerHandle, Value};
use crate::errors::StmResult;
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static CONTEXT: RefCell<Value> = const { RefCell::new(Value::Null) };
}

/// Listeners registered per channel, in registration order.
#[derive(Default)]
pub(crate) struct ListenerTable {
    listeners: HashMap<Channel, Vec<DeferredCall>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        ListenerTable {
            listeners: HashMap::new(),
        }
    }

    pub fn register(&mut self, channel: Channel, call: DeferredCall) -> ListenerHandle {
        let handle = call.handle();
        self.listeners.entry(channel).or_default().push(call);
        handle
    }

    pub fn remove(&mut self, channel: &Channel, handle: ListenerHandle) -> bool {
        match self.listeners.get_mut(channel) {
            Some(calls) => {
                let before = calls.len();
                calls.retain(|call| call.handle() != handle);
                let removed = calls.len() != before;
                if calls.is_empty() {
                    self.listeners.remove(channel);
                }
                removed
            }
            None => false,
        }
    }

    /// Drops the one-shot listeners that fired.
    pub fn remove_all(&mut self, channel: &Channel, handles: &[ListenerHandle]) {
        if handles.is_empty() {
            return;
        }
        if let Some(calls) = self.listeners.get_mut(channel) {
            calls.retain(|call| !handles.contains(&call.handle()));
            if calls.is_empty() {
                self.listeners.remove(channel);
            }
        }
    }

    pub fn snapshot(&self, channel: &Channel) -> Vec<DeferredCall> {
        self.listeners.get(channel).cloned().unwrap_or_default()
    }

    pub fn listener_count(&self, channel: &Channel) -> usize {
        self.listeners.get(channel).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// Restores the previous context when dropped, so nested notifications see
/// their own context and the outer one comes back afterwards.
struct ContextScope {
    previous: Value,
}

impl ContextScope {
    fn enter(context: Value) -> ContextScope {
        let previous = CONTEXT.with(|slot| slot.replace(context));
        ContextScope { previous }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CONTEXT.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// The context of the notification currently being delivered on this thread.
pub fn current_context() -> Value {
    CONTEXT.with(|slot| slot.borrow().clone())
}

/// Invokes `calls` in order with `context` installed.
///
/// Stops at the first failing listener. Returns the outcome together with the
/// handles of one-shot listeners that fired, which the caller removes from its
/// table once no listener is running.
pub(crate) fn fire_listeners(
    calls: &[DeferredCall],
    context: Value,
) -> (StmResult<()>, Vec<ListenerHandle>) {
    let mut spent = Vec::new();
    if calls.is_empty() {
        return (Ok(()), spent);
    }

    let _scope = ContextScope::enter(context);
    for call in calls {
        if !call.claim() {
            // fired already through another table or thread
            spent.push(call.handle());
            continue;
        }
        if call.is_one_shot() {
            spent.push(call.handle());
        }
        if let Err(e) = call.invoke() {
            return (Err(e), spent);
        }
    }
    (Ok(()), spent)
}
