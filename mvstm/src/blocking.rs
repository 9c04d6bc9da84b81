//! Predicates that park a transaction until the refs it depends on change.

use crate::common::{DeferredCall, Latch};
use crate::reference::Ref;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static PENDING: Lazy<DashMap<u64, Arc<BlockingPredicate>>> = Lazy::new(DashMap::new);
static NEXT_PREDICATE_ID: AtomicU64 = AtomicU64::new(1);

/// Which watched refs must change before a blocked transaction resumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockOn {
    /// Resume once any watched ref has a commit newer than the block point.
    Any,
    /// Resume once every watched ref has been committed at or after the block point.
    All,
}

/// A wait condition registered by a blocking retry.
///
/// The ref condition is checked first; the optional guard runs only once it
/// holds, and the transaction resumes when the guard returns a truthy value.
pub(crate) struct BlockingPredicate {
    id: u64,
    refs: Vec<Ref>,
    block_point: u64,
    quantifier: BlockOn,
    guard: Option<DeferredCall>,
    latch: Latch,
}

impl BlockingPredicate {
    pub fn new(
        refs: Vec<Ref>,
        block_point: u64,
        quantifier: BlockOn,
        guard: Option<DeferredCall>,
    ) -> Arc<BlockingPredicate> {
        Arc::new(BlockingPredicate {
            id: NEXT_PREDICATE_ID.fetch_add(1, Ordering::Relaxed),
            refs,
            block_point,
            quantifier,
            guard,
            latch: Latch::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn refs_changed(&self) -> bool {
        let point_of = |r: &Ref| r.newest_point().unwrap_or_default();
        match self.quantifier {
            BlockOn::Any => self.refs.iter().any(|r| point_of(r) > self.block_point),
            BlockOn::All => self.refs.iter().all(|r| point_of(r) >= self.block_point),
        }
    }

    pub fn should_unblock(&self) -> bool {
        if !self.refs_changed() {
            return false;
        }
        match &self.guard {
            None => true,
            Some(guard) => match guard.invoke() {
                Ok(value) => value.is_truthy(),
                Err(e) => {
                    log::warn!("Blocking guard failed, staying blocked: {}", e);
                    false
                }
            },
        }
    }

    /// Re-evaluates the predicate after a commit.
    pub fn handle_changed(&self) {
        if !self.latch.is_open() && self.should_unblock() {
            self.latch.count_down();
        }
    }

    /// Parks the calling thread until the predicate holds or `timeout` passes.
    pub fn await_unblock(&self, timeout: Duration) -> bool {
        if self.should_unblock() {
            return true;
        }
        self.latch.wait_for(timeout)
    }
}

impl Debug for BlockingPredicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingPredicate")
            .field("id", &self.id)
            .field("refs", &self.refs)
            .field("block_point", &self.block_point)
            .field("quantifier", &self.quantifier)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

pub(crate) fn register(predicate: Arc<BlockingPredicate>) {
    PENDING.insert(predicate.id(), predicate);
}

pub(crate) fn unregister(id: u64) {
    PENDING.remove(&id);
}

/// Offers the latest commit to every pending predicate.
pub(crate) fn wake_all() {
    // collected first so no map shard stays locked while guards run
    let pending: Vec<Arc<BlockingPredicate>> =
        PENDING.iter().map(|entry| entry.value().clone()).collect();
    for predicate in pending {
        predicate.handle_changed();
    }
}

/// Number of transactions currently parked on a blocking retry.
pub fn pending_count() -> usize {
    PENDING.len()
}
