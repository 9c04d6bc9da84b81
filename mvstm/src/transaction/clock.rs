use std::sync::atomic::{AtomicU64, Ordering};

// Version 0 belongs to values bound at ref creation.
static LAST_POINT: AtomicU64 = AtomicU64::new(0);

/// Draws the next point from the global clock.
pub(crate) fn next_point() -> u64 {
    LAST_POINT.fetch_add(1, Ordering::AcqRel) + 1
}

/// The most recently drawn point.
pub fn current_point() -> u64 {
    LAST_POINT.load(Ordering::Acquire)
}
