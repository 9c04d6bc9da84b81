use crate::common::Value;
use std::collections::VecDeque;

/// One committed value and the point at which it became visible.
#[derive(Clone, Debug)]
pub(crate) struct Version {
    pub value: Value,
    pub point: u64,
}

/// The committed versions of a ref, newest first.
///
/// Backed by a ring buffer. Installing a value either grows the buffer or
/// recycles the oldest slot as the newest, so the buffer never shrinks on its
/// own.
#[derive(Debug, Default)]
pub(crate) struct History {
    versions: VecDeque<Version>,
}

impl History {
    pub fn new() -> Self {
        History {
            versions: VecDeque::new(),
        }
    }

    pub fn is_bound(&self) -> bool {
        !self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn newest(&self) -> Option<&Version> {
        self.versions.front()
    }

    pub fn newest_point(&self) -> Option<u64> {
        self.versions.front().map(|version| version.point)
    }

    /// The newest value, or `Null` when unbound.
    pub fn newest_value(&self) -> Value {
        self.versions
            .front()
            .map(|version| version.value.clone())
            .unwrap_or_default()
    }

    /// The newest version committed at or before `read_point`.
    pub fn visible_at(&self, read_point: u64) -> Option<&Version> {
        self.versions
            .iter()
            .find(|version| version.point <= read_point)
    }

    /// Adds a slot for the new newest version.
    pub fn push(&mut self, value: Value, point: u64) {
        self.versions.push_front(Version { value, point });
    }

    /// Overwrites the oldest slot and makes it the newest.
    pub fn recycle(&mut self, value: Value, point: u64) {
        match self.versions.pop_back() {
            Some(mut slot) => {
                slot.value = value;
                slot.point = point;
                self.versions.push_front(slot);
            }
            None => self.push(value, point),
        }
    }

    /// Drops every version but the newest.
    pub fn trim(&mut self) {
        self.versions.truncate(1);
    }
}
