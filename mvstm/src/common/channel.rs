use crate::common::{AFTER_COMMIT_CHANNEL, ON_ABORT_CHANNEL, ON_COMMIT_CHANNEL};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

static CHANNELS: Lazy<DashMap<String, Arc<str>>> = Lazy::new(DashMap::new);

/// Fired with no context when a transaction attempt is discarded.
pub static ON_ABORT: Lazy<Channel> = Lazy::new(|| Channel::intern(ON_ABORT_CHANNEL));
/// Fired during commit with the set of written refs as context.
pub static ON_COMMIT: Lazy<Channel> = Lazy::new(|| Channel::intern(ON_COMMIT_CHANNEL));
/// Fired after a commit, once every lock is released.
pub static AFTER_COMMIT: Lazy<Channel> = Lazy::new(|| Channel::intern(AFTER_COMMIT_CHANNEL));

/// An interned event channel key.
///
/// Interning the same name twice yields handles sharing one allocation; equality
/// and hashing still go through the name, so a channel built with `From<&str>` is
/// interchangeable with an interned one.
#[derive(Clone)]
pub struct Channel {
    name: Arc<str>,
}

impl Channel {
    pub fn intern(name: &str) -> Channel {
        let name = CHANNELS
            .entry(name.to_string())
            .or_insert_with(|| Arc::from(name))
            .value()
            .clone();
        Channel { name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.name, &other.name) || self.name == other.name
    }
}

impl Eq for Channel {}

impl Hash for Channel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Channel::intern(name)
    }
}

impl From<&Channel> for Channel {
    fn from(channel: &Channel) -> Self {
        channel.clone()
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, ":{}", self.name)
    }
}

impl Debug for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Channel({})", self.name)
    }
}
