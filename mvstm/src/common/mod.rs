//! Shared building blocks: values, callables, channels, locks and small utilities.

mod callable;
mod channel;
mod constants;
mod latch;
mod lock;
pub mod util;
mod value;

pub use callable::*;
pub use channel::*;
pub use constants::*;
pub use latch::*;
pub(crate) use lock::*;
pub use util::*;
pub use value::*;
