//! Shared primitives: the waker-queue machinery every kernel in this
//! crate is built from.

mod atomic_waker;
mod cancel;
mod wait_queue;

pub(crate) use atomic_waker::SingleWaker;
pub use cancel::CancelHandle;
pub(crate) use cancel::{pair as cancel_pair, CancelToken};
pub(crate) use wait_queue::{ParkToken, WaitQueue};

/// Drop policy applied by a bounded kernel when a `send` arrives at
/// capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DropPolicy {
    /// The sender suspends until a slot frees up.
    #[default]
    Block,
    /// Evict the oldest buffered value to make room for the new one.
    Oldest,
    /// Reject the incoming value; the buffer is left unchanged.
    Newest,
    /// Capacity is effectively 1: the single slot always holds the most
    /// recently sent value.
    LatestOnly,
}
