//! A library of typed, asynchronous, in-process message-passing channels:
//! SPSC/MPSC/MPMC kernels, a one-shot promise, a lossy broadcast ring, a
//! fairness-preserving `select` composer, and a cross-context bridge onto
//! host message ports.
//!
//! The channel kernels ([`spsc`], [`mpsc`], [`mpmc`], [`oneshot`],
//! [`broadcast`]) share the waker-park machinery in [`util`] and the error
//! taxonomy in [`error`]; none of them depend on a particular executor.
//! [`select`] composes futures these kernels (or arbitrary other futures
//! and streams) produce. [`bridge`] adapts a host OS message port onto an
//! [`mpsc::Receiver`]. [`metrics`] is an optional, always-present-but-noop-
//! by-default instrumentation capability each kernel invokes on its own
//! lifecycle events.

pub mod broadcast;
pub mod error;
pub mod metrics;
pub mod mpmc;
pub mod mpsc;
pub mod oneshot;
pub mod select;
pub mod spsc;

pub(crate) mod queue;
pub(crate) mod util;

#[cfg(feature = "bridge")]
pub mod bridge;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{
    BroadcastRecvError, CancelableRecvError, ConfigError, Disconnected, RecvTimeoutError,
    SendError, TryBroadcastRecvError, TryRecvError, TrySendError,
};
pub use util::{CancelHandle, DropPolicy};
