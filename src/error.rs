//! The result taxonomy shared by every channel kernel.
//!
//! Every operation in this crate returns a value, never an exception: a
//! disconnected peer, a full buffer, an empty buffer, a timeout or a
//! cancellation are all ordinary `Err` variants, not panics. The only things
//! that *do* panic are programmer errors caught at construction time (a
//! non-power-of-two ring capacity, a zero buffer requested where the type
//! requires rendezvous semantics to be requested explicitly, and so on) --
//! see the individual `*::channel` constructors.

use std::fmt;

/// Returned by a blocking `recv` once the buffer is empty and every sender
/// has gone away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("channel disconnected")]
pub struct Disconnected;

/// Returned by `try_recv`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    /// The buffer is empty but the channel is still open.
    #[error("channel empty")]
    Empty,
    /// The buffer is empty and every sender has gone away.
    #[error("channel disconnected")]
    Disconnected,
}

impl TryRecvError {
    pub fn is_empty(&self) -> bool {
        matches!(self, TryRecvError::Empty)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, TryRecvError::Disconnected)
    }
}

/// Returned by `recv_timeout` and by the canonical timeout branch of
/// [`select`](crate::select::select).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RecvTimeoutError {
    /// The deadline elapsed before a value or disconnect arrived.
    #[error("timed out waiting for a value")]
    Timeout,
    /// Every sender has gone away before the deadline.
    #[error("channel disconnected")]
    Disconnected,
}

/// Returned by a `recv` obtained through [`recv_cancelable`], when the
/// operation is cancelled before it resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CancelableRecvError {
    /// The caller cancelled the operation before a value arrived. The value
    /// that would have been received, if any, is still in the channel.
    #[error("recv was canceled")]
    Canceled,
    /// Every sender has gone away.
    #[error("channel disconnected")]
    Disconnected,
}

/// Returned by a blocking `send` once every receiver has gone away. Carries
/// the value back so the caller can recover it.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SendError").field(&"..").finish()
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "send failed because no receivers remain")
    }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Returned by `try_send`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The bounded buffer is at capacity and the drop policy is `block`.
    Full(T),
    /// Every receiver has gone away.
    Disconnected(T),
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            TrySendError::Full(_) => "Full",
            TrySendError::Disconnected(_) => "Disconnected",
        };
        f.debug_tuple("TrySendError").field(&kind).finish()
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => write!(f, "send failed because channel is full"),
            TrySendError::Disconnected(_) => write!(f, "send failed because no receivers remain"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

impl<T> TrySendError<T> {
    pub fn is_full(&self) -> bool {
        matches!(self, TrySendError::Full(_))
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, TrySendError::Disconnected(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(v) | TrySendError::Disconnected(v) => v,
        }
    }
}

/// Returned by a broadcast subscriber's blocking `recv`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastRecvError {
    /// The subscriber's cursor fell more than one ring-length behind the
    /// publisher. `skipped` is the number of values that were overwritten
    /// before the subscriber could read them. The cursor has been
    /// resynchronized to the oldest still-live slot.
    #[error("lagged behind by {0} messages")]
    Lagged(u64),
    /// The publisher has gone away and the ring has been fully drained.
    #[error("channel disconnected")]
    Disconnected,
}

/// Returned by a broadcast subscriber's `try_recv`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TryBroadcastRecvError {
    #[error("channel empty")]
    Empty,
    #[error("lagged behind by {0} messages")]
    Lagged(u64),
    #[error("channel disconnected")]
    Disconnected,
}

/// Construction-time misuse: non-power-of-two capacity where the kernel
/// requires it, or a zero subscriber capacity on a broadcast ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid channel configuration: {0}")]
pub struct ConfigError(pub &'static str);
