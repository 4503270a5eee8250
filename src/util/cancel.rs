//! The handle/token pair behind `recv_cancelable`: a cancellation flag plus
//! its own waker slot, independent of whatever park queue the underlying
//! recv is also registered with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Waker;

use super::SingleWaker;

#[derive(Debug, Default)]
struct Inner {
    canceled: AtomicBool,
    waker: SingleWaker,
}

/// Returned alongside a cancelable receive future. Calling [`cancel`](CancelHandle::cancel)
/// tells the future to resolve `Err(CancelableRecvError::Canceled)` the next
/// time it is polled and finds nothing already available to return instead
/// -- a value that has already arrived is always delivered, never discarded
/// in favor of the cancellation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    /// Requests cancellation and wakes the future if it is currently
    /// suspended. A no-op if the future has already resolved.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::SeqCst);
        self.inner.waker.wake();
    }
}

/// The future-side counterpart to a [`CancelHandle`]: checked on every poll,
/// registered with for a direct wake independent of the channel's own park
/// queue.
#[derive(Debug, Clone)]
pub(crate) struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub(crate) fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    pub(crate) fn register(&self, waker: &Waker) {
        self.inner.waker.register(waker);
    }
}

/// Builds a fresh, un-cancelled handle/token pair.
pub(crate) fn pair() -> (CancelHandle, CancelToken) {
    let inner = Arc::new(Inner::default());
    (CancelHandle { inner: inner.clone() }, CancelToken { inner })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_sets_flag_and_wakes_registered_waker() {
        let (handle, token) = pair();
        assert!(!token.is_canceled());
        let waker = crate::test_support::noop_waker();
        token.register(&waker);
        handle.cancel();
        assert!(token.is_canceled());
    }
}
