//! A single-slot one-shot channel, plus a `latched` variant whose value
//! survives repeated reads.
//!
//! Modeled on `futures-channel::oneshot`: a fixed one sender, one receiver,
//! and a `poll_cancel`/`is_canceled` pair that lets the sender notice the
//! receiver gave up without having to attempt a send (used by the
//! cross-context RPC helper in [`crate::bridge`]).

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tracing::{debug, trace};

use crate::error::Disconnected;
use crate::util::SingleWaker;

struct Shared<T> {
    state: Mutex<Option<T>>,
    sent: std::sync::atomic::AtomicBool,
    sender_alive: std::sync::atomic::AtomicBool,
    receiver_alive: std::sync::atomic::AtomicBool,
    recv_waker: SingleWaker,
    cancel_waker: SingleWaker,
}

/// The sending half. `send` consumes it: a one-shot sender is fixed at one
/// use.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// The receiving half. Consumes the slot on a successful `recv`.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a one-shot channel whose value is consumed by the first
/// successful `recv`.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    trace!("oneshot::channel constructed");
    let shared = Arc::new(Shared {
        state: Mutex::new(None),
        sent: std::sync::atomic::AtomicBool::new(false),
        sender_alive: std::sync::atomic::AtomicBool::new(true),
        receiver_alive: std::sync::atomic::AtomicBool::new(true),
        recv_waker: SingleWaker::new(),
        cancel_waker: SingleWaker::new(),
    });
    (Sender { shared: shared.clone() }, Receiver { shared })
}

impl<T> Sender<T> {
    /// Writes the slot and wakes a waiting receiver. Fails, handing the
    /// value back, if the receiver has already gone.
    pub fn send(self, v: T) -> Result<(), T> {
        if !self.shared.receiver_alive.load(std::sync::atomic::Ordering::Acquire) {
            return Err(v);
        }
        *self.shared.state.lock().unwrap() = Some(v);
        self.shared.sent.store(true, std::sync::atomic::Ordering::Release);
        debug!("oneshot value sent");
        self.shared.recv_waker.wake();
        Ok(())
    }

    /// True if the receiver has already been dropped, meaning a `send`
    /// would fail.
    pub fn is_canceled(&self) -> bool {
        !self.shared.receiver_alive.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Resolves once the receiver is dropped without a value ever being
    /// consumed successfully -- lets a sender notice cancellation without
    /// attempting the send.
    pub fn poll_cancel(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_canceled() {
            Poll::Ready(())
        } else {
            trace!("oneshot sender suspending on poll_cancel");
            self.shared.cancel_waker.register(cx.waker());
            if self.is_canceled() { Poll::Ready(()) } else { Poll::Pending }
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.shared.sender_alive.store(false, std::sync::atomic::Ordering::Release);
        self.shared.recv_waker.wake();
    }
}

impl<T> Receiver<T> {
    pub fn try_recv(&self) -> Result<T, crate::error::TryRecvError> {
        let mut slot = self.shared.state.lock().unwrap();
        if let Some(v) = slot.take() {
            return Ok(v);
        }
        drop(slot);
        if !self.shared.sender_alive.load(std::sync::atomic::Ordering::Acquire) {
            Err(crate::error::TryRecvError::Disconnected)
        } else {
            Err(crate::error::TryRecvError::Empty)
        }
    }

    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture { receiver: self }
    }

    /// Closes the receiver immediately, notifying the sender's
    /// `poll_cancel` without waiting for drop.
    pub fn close(&mut self) {
        debug!("oneshot receiver closed");
        self.shared.receiver_alive.store(false, std::sync::atomic::Ordering::Release);
        self.shared.cancel_waker.wake();
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.shared.receiver_alive.store(false, std::sync::atomic::Ordering::Release);
        self.shared.cancel_waker.wake();
    }
}

pub struct RecvFuture<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<'a, T> Future for RecvFuture<'a, T> {
    type Output = Result<T, Disconnected>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.try_recv() {
            Ok(v) => Poll::Ready(Ok(v)),
            Err(crate::error::TryRecvError::Disconnected) => Poll::Ready(Err(Disconnected)),
            Err(crate::error::TryRecvError::Empty) => {
                trace!("oneshot recv suspending, value not yet sent");
                self.receiver.shared.recv_waker.register(cx.waker());
                match self.receiver.try_recv() {
                    Ok(v) => Poll::Ready(Ok(v)),
                    Err(crate::error::TryRecvError::Disconnected) => Poll::Ready(Err(Disconnected)),
                    Err(crate::error::TryRecvError::Empty) => Poll::Pending,
                }
            }
        }
    }
}

/// A latched one-shot: once sent, `recv` may be called any number of
/// times and each call clones the latched value instead of consuming it.
pub struct LatchedReceiver<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a one-shot channel whose value survives repeated reads.
pub fn latched_channel<T: Clone>() -> (Sender<T>, LatchedReceiver<T>) {
    let (tx, rx) = channel();
    (tx, LatchedReceiver { shared: rx.shared })
}

impl<T: Clone> LatchedReceiver<T> {
    pub fn try_recv(&self) -> Result<T, crate::error::TryRecvError> {
        let slot = self.shared.state.lock().unwrap();
        if let Some(v) = slot.as_ref() {
            return Ok(v.clone());
        }
        drop(slot);
        if !self.shared.sender_alive.load(std::sync::atomic::Ordering::Acquire) {
            Err(crate::error::TryRecvError::Disconnected)
        } else {
            Err(crate::error::TryRecvError::Empty)
        }
    }

    pub fn recv(&self) -> LatchedRecvFuture<'_, T> {
        LatchedRecvFuture { receiver: self }
    }
}

pub struct LatchedRecvFuture<'a, T: Clone> {
    receiver: &'a LatchedReceiver<T>,
}

impl<'a, T: Clone> Future for LatchedRecvFuture<'a, T> {
    type Output = Result<T, Disconnected>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.try_recv() {
            Ok(v) => Poll::Ready(Ok(v)),
            Err(crate::error::TryRecvError::Disconnected) => Poll::Ready(Err(Disconnected)),
            Err(crate::error::TryRecvError::Empty) => {
                trace!("oneshot recv suspending, value not yet sent");
                self.receiver.shared.recv_waker.register(cx.waker());
                match self.receiver.try_recv() {
                    Ok(v) => Poll::Ready(Ok(v)),
                    Err(crate::error::TryRecvError::Disconnected) => Poll::Ready(Err(Disconnected)),
                    Err(crate::error::TryRecvError::Empty) => Poll::Pending,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::block_on;

    #[test]
    fn send_then_recv() {
        let (tx, rx) = channel::<u32>();
        tx.send(42).unwrap();
        block_on(async { assert_eq!(rx.recv().await.unwrap(), 42) });
    }

    #[test]
    fn dropped_sender_disconnects() {
        let (tx, rx) = channel::<u32>();
        drop(tx);
        block_on(async { assert!(rx.recv().await.is_err()) });
    }

    #[test]
    fn dropped_receiver_cancels_sender() {
        let (tx, rx) = channel::<u32>();
        assert!(!tx.is_canceled());
        drop(rx);
        assert!(tx.is_canceled());
    }

    #[test]
    fn latched_receiver_reads_repeatedly() {
        let (tx, rx) = latched_channel::<u32>();
        tx.send(5).unwrap();
        assert_eq!(rx.try_recv().unwrap(), 5);
        assert_eq!(rx.try_recv().unwrap(), 5);
    }
}
