//! A power-of-two single-producer single-consumer ring.
//!
//! Producer and consumer are unique, so the ring's head/tail indices never
//! race against each other under this crate's single-threaded-cooperative
//! execution model; the only coordination needed is the parked-peer wakers,
//! which is why this kernel is the simplest in the crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tracing::{debug, trace};

use crate::error::{Disconnected, SendError, TryRecvError, TrySendError};
use crate::metrics::{self, Handle};
use crate::util::SingleWaker;

struct Inner<T> {
    buf: Mutex<Box<[Option<T>]>>,
    mask: usize,
    head: AtomicUsize,
    tail: AtomicUsize,
    closed: std::sync::atomic::AtomicBool,
    recv_waker: SingleWaker,
    send_waker: SingleWaker,
    recorder: Handle,
}

/// The producing half. Created by [`ring`].
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
}

/// The consuming half. Created by [`ring`].
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
}

/// Creates an SPSC ring of the given power-of-two capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero or not a power of two -- this is a
/// programmer error caught at construction.
pub fn ring<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0 && capacity.is_power_of_two(), "spsc ring capacity must be a positive power of two");
    debug!(capacity, "spsc::ring constructed");
    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || None);
    let inner = Arc::new(Inner {
        buf: Mutex::new(slots.into_boxed_slice()),
        mask: capacity - 1,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        closed: std::sync::atomic::AtomicBool::new(false),
        recv_waker: SingleWaker::new(),
        send_waker: SingleWaker::new(),
        recorder: metrics::noop(),
    });
    (Sender { inner: inner.clone() }, Receiver { inner })
}

impl<T> Inner<T> {
    fn is_full(&self, head: usize, tail: usize) -> bool {
        (tail.wrapping_add(1)) & self.mask == head & self.mask
    }
}

impl<T> Sender<T> {
    pub fn try_send(&self, v: T) -> Result<(), TrySendError<T>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(TrySendError::Disconnected(v));
        }
        let head = self.inner.head.load(Ordering::Acquire);
        let tail = self.inner.tail.load(Ordering::Relaxed);
        if self.inner.is_full(head, tail) {
            return Err(TrySendError::Full(v));
        }
        let idx = tail & self.inner.mask;
        self.inner.buf.lock().unwrap()[idx] = Some(v);
        self.inner.tail.store(tail.wrapping_add(1), Ordering::Release);
        self.inner.recorder.record_try_send(true);
        self.inner.recv_waker.wake();
        Ok(())
    }

    pub fn send(&self, v: T) -> SendFuture<'_, T> {
        SendFuture { sender: self, value: Some(v) }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        debug!("spsc sender closed");
        self.inner.closed.store(true, Ordering::Release);
        self.inner.recv_waker.wake();
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Future returned by [`Sender::send`].
pub struct SendFuture<'a, T> {
    sender: &'a Sender<T>,
    value: Option<T>,
}

impl<'a, T> Future for SendFuture<'a, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let v = this.value.take().expect("SendFuture polled after completion");
        match this.sender.try_send(v) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(TrySendError::Disconnected(v)) => Poll::Ready(Err(SendError(v))),
            Err(TrySendError::Full(v)) => {
                trace!("spsc send suspending, ring full");
                this.value = Some(v);
                this.sender.inner.send_waker.register(cx.waker());
                Poll::Pending
            }
        }
    }
}

impl<T> Receiver<T> {
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let tail = self.inner.tail.load(Ordering::Acquire);
        let head = self.inner.head.load(Ordering::Relaxed);
        if head == tail {
            return if self.inner.closed.load(Ordering::Acquire) {
                Err(TryRecvError::Disconnected)
            } else {
                Err(TryRecvError::Empty)
            };
        }
        let idx = head & self.inner.mask;
        let v = self.inner.buf.lock().unwrap()[idx].take().expect("slot invariant violated");
        self.inner.head.store(head.wrapping_add(1), Ordering::Release);
        self.inner.recorder.record_recv(0);
        self.inner.send_waker.wake();
        Ok(v)
    }

    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture { receiver: self }
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.send_waker.wake();
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Future returned by [`Receiver::recv`].
pub struct RecvFuture<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<'a, T> Future for RecvFuture<'a, T> {
    type Output = Result<T, Disconnected>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.try_recv() {
            Ok(v) => Poll::Ready(Ok(v)),
            Err(TryRecvError::Disconnected) => Poll::Ready(Err(Disconnected)),
            Err(TryRecvError::Empty) => {
                trace!("spsc recv suspending, ring empty");
                self.receiver.inner.recv_waker.register(cx.waker());
                match self.receiver.try_recv() {
                    Ok(v) => Poll::Ready(Ok(v)),
                    Err(TryRecvError::Disconnected) => Poll::Ready(Err(Disconnected)),
                    Err(TryRecvError::Empty) => Poll::Pending,
                }
            }
        }
    }
}
