//! A lossy, fan-out slot ring: fixed capacity, never blocks the publisher,
//! lags a slow subscriber rather than stalling the sender.
//!
//! Grounded in the `tari` project's `broadcast_channel::async_channel`
//! (see `other_examples/a47b9757_tari-project...async_channel.rs`): a
//! shared publisher plus a collection of subscriber wakers that all get
//! kicked on every send, each subscriber tracking its own read cursor
//! independently.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use tracing::{debug, trace, warn};

use crate::error::{TryBroadcastRecvError, TrySendError};
use crate::metrics::{self, Handle};
use crate::util::SingleWaker;

struct State<T> {
    slots: Box<[Option<(u64, T)>]>,
    seq: u64,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    mask: u64,
    capacity: u64,
    sender_count: AtomicUsize,
    closed: AtomicBool,
    wakers: Mutex<Vec<Weak<SingleWaker>>>,
    recorder: Handle,
}

/// The publishing half. Cloning increments the sender count; the ring is
/// open as long as at least one sender exists.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

/// A subscriber with its own read cursor. Created by [`Sender::subscribe`].
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
    cursor: u64,
    waker: Arc<SingleWaker>,
    disconnected: bool,
}

/// Creates a broadcast ring of the given power-of-two capacity.
///
/// # Panics
///
/// Panics if `capacity` is zero or not a power of two.
pub fn channel<T>(capacity: usize) -> Sender<T> {
    assert!(capacity > 0 && capacity.is_power_of_two(), "broadcast capacity must be a positive power of two");
    debug!(capacity, "broadcast::channel constructed");
    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || None);
    let shared = Arc::new(Shared {
        state: Mutex::new(State { slots: slots.into_boxed_slice(), seq: 0 }),
        mask: (capacity - 1) as u64,
        capacity: capacity as u64,
        sender_count: AtomicUsize::new(1),
        closed: AtomicBool::new(false),
        wakers: Mutex::new(Vec::new()),
        recorder: metrics::noop(),
    });
    Sender { shared }
}

impl<T: Clone> Sender<T> {
    /// Writes the next slot and wakes every live subscriber. Never blocks
    /// and never fails except when the ring itself has been closed.
    pub fn send(&self, v: T) -> Result<(), TrySendError<T>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TrySendError::Disconnected(v));
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            let seq = state.seq;
            let idx = (seq & self.shared.mask) as usize;
            state.slots[idx] = Some((seq, v));
            state.seq = seq.wrapping_add(1);
        }
        self.shared.recorder.record_send(0);
        self.wake_all();
        Ok(())
    }

    fn wake_all(&self) {
        let mut wakers = self.shared.wakers.lock().unwrap();
        wakers.retain(|w| {
            if let Some(w) = w.upgrade() {
                w.wake();
                true
            } else {
                false
            }
        });
    }

    /// Subscribes starting from the current sequence: a new subscriber
    /// only observes sends made after it was created, never backlog.
    pub fn subscribe(&self) -> Receiver<T> {
        let already_closed = self.shared.closed.load(Ordering::Acquire);
        let cursor = self.shared.state.lock().unwrap().seq;
        let waker = Arc::new(SingleWaker::new());
        self.shared.wakers.lock().unwrap().push(Arc::downgrade(&waker));
        Receiver { shared: self.shared.clone(), cursor, waker, disconnected: already_closed }
    }

    pub fn receiver_count(&self) -> usize {
        self.shared.wakers.lock().unwrap().iter().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        debug!("broadcast channel closed");
        self.shared.closed.store(true, Ordering::Release);
        self.wake_all();
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.sender_count.fetch_add(1, Ordering::AcqRel);
        Sender { shared: self.shared.clone() }
    }
}

impl<T: Clone> Drop for Sender<T> {
    fn drop(&mut self) {
        if self.shared.sender_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.close();
        }
    }
}

impl<T: Clone> Receiver<T> {
    fn try_recv_inner(&mut self) -> Result<T, TryBroadcastRecvError> {
        loop {
            let state = self.shared.state.lock().unwrap();
            let seq = state.seq;
            if self.cursor == seq {
                drop(state);
                return if self.disconnected || self.shared.closed.load(Ordering::Acquire) {
                    Err(TryBroadcastRecvError::Disconnected)
                } else {
                    Err(TryBroadcastRecvError::Empty)
                };
            }
            let floor = seq.saturating_sub(self.shared.capacity);
            if self.cursor < floor {
                let skipped = floor - self.cursor;
                self.cursor = floor;
                warn!(skipped, "subscriber lagged, publisher overran unread slots");
                return Err(TryBroadcastRecvError::Lagged(skipped));
            }
            let idx = (self.cursor & self.shared.mask) as usize;
            match &state.slots[idx] {
                Some((stored_seq, v)) if *stored_seq == self.cursor => {
                    let v = v.clone();
                    self.cursor = self.cursor.wrapping_add(1);
                    drop(state);
                    self.shared.recorder.record_recv(0);
                    return Ok(v);
                }
                _ => {
                    // Publisher overran this slot between our seq read and
                    // slot read; loop to recompute against the new floor.
                    drop(state);
                    continue;
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Result<T, TryBroadcastRecvError> {
        self.try_recv_inner()
    }

    pub fn recv(&mut self) -> RecvFuture<'_, T> {
        RecvFuture { receiver: self }
    }

    pub fn close(&mut self) {
        self.disconnected = true;
        self.waker.wake();
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        // Dropping the Arc<SingleWaker> makes its Weak un-upgradable; the
        // publisher prunes it lazily on the next send.
    }
}

pub struct RecvFuture<'a, T> {
    receiver: &'a mut Receiver<T>,
}

impl<'a, T: Clone> Future for RecvFuture<'a, T> {
    type Output = Result<T, crate::error::BroadcastRecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.receiver.try_recv_inner() {
            Ok(v) => Poll::Ready(Ok(v)),
            Err(TryBroadcastRecvError::Lagged(n)) => Poll::Ready(Err(crate::error::BroadcastRecvError::Lagged(n))),
            Err(TryBroadcastRecvError::Disconnected) => Poll::Ready(Err(crate::error::BroadcastRecvError::Disconnected)),
            Err(TryBroadcastRecvError::Empty) => {
                trace!("broadcast recv suspending, no new value");
                this.receiver.waker.register(cx.waker());
                match this.receiver.try_recv_inner() {
                    Ok(v) => Poll::Ready(Ok(v)),
                    Err(TryBroadcastRecvError::Lagged(n)) => Poll::Ready(Err(crate::error::BroadcastRecvError::Lagged(n))),
                    Err(TryBroadcastRecvError::Disconnected) => Poll::Ready(Err(crate::error::BroadcastRecvError::Disconnected)),
                    Err(TryBroadcastRecvError::Empty) => Poll::Pending,
                }
            }
        }
    }
}
