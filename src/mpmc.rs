//! A multi-producer, multi-consumer channel.
//!
//! Identical buffer and drop-policy design to [`crate::mpsc`], but with a
//! pool of competing receivers: each enqueued value goes to exactly one
//! receiver (the first to park or the first to poll), and receivers may be
//! cloned like senders. Disconnection is two-directional: senders see
//! `Disconnected` once every receiver has gone, and receivers see it once
//! every sender has gone and the buffer has drained.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use futures_core::Stream;

use tracing::{debug, trace};

use crate::error::{CancelableRecvError, Disconnected, SendError, TryRecvError, TrySendError};
use crate::metrics::{self, DropKind, Handle};
use crate::mpsc::ChannelConfig;
use crate::queue::{PushOutcome, Ring, Unbounded};
use crate::util::{cancel_pair, CancelHandle, CancelToken, DropPolicy, ParkToken, WaitQueue};

enum Backing<T> {
    Bounded(Ring<T>),
    Unbounded(Unbounded<T>),
}

impl<T> Backing<T> {
    fn len(&self) -> usize {
        match self {
            Backing::Bounded(r) => r.len(),
            Backing::Unbounded(u) => u.len(),
        }
    }

    fn pop(&mut self) -> Option<T> {
        match self {
            Backing::Bounded(r) => r.pop(),
            Backing::Unbounded(u) => u.pop(),
        }
    }
}

struct State<T> {
    backing: Backing<T>,
    sender_count: usize,
    receiver_count: usize,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    parked_senders: WaitQueue,
    parked_receivers: WaitQueue,
    on_drop: Option<Arc<dyn Fn(T) + Send + Sync>>,
    recorder: Handle,
    rendezvous: bool,
}

pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

fn build<T>(backing: Backing<T>, rendezvous: bool, cfg: ChannelConfig<T>) -> (Sender<T>, Receiver<T>) {
    let recorder = metrics::active_or_noop(cfg.metrics_id.as_deref(), cfg.metrics_sample_rate);
    let shared = Arc::new(Shared {
        state: Mutex::new(State { backing, sender_count: 1, receiver_count: 1 }),
        parked_senders: WaitQueue::new(),
        parked_receivers: WaitQueue::new(),
        on_drop: cfg.on_drop,
        recorder,
        rendezvous,
    });
    (Sender { shared: shared.clone() }, Receiver { shared })
}

/// A bounded fixed MPMC channel applying `cfg.policy` on overflow.
///
/// # Panics
///
/// Panics if `capacity` is zero -- a capacity-0 ring never has room under
/// any policy and would block every sender forever; use [`rendezvous`] to
/// get a capacity-0 channel with real hand-off semantics.
pub fn channel<T>(capacity: usize, cfg: ChannelConfig<T>) -> (Sender<T>, Receiver<T>) {
    assert!(capacity > 0, "mpmc::channel capacity must be non-zero; use mpmc::rendezvous() for capacity 0");
    debug!(capacity, policy = ?cfg.policy, "mpmc::channel constructed");
    build(Backing::Bounded(Ring::new(capacity, cfg.policy)), false, cfg)
}

/// A zero-capacity rendezvous channel: `send` only completes once one of
/// the competing receivers is actively waiting to accept the value.
/// Identical handoff design to [`crate::mpsc::rendezvous`], generalized to
/// N competing receivers: a push is accepted only while at least one
/// receiver is parked in [`Shared::parked_receivers`].
pub fn rendezvous<T>(cfg: ChannelConfig<T>) -> (Sender<T>, Receiver<T>) {
    debug!("mpmc::rendezvous constructed");
    build(Backing::Bounded(Ring::new(0, DropPolicy::Block)), true, cfg)
}

/// An unbounded MPMC channel.
pub fn unbounded<T>(chunked: bool, cfg: ChannelConfig<T>) -> (Sender<T>, Receiver<T>) {
    debug!(chunked, "mpmc::unbounded constructed");
    build(Backing::Unbounded(Unbounded::new(chunked)), false, cfg)
}

impl<T> Shared<T> {
    fn receivers_gone(&self, state: &State<T>) -> bool {
        state.receiver_count == 0
    }

    fn senders_gone(&self, state: &State<T>) -> bool {
        state.sender_count == 0
    }

    /// True once at least one receiver is parked waiting for a value. With
    /// N competing receivers there is no single "the" waiting receiver the
    /// way MPSC has one; any parked receiver is an eligible target, so
    /// readiness is just "the park queue isn't empty".
    fn push_ready_for_rendezvous(&self, state: &State<T>) -> bool {
        self.rendezvous && state.backing.len() == 0 && !self.parked_receivers.is_empty()
    }

    /// Runs `on_drop` on a value the drop policy just discarded, catching a
    /// panic so the caller can finish its own bookkeeping (waking a
    /// receiver, releasing the lock) before the panic is allowed to
    /// continue unwinding into whoever is awaiting the enclosing future.
    fn invoke_on_drop(&self, v: T) -> Option<Box<dyn std::any::Any + Send + 'static>> {
        let cb = self.on_drop.as_ref()?;
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(v))).err()
    }

    fn do_try_send(&self, v: T) -> Result<(), TrySendError<T>> {
        let mut state = self.state.lock().unwrap();
        if self.receivers_gone(&state) {
            return Err(TrySendError::Disconnected(v));
        }

        if self.rendezvous {
            if self.push_ready_for_rendezvous(&state) {
                if let Backing::Bounded(ring) = &mut state.backing {
                    ring.force_push(v);
                }
                drop(state);
                self.recorder.record_try_send(true);
                if self.parked_receivers.wake_one() {
                    trace!("rendezvous hand-off, waking one parked receiver");
                    self.recorder.record_wake(1);
                }
                return Ok(());
            }
            trace!("rendezvous send found no waiting receiver, caller must suspend or retry");
            return Err(TrySendError::Full(v));
        }

        match &mut state.backing {
            Backing::Unbounded(u) => {
                u.push(v);
                drop(state);
                self.recorder.record_try_send(true);
                if self.parked_receivers.wake_one() {
                    self.recorder.record_wake(1);
                }
                Ok(())
            }
            Backing::Bounded(ring) => match ring.push(v) {
                PushOutcome::Stored => {
                    drop(state);
                    self.recorder.record_try_send(true);
                    if self.parked_receivers.wake_one() {
                        self.recorder.record_wake(1);
                    }
                    Ok(())
                }
                PushOutcome::StoredEvictedOldest(evicted) => {
                    drop(state);
                    debug!("dropping oldest buffered value to make room");
                    self.recorder.record_try_send(true);
                    self.recorder.record_drop(DropKind::Oldest);
                    let panic = self.invoke_on_drop(evicted);
                    if self.parked_receivers.wake_one() {
                        self.recorder.record_wake(1);
                    }
                    if let Some(payload) = panic {
                        std::panic::resume_unwind(payload);
                    }
                    Ok(())
                }
                PushOutcome::Rejected(rejected) => {
                    drop(state);
                    debug!("rejecting newest value, buffer at capacity");
                    self.recorder.record_try_send(true);
                    self.recorder.record_drop(DropKind::Newest);
                    let panic = self.invoke_on_drop(rejected);
                    if let Some(payload) = panic {
                        std::panic::resume_unwind(payload);
                    }
                    Ok(())
                }
                PushOutcome::WouldBlock(v) => {
                    trace!("send found no room, caller must suspend or retry");
                    self.recorder.record_try_send(false);
                    Err(TrySendError::Full(v))
                }
            },
        }
    }

    fn do_next(&self) -> Poll<Option<T>> {
        let mut state = self.state.lock().unwrap();
        match state.backing.pop() {
            Some(v) => {
                drop(state);
                if self.parked_senders.wake_one() {
                    self.recorder.record_wake(1);
                }
                Poll::Ready(Some(v))
            }
            None if self.senders_gone(&state) => Poll::Ready(None),
            None => Poll::Pending,
        }
    }
}

impl<T> Sender<T> {
    pub fn try_send(&self, v: T) -> Result<(), TrySendError<T>> {
        self.shared.do_try_send(v)
    }

    pub fn send(&self, v: T) -> SendFuture<'_, T> {
        SendFuture { sender: self, value: Some(v), token: None }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.receivers_gone(&self.shared.state.lock().unwrap())
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().unwrap().sender_count += 1;
        Sender { shared: self.shared.clone() }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.sender_count -= 1;
        let last = state.sender_count == 0;
        drop(state);
        if last {
            debug!("last mpmc sender dropped, channel closed");
            self.shared.recorder.record_close();
            self.shared.parked_receivers.wake_all();
        }
    }
}

pub struct SendFuture<'a, T> {
    sender: &'a Sender<T>,
    value: Option<T>,
    token: Option<ParkToken>,
}

impl<'a, T> Future for SendFuture<'a, T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let start = Instant::now();
        let v = this.value.take().expect("SendFuture polled after completion");
        match this.sender.shared.do_try_send(v) {
            Ok(()) => {
                this.sender.shared.recorder.record_send(start.elapsed().as_nanos() as u64);
                Poll::Ready(Ok(()))
            }
            Err(TrySendError::Disconnected(v)) => Poll::Ready(Err(SendError(v))),
            Err(TrySendError::Full(v)) => {
                this.value = Some(v);
                match &this.token {
                    Some(token) => token.update(cx.waker()),
                    None => this.token = Some(this.sender.shared.parked_senders.park(cx.waker())),
                }
                Poll::Pending
            }
        }
    }
}

impl<'a, T> Drop for SendFuture<'a, T> {
    fn drop(&mut self) {
        if let Some(token) = &self.token {
            if !token.is_parked() {
                if self.sender.shared.parked_senders.wake_one() {
                    self.sender.shared.recorder.record_wake(1);
                }
            }
            token.cancel();
        }
    }
}

impl<T> Receiver<T> {
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        match self.shared.do_next() {
            Poll::Ready(Some(v)) => {
                self.shared.recorder.record_try_recv(true);
                Ok(v)
            }
            Poll::Ready(None) => {
                self.shared.recorder.record_try_recv(false);
                Err(TryRecvError::Disconnected)
            }
            Poll::Pending => {
                self.shared.recorder.record_try_recv(false);
                Err(TryRecvError::Empty)
            }
        }
    }

    pub fn try_recv_many(&self, max: usize) -> Vec<T> {
        let mut out = Vec::new();
        while out.len() < max {
            match self.try_recv() {
                Ok(v) => out.push(v),
                Err(_) => break,
            }
        }
        out
    }

    pub fn recv(&self) -> RecvFuture<'_, T> {
        RecvFuture { receiver: self, token: None }
    }

    /// Like [`recv`](Receiver::recv), but returns alongside a
    /// [`CancelHandle`] whose `cancel` lets the caller give up on the
    /// operation. Cancellation never discards a value that already arrived:
    /// the future checks the buffer before it checks for cancellation on
    /// every poll, so a racing `cancel` can only pre-empt an empty buffer.
    pub fn recv_cancelable(&self) -> (RecvCancelableFuture<'_, T>, CancelHandle) {
        let (handle, cancel_token) = cancel_pair();
        (RecvCancelableFuture { receiver: self, park_token: None, cancel_token }, handle)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().backing.len()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().unwrap().receiver_count += 1;
        Receiver { shared: self.shared.clone() }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.receiver_count -= 1;
        let last = state.receiver_count == 0;
        drop(state);
        if last {
            debug!("last mpmc receiver dropped, channel closed");
            self.shared.recorder.record_close();
            self.shared.parked_senders.wake_all();
        }
    }
}

pub struct RecvFuture<'a, T> {
    receiver: &'a Receiver<T>,
    token: Option<ParkToken>,
}

impl<'a, T> Future for RecvFuture<'a, T> {
    type Output = Result<T, Disconnected>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let start = Instant::now();
        match this.receiver.shared.do_next() {
            Poll::Ready(Some(v)) => {
                this.receiver.shared.recorder.record_recv(start.elapsed().as_nanos() as u64);
                Poll::Ready(Ok(v))
            }
            Poll::Ready(None) => Poll::Ready(Err(Disconnected)),
            Poll::Pending => {
                match &this.token {
                    Some(token) => token.update(cx.waker()),
                    None => {
                        trace!("recv suspending, channel empty");
                        this.token = Some(this.receiver.shared.parked_receivers.park(cx.waker()));
                    }
                }
                // Re-check after registering, same race as mpsc::RecvFuture.
                match this.receiver.shared.do_next() {
                    Poll::Ready(Some(v)) => {
                        this.receiver.shared.recorder.record_recv(start.elapsed().as_nanos() as u64);
                        Poll::Ready(Ok(v))
                    }
                    Poll::Ready(None) => Poll::Ready(Err(Disconnected)),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

impl<'a, T> Drop for RecvFuture<'a, T> {
    fn drop(&mut self) {
        if let Some(token) = &self.token {
            if !token.is_parked() {
                if self.receiver.shared.parked_receivers.wake_one() {
                    self.receiver.shared.recorder.record_wake(1);
                }
            }
            token.cancel();
        }
    }
}

impl<T> Stream for Receiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut fut = RecvFuture { receiver: &self, token: None };
        Pin::new(&mut fut).poll(cx).map(|r| r.ok())
    }
}

/// Future returned by [`Receiver::recv_cancelable`].
pub struct RecvCancelableFuture<'a, T> {
    receiver: &'a Receiver<T>,
    park_token: Option<ParkToken>,
    cancel_token: CancelToken,
}

impl<'a, T> Future for RecvCancelableFuture<'a, T> {
    type Output = Result<T, CancelableRecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let start = Instant::now();
        match this.receiver.shared.do_next() {
            Poll::Ready(Some(v)) => {
                this.receiver.shared.recorder.record_recv(start.elapsed().as_nanos() as u64);
                return Poll::Ready(Ok(v));
            }
            Poll::Ready(None) => return Poll::Ready(Err(CancelableRecvError::Disconnected)),
            Poll::Pending => {}
        }
        if this.cancel_token.is_canceled() {
            return Poll::Ready(Err(CancelableRecvError::Canceled));
        }
        match &this.park_token {
            Some(token) => token.update(cx.waker()),
            None => this.park_token = Some(this.receiver.shared.parked_receivers.park(cx.waker())),
        }
        this.cancel_token.register(cx.waker());
        // Re-check after registering both wakers, same race as recv().
        match this.receiver.shared.do_next() {
            Poll::Ready(Some(v)) => {
                this.receiver.shared.recorder.record_recv(start.elapsed().as_nanos() as u64);
                Poll::Ready(Ok(v))
            }
            Poll::Ready(None) => Poll::Ready(Err(CancelableRecvError::Disconnected)),
            Poll::Pending => {
                if this.cancel_token.is_canceled() {
                    Poll::Ready(Err(CancelableRecvError::Canceled))
                } else {
                    Poll::Pending
                }
            }
        }
    }
}

impl<'a, T> Drop for RecvCancelableFuture<'a, T> {
    fn drop(&mut self) {
        if let Some(token) = &self.park_token {
            if !token.is_parked() {
                if self.receiver.shared.parked_receivers.wake_one() {
                    self.receiver.shared.recorder.record_wake(1);
                }
            }
            token.cancel();
        }
    }
}
