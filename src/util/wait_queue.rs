//! The parked-peer queue shared by every bounded kernel.
//!
//! Grounded directly in `futures-channel`'s `mpsc::SenderTask` /
//! `parked_queue`: each parked operation is represented by a small
//! ref-counted node holding an optional waker and an `is_parked` flag. A
//! cancellation simply flips the flag; it does not attempt eager removal
//! from the FIFO. `wake_one` pops nodes in arrival order and skips any that
//! turn out to already be un-parked (either because they were already woken,
//! or because they were cancelled) -- the woken/cancelled node's slot is
//! never reused, so forward progress always lands on a live waiter or an
//! empty queue. This gives O(1) cancellation at the cost of lazily-removed
//! garbage nodes, and it gives a cooperative wake handoff for free: if
//! `wake_one` pops a node that was cancelled after being queued but before
//! being woken, it just keeps popping.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::task::Waker;

#[derive(Debug)]
struct Node {
    waker: Mutex<Option<Waker>>,
    is_parked: std::sync::atomic::AtomicBool,
}

/// A handle to a parked operation's queue slot. Dropping or calling
/// [`cancel`](ParkToken::cancel) removes the operation from eligibility for
/// a future wake without disturbing the queue's FIFO order for everyone
/// else.
#[derive(Debug, Clone)]
pub struct ParkToken(Arc<Node>);

impl ParkToken {
    /// Re-registers the waker to use for the next wake, in case the future
    /// has moved to a different task since it last parked.
    pub fn update(&self, waker: &Waker) {
        let mut slot = self.0.waker.lock().unwrap();
        match &*slot {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    /// True if this operation is still parked (has not been woken or
    /// cancelled).
    pub fn is_parked(&self) -> bool {
        self.0.is_parked.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Removes this operation from eligibility for a wake. If a wake has
    /// already been delivered, this is a no-op -- the caller will observe
    /// `is_parked() == false` and knows it already proceeded.
    pub fn cancel(&self) {
        self.0.is_parked.store(false, std::sync::atomic::Ordering::SeqCst);
        *self.0.waker.lock().unwrap() = None;
    }
}

#[derive(Debug, Default)]
pub struct WaitQueue {
    nodes: Mutex<VecDeque<Arc<Node>>>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self { nodes: Mutex::new(VecDeque::new()) }
    }

    /// Parks the current operation, returning a token used to update the
    /// waker or cancel.
    pub fn park(&self, waker: &Waker) -> ParkToken {
        let node = Arc::new(Node {
            waker: Mutex::new(Some(waker.clone())),
            is_parked: std::sync::atomic::AtomicBool::new(true),
        });
        self.nodes.lock().unwrap().push_back(node.clone());
        ParkToken(node)
    }

    /// Wakes the FIFO-head live waiter, if any. Returns true if a live
    /// waiter was found and woken.
    pub fn wake_one(&self) -> bool {
        let mut nodes = self.nodes.lock().unwrap();
        while let Some(node) = nodes.pop_front() {
            if node.is_parked.swap(false, std::sync::atomic::Ordering::SeqCst) {
                if let Some(waker) = node.waker.lock().unwrap().take() {
                    drop(nodes);
                    waker.wake();
                    return true;
                }
            }
        }
        false
    }

    /// Wakes every still-parked waiter (used on close).
    pub fn wake_all(&self) {
        let mut nodes = self.nodes.lock().unwrap();
        let drained: Vec<_> = nodes.drain(..).collect();
        drop(nodes);
        for node in drained {
            if node.is_parked.swap(false, std::sync::atomic::Ordering::SeqCst) {
                if let Some(waker) = node.waker.lock().unwrap().take() {
                    waker.wake();
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().unwrap().iter().any(|n| n.is_parked.load(std::sync::atomic::Ordering::SeqCst)) == false
    }
}
