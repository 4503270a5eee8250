//! A single-slot waker register, used wherever a kernel has exactly one
//! implicit waiter (the lone receiver of an MPSC channel, the lone sender of
//! a one-shot). Mirrors the role `futures_core::task::__internal::AtomicWaker`
//! plays in `futures-channel`'s `mpsc` kernel, implemented here with a plain
//! mutex since the crate's single-threaded-cooperative-per-context concurrency
//! model does not need a lock-free fast path.

use std::sync::Mutex;
use std::task::Waker;

#[derive(Debug, Default)]
pub struct SingleWaker {
    slot: Mutex<Option<Waker>>,
}

impl SingleWaker {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    /// Registers `waker` as the current waiter, replacing (and dropping) any
    /// previous registration.
    pub fn register(&self, waker: &Waker) {
        let mut slot = self.slot.lock().unwrap();
        match &*slot {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    /// Wakes and clears the registered waker, if any.
    pub fn wake(&self) {
        if let Some(waker) = self.slot.lock().unwrap().take() {
            waker.wake();
        }
    }
}
