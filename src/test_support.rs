//! A minimal, thread-parking, single-threaded executor used only by this
//! crate's own tests. Grounded in `futures-executor`'s `local_pool` run loop
//! (park the thread, poll on wake) -- kept out of the public dependency
//! graph so the channels themselves stay executor-agnostic, the same way
//! `futures-channel` depends on no executor at all.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::thread::Thread;

static TRACING_INIT: Once = Once::new();

/// Installs a process-wide `tracing` subscriber the first time it's called;
/// later calls are no-ops. `block_on` calls this so every test that drives a
/// future through it gets the suspension/resumption/drop-policy events on
/// stderr, filterable via `RUST_LOG`.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

struct Parker {
    thread: Thread,
    unparked: AtomicBool,
}

impl std::task::Wake for Parker {
    fn wake(self: Arc<Self>) {
        self.unparked.store(true, Ordering::SeqCst);
        self.thread.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.unparked.store(true, Ordering::SeqCst);
        self.thread.unpark();
    }
}

/// Drives `fut` to completion on the current thread, parking between polls.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    init_tracing();
    let mut fut = Box::pin(fut);
    let parker = Arc::new(Parker { thread: std::thread::current(), unparked: AtomicBool::new(false) });
    let waker = Waker::from(parker.clone());
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(v) => return v,
            Poll::Pending => {
                while !parker.unparked.swap(false, Ordering::SeqCst) {
                    std::thread::park();
                }
            }
        }
    }
}

fn noop_raw_waker() -> RawWaker {
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    fn no_op(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
    RawWaker::new(std::ptr::null(), &VTABLE)
}

/// A waker that does nothing when woken. Useful for a single manual poll
/// where the test will drive subsequent progress itself.
pub fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

/// Polls `fut` exactly once with a no-op waker and returns the result,
/// panicking if it wasn't ready. Useful for asserting a branch resolves
/// on its very first poll, with nothing suspended.
pub fn poll_once_ready<F: Future>(mut fut: Pin<&mut F>) -> F::Output {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(v) => v,
        Poll::Pending => panic!("expected future to resolve synchronously"),
    }
}
