//! Thread-parking `block_on`, duplicated from `src/test_support.rs` since
//! integration tests compile as a separate crate and cannot reach a
//! `#[cfg(test)]`-private module of the library.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::Thread;

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

#[allow(dead_code)]
pub fn block_on<F: Future>(fut: F) -> F::Output {
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

#[allow(dead_code)]
pub fn spawn_thread<F>(f: F) -> std::thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::spawn(f)
}
