//! The closed set of branch kinds `select` can compose: recv, future,
//! stream, and timer.
//!
//! Every constructor returns a type-erased [`Branch`] so that branches of
//! different underlying types can sit in one `Vec` passed to
//! [`super::select`]; each wraps its source's own cancel-safe poll so that
//! dropping the branch (what `select` does to every loser) is exactly the
//! branch's documented cancel effect: a recv branch's registered waker goes
//! stale and is overwritten by the next unrelated poll of that receiver; a
//! future or stream branch's boxed future/stream is dropped outright,
//! discarding whatever it was doing; a timer branch's `Delay` is dropped,
//! which cancels it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use super::timer::{OnceTimer, PeriodicTimer};
use crate::error::Disconnected;

/// One composable arm of a [`select`](super::select) call. Opaque: built
/// only through the constructors below.
pub struct Branch<'a, R> {
    pub(crate) tag: Option<&'static str>,
    poll: Box<dyn FnMut(&mut Context<'_>) -> Poll<R> + 'a>,
}

impl<'a, R> Branch<'a, R> {
    pub fn tagged(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    pub(crate) fn poll_branch(&mut self, cx: &mut Context<'_>) -> Poll<R> {
        (self.poll)(cx)
    }
}

fn wrap_recv<'a, Fut, T, E, F, R>(mut fut: Fut, mut map: F) -> Branch<'a, R>
where
    Fut: Future<Output = Result<T, E>> + Unpin + 'a,
    F: FnMut(Result<T, E>) -> R + 'a,
    T: 'a,
    E: 'a,
    R: 'a,
{
    Branch { tag: None, poll: Box::new(move |cx| Pin::new(&mut fut).poll(cx).map(&mut map)) }
}

/// Receive from any channel whose `recv()` yields a `Future<Output =
/// Result<T, Disconnected>>` -- every kernel but broadcast, whose lossy
/// error shape differs (use [`recv_broadcast`]).
pub fn recv<'a, T: 'a, F, R>(
    fut: impl Future<Output = Result<T, Disconnected>> + Unpin + 'a,
    map: F,
) -> Branch<'a, R>
where
    F: FnMut(Result<T, Disconnected>) -> R + 'a,
    R: 'a,
{
    wrap_recv(fut, map)
}

/// Receive from a broadcast subscriber; `map` sees `Lagged`/`Disconnected`
/// as well as a value.
pub fn recv_broadcast<'a, T: 'a, F, R>(
    fut: impl Future<Output = Result<T, crate::error::BroadcastRecvError>> + Unpin + 'a,
    map: F,
) -> Branch<'a, R>
where
    F: FnMut(Result<T, crate::error::BroadcastRecvError>) -> R + 'a,
    R: 'a,
{
    wrap_recv(fut, map)
}

/// Wrap an arbitrary future. Ready-when the future completes; a losing
/// future branch is simply dropped, discarding its result.
pub fn future<'a, Fut, F, R>(fut: Fut, mut map: F) -> Branch<'a, R>
where
    Fut: Future + 'a,
    F: FnMut(Fut::Output) -> R + 'a,
    R: 'a,
{
    let mut fut = Box::pin(fut);
    Branch { tag: None, poll: Box::new(move |cx| fut.as_mut().poll(cx).map(&mut map)) }
}

/// Wrap a stream. Ready-when its first event arrives or it ends; a losing
/// stream branch detaches its listener on drop.
pub fn stream<'a, S, F, R>(s: S, mut map: F) -> Branch<'a, R>
where
    S: Stream + 'a,
    F: FnMut(Option<S::Item>) -> R + 'a,
    R: 'a,
{
    let mut s = Box::pin(s);
    Branch { tag: None, poll: Box::new(move |cx| s.as_mut().poll_next(cx).map(&mut map)) }
}

/// A one-shot deadline branch.
pub fn timer_once<'a, F, R>(mut timer: OnceTimer, mut map: F) -> Branch<'a, R>
where
    F: FnMut() -> R + 'a,
    R: 'a,
{
    Branch {
        tag: None,
        poll: Box::new(move |cx| Pin::new(timer.delay_mut()).poll(cx).map(|()| map())),
    }
}

/// A periodic tick branch, drift-compensated and re-armed in place on
/// every fire so the same `PeriodicTimer` can be reused across repeated
/// `select` calls.
pub fn timer_periodic<'a, F, R>(timer: &'a mut PeriodicTimer, mut map: F) -> Branch<'a, R>
where
    F: FnMut() -> R + 'a,
    R: 'a,
{
    Branch {
        tag: None,
        poll: Box::new(move |cx| match Pin::new(timer.delay_mut()).poll(cx) {
            Poll::Ready(()) => {
                timer.rearm();
                Poll::Ready(map())
            }
            Poll::Pending => Poll::Pending,
        }),
    }
}
