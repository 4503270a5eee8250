//! The fairness-preserving branch composer.
//!
//! `select` is a two-phase race collapsed onto plain `Future::poll`: the
//! first call, in which every branch is polled once in declaration order
//! with no branch yet suspended, is the synchronous pass -- whichever
//! branch is synchronously ready wins outright, giving declaration-order
//! tie-breaking. If none are ready, each branch has already registered its
//! own waker as a side effect of being polled
//! (recv/stream/timer branches all do this internally via the kernel they
//! wrap), which is the "asynchronous attach." A later wake re-enters
//! `poll`, which again walks branches in order and returns the first
//! ready one -- there is no separate resolve callback to wire up because
//! ordinary `Future::poll` already gives us "first ready wins," and
//! dropping `SelectFuture` (or simply not polling the losing branches
//! again) is the cancellation of the rest.

pub mod branch;
pub mod timer;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pub use branch::Branch;
pub use timer::{OnceTimer, PeriodicTimer};

use tracing::trace;

use crate::error::{Disconnected, RecvTimeoutError};
use std::time::Duration;

/// `recv_timeout(d)` is `select(recv(rx), timer.once(d))` with a canonical
/// timeout branch.
pub fn recv_timeout<'a, T: 'a>(
    fut: impl Future<Output = Result<T, Disconnected>> + Unpin + 'a,
    d: Duration,
) -> SelectFuture<'a, Result<T, RecvTimeoutError>> {
    select(vec![
        branch::recv(fut, |r| r.map_err(|_| RecvTimeoutError::Disconnected)),
        branch::timer_once(OnceTimer::new(d), || Err(RecvTimeoutError::Timeout)),
    ])
}

/// Composes branches into a single future that resolves with the first
/// one ready, in declaration order on ties.
pub struct SelectFuture<'a, R> {
    branches: Vec<Branch<'a, R>>,
}

/// Builds a [`SelectFuture`] over an ordered list of branches. Branches
/// not selected are dropped once this future resolves, which is each
/// branch's documented cancel effect.
pub fn select<'a, R>(branches: Vec<Branch<'a, R>>) -> SelectFuture<'a, R> {
    SelectFuture { branches }
}

impl<'a, R> Future for SelectFuture<'a, R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        for branch in this.branches.iter_mut() {
            if let Poll::Ready(v) = branch.poll_branch(cx) {
                return Poll::Ready(v);
            }
        }
        trace!(branches = this.branches.len(), "select suspending, no branch ready");
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecvTimeoutError;
    use crate::test_support::block_on;
    use std::time::Duration;

    #[test]
    fn earliest_declared_synchronously_ready_branch_wins() {
        let (tx_a, rx_a) = crate::mpsc::channel::<i32>(4, Default::default());
        let (tx_b, rx_b) = crate::mpsc::channel::<i32>(4, Default::default());
        tx_a.try_send(1).unwrap();
        tx_b.try_send(2).unwrap();
        let winner = block_on(select(vec![
            branch::recv(rx_a.recv(), |r| r.map(|v| ("a", v))),
            branch::recv(rx_b.recv(), |r| r.map(|v| ("b", v))),
        ]));
        assert_eq!(winner.unwrap(), ("a", 1));
    }

    #[test]
    fn recv_plus_timeout_times_out_on_empty_channel() {
        let (_tx, rx): (crate::mpsc::Sender<i32>, crate::mpsc::Receiver<i32>) =
            crate::mpsc::channel(4, Default::default());
        let timer = OnceTimer::new(Duration::from_millis(5));
        let result = block_on(select(vec![
            branch::recv(rx.recv(), |r| match r {
                Ok(v) => Ok(v),
                Err(_) => Err(RecvTimeoutError::Disconnected),
            }),
            branch::timer_once(timer, || Err(RecvTimeoutError::Timeout)),
        ]));
        assert_eq!(result, Err(RecvTimeoutError::Timeout));
    }
}
