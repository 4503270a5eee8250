//! Cross-context bridge: adapts a host OS message port (process-local IPC,
//! a worker's `postMessage`-style channel, ...) into an ordinary
//! [`crate::mpsc`] receiver.
//!
//! The actual port implementation is a platform concern left to the
//! embedder; this module only defines the seam -- the [`MessagePort`]
//! trait -- and the adapter logic built on top of it.
//! The forwarding loop is modeled on `futures-util`'s `Stream::forward`
//! combinator: a plain `Future` the host executor drives, rather than
//! something this crate spawns itself, keeping channels executor-agnostic.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tracing::debug;

use crate::error::Disconnected;
use crate::mpsc::{self, ChannelConfig};
use crate::oneshot;

/// A host message port capable of producing inbound messages. Implemented
/// by the embedder for whatever transport (isolate channel, OS pipe, ...)
/// is in play.
pub trait MessagePort {
    type Message;

    /// Polls for the next inbound message; `None` means the port has
    /// closed and no further messages will arrive.
    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Self::Message>>;

    /// Sends an outbound message on this port.
    fn send_message(&mut self, msg: Self::Message);
}

/// Drives the forwarding loop from a [`MessagePort`] into the channel
/// returned alongside it by [`to_mpsc`]. The host must poll (or spawn)
/// this future; it completes once the port closes, at which point the
/// wrapped channel has also been closed.
pub struct PortBridge<P: MessagePort> {
    port: P,
    tx: mpsc::Sender<P::Message>,
}

impl<P: MessagePort + Unpin> Future for PortBridge<P> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.port).poll_recv(cx) {
                Poll::Ready(Some(msg)) => {
                    // Overflow obeys the wrapped channel's own drop policy;
                    // a full/closed send is not an error here.
                    let _ = this.tx.try_send(msg);
                }
                Poll::Ready(None) => {
                    debug!("message port closed, closing bridged channel");
                    this.tx.close();
                    return Poll::Ready(());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Wraps an inbound port as an MPSC receiver. Returns the driver future
/// (poll or spawn it to pump messages) alongside the receiver.
pub fn to_mpsc<P: MessagePort>(
    port: P,
    capacity: usize,
    cfg: ChannelConfig<P::Message>,
) -> (PortBridge<P>, mpsc::Receiver<P::Message>) {
    let (tx, rx) = mpsc::channel(capacity, cfg);
    (PortBridge { port, tx }, rx)
}

/// Sends a command built around a fresh one-shot reply channel and
/// resolves with the first (and only) reply.
///
/// `make_command` receives the reply [`oneshot::Sender`] and must embed it
/// in the outbound message however the transport represents that (e.g. a
/// reply-port handle field); this helper then sends it and awaits the
/// matching `oneshot::Receiver`.
pub fn request<P, T>(
    port: &mut P,
    make_command: impl FnOnce(oneshot::Sender<T>) -> P::Message,
) -> RequestFuture<T>
where
    P: MessagePort,
{
    let (reply_tx, reply_rx) = oneshot::channel();
    let command = make_command(reply_tx);
    port.send_message(command);
    RequestFuture { rx: reply_rx }
}

/// Resolves once the reply arrives or the request is abandoned
/// (the reply sender was dropped on the other side). Owns its one-shot
/// receiver, so it outlives the call to [`request`] that created it.
pub struct RequestFuture<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for RequestFuture<T> {
    type Output = Result<T, Disconnected>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut fut = this.rx.recv();
        Pin::new(&mut fut).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::block_on;
    use std::collections::VecDeque;

    struct FakePort {
        inbound: VecDeque<u32>,
        closed: bool,
        outbound: Vec<u32>,
    }

    impl MessagePort for FakePort {
        type Message = u32;

        fn poll_recv(&mut self, _cx: &mut Context<'_>) -> Poll<Option<u32>> {
            if let Some(v) = self.inbound.pop_front() {
                Poll::Ready(Some(v))
            } else if self.closed {
                Poll::Ready(None)
            } else {
                Poll::Pending
            }
        }

        fn send_message(&mut self, msg: u32) {
            self.outbound.push(msg);
        }
    }

    #[test]
    fn forwards_inbound_messages_then_closes_channel() {
        let port = FakePort { inbound: VecDeque::from([1, 2, 3]), closed: true, outbound: Vec::new() };
        let (driver, rx) = to_mpsc(port, 8, Default::default());
        block_on(driver);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 2);
        assert_eq!(rx.try_recv().unwrap(), 3);
        assert!(rx.try_recv().is_err());
    }
}
