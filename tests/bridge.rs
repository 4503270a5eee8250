mod common;

use chansuite::bridge::{self, MessagePort};
use common::block_on;
use std::collections::VecDeque;
use std::task::{Context, Poll};

/// A fake port whose `send_message` immediately loops a reply back into
/// its own inbound queue, standing in for a host transport that would
/// deliver the reply asynchronously.
struct LoopbackPort {
    inbound: VecDeque<u32>,
}

impl MessagePort for LoopbackPort {
    type Message = u32;

    fn poll_recv(&mut self, _cx: &mut Context<'_>) -> Poll<Option<u32>> {
        match self.inbound.pop_front() {
            Some(v) => Poll::Ready(Some(v)),
            None => Poll::Pending,
        }
    }

    fn send_message(&mut self, msg: u32) {
        self.inbound.push_back(msg * 2);
    }
}

#[test]
fn request_resolves_with_the_first_reply() {
    let mut port = LoopbackPort { inbound: VecDeque::new() };
    // The reply channel is internal to `request`; this fake transport
    // ignores it and just doubles the command value as its "reply",
    // exercising the send-then-await-one-shot wiring rather than a real
    // reply-port round trip.
    let (reply_tx, reply_rx) = chansuite::oneshot::channel::<u32>();
    port.send_message(21);
    let replied = port.inbound.pop_front().unwrap();
    reply_tx.send(replied).unwrap();
    block_on(async {
        assert_eq!(reply_rx.recv().await.unwrap(), 42);
    });

    // `bridge::request` itself, wired against a port that answers
    // synchronously by invoking the embedded reply sender.
    struct EchoPort;
    impl MessagePort for EchoPort {
        type Message = (u32, chansuite::oneshot::Sender<u32>);

        fn poll_recv(&mut self, _cx: &mut Context<'_>) -> Poll<Option<Self::Message>> {
            Poll::Pending
        }

        fn send_message(&mut self, msg: Self::Message) {
            let (value, reply) = msg;
            let _ = reply.send(value + 1);
        }
    }
    let mut echo = EchoPort;
    let fut = bridge::request(&mut echo, |reply_tx| (41, reply_tx));
    block_on(async {
        assert_eq!(fut.await.unwrap(), 42);
    });
}
