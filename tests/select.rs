mod common;

use chansuite::mpsc;
use chansuite::select::{self, branch};
use common::block_on;
use std::time::Duration;

/// Among branches synchronously ready at call time, the first-declared
/// branch wins.
#[test]
fn first_declared_ready_branch_wins_ties() {
    let (tx_a, rx_a) = mpsc::channel::<i32>(4, Default::default());
    let (tx_b, rx_b) = mpsc::channel::<i32>(4, Default::default());
    tx_a.try_send(1).unwrap();
    tx_b.try_send(2).unwrap();
    let winner = block_on(select::select(vec![
        branch::recv(rx_a.recv(), |r| r.map(|v| ("a", v))),
        branch::recv(rx_b.recv(), |r| r.map(|v| ("b", v))),
    ]));
    assert_eq!(winner.unwrap(), ("a", 1));

    // Reversing declaration order reverses the winner, proving the tie
    // break is positional, not value-dependent.
    let (tx_c, rx_c) = mpsc::channel::<i32>(4, Default::default());
    let (tx_d, rx_d) = mpsc::channel::<i32>(4, Default::default());
    tx_c.try_send(10).unwrap();
    tx_d.try_send(20).unwrap();
    let winner2 = block_on(select::select(vec![
        branch::recv(rx_d.recv(), |r| r.map(|v| ("d", v))),
        branch::recv(rx_c.recv(), |r| r.map(|v| ("c", v))),
    ]));
    assert_eq!(winner2.unwrap(), ("d", 20));
}

/// Racing a recv against a timer on an empty channel returns the timeout
/// branch, and the recv is cleanly detached -- a subsequent recv on the
/// same channel still succeeds.
#[test]
fn recv_plus_timeout_times_out_and_leaves_channel_usable() {
    let (tx, rx) = mpsc::channel::<i32>(4, Default::default());
    let timed_out = block_on(select::recv_timeout(rx.recv(), Duration::from_millis(20)));
    assert!(timed_out.is_err());

    tx.try_send(7).unwrap();
    block_on(async {
        assert_eq!(rx.recv().await.unwrap(), 7);
    });
}

/// A cancelled recv never consumes a value that subsequently appears; a
/// later recv on the same channel receives it.
#[test]
fn losing_recv_branch_does_not_consume_a_later_value() {
    let (tx_a, rx_a) = mpsc::channel::<i32>(4, Default::default());
    let (tx_b, rx_b) = mpsc::channel::<i32>(4, Default::default());
    tx_a.try_send(1).unwrap();
    // rx_b's branch loses synchronously (nothing sent yet); dropping the
    // select future discards its registration without touching rx_b's
    // buffer.
    let winner = block_on(select::select(vec![
        branch::recv(rx_a.recv(), |r| r.map(|v| ("a", v))),
        branch::recv(rx_b.recv(), |r| r.map(|v| ("b", v))),
    ]));
    assert_eq!(winner.unwrap(), ("a", 1));

    tx_b.try_send(2).unwrap();
    block_on(async {
        assert_eq!(rx_b.recv().await.unwrap(), 2);
    });
}
