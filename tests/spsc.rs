mod common;

use chansuite::error::{TryRecvError, TrySendError};
use chansuite::spsc;
use common::block_on;

/// Occupancy stays within [0, K] and `try_send` fails exactly at
/// capacity.
#[test]
fn capacity_is_never_exceeded() {
    let (tx, _rx) = spsc::ring::<i32>(4);
    for i in 0..3 {
        tx.try_send(i).unwrap();
    }
    assert!(matches!(tx.try_send(99), Err(TrySendError::Full(99))));
}

/// FIFO order holds for a single producer under block policy.
#[test]
fn fifo_order_with_close_then_drain() {
    let (tx, rx) = spsc::ring::<i32>(8);
    for i in 0..7 {
        tx.try_send(i).unwrap();
    }
    tx.close();
    for i in 0..7 {
        assert_eq!(rx.try_recv().unwrap(), i);
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
}

#[test]
fn suspended_send_completes_once_receiver_drains() {
    // Ring usable capacity is `capacity - 1` (one sentinel slot): a
    // two-slot ring holds one value before `send` suspends.
    let (tx, rx) = spsc::ring::<i32>(2);
    tx.try_send(1).unwrap();
    let handle = std::thread::spawn(move || {
        block_on(async {
            tx.send(2).await.unwrap();
        });
    });
    assert_eq!(rx.try_recv().unwrap(), 1);
    block_on(async {
        assert_eq!(rx.recv().await.unwrap(), 2);
    });
    handle.join().unwrap();
}
