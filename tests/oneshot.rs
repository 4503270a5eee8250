mod common;

use chansuite::oneshot;
use common::block_on;

/// Dropping the sender without sending resolves recv as Disconnected.
#[test]
fn dropped_sender_without_send_disconnects_receiver() {
    let (tx, rx) = oneshot::channel::<i32>();
    drop(tx);
    block_on(async {
        assert!(rx.recv().await.is_err());
    });
}

#[test]
fn send_unblocks_a_waiting_receiver_across_threads() {
    let (tx, rx) = oneshot::channel::<&'static str>();
    let handle = std::thread::spawn(move || {
        block_on(async {
            assert_eq!(rx.recv().await.unwrap(), "done");
        });
    });
    std::thread::sleep(std::time::Duration::from_millis(10));
    tx.send("done").unwrap();
    handle.join().unwrap();
}

#[test]
fn second_send_is_rejected_after_receiver_drop() {
    let (tx, rx) = oneshot::channel::<i32>();
    drop(rx);
    assert!(tx.send(1).is_err());
}

#[test]
fn latched_value_survives_repeated_reads() {
    let (tx, rx) = oneshot::latched_channel::<i32>();
    tx.send(99).unwrap();
    for _ in 0..3 {
        assert_eq!(rx.try_recv().unwrap(), 99);
    }
}
