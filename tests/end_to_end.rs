//! End-to-end scenarios that combine multiple pieces of the crate.
//! Kernel-specific invariants are exercised in their own `tests/*.rs` files.

mod common;

use chansuite::mpsc;
use common::block_on;

/// Bounded cap=1024, one producer sends 0..999999 then closes; one
/// consumer drains. Expect 1,000,000 recvs in order, then Disconnected,
/// with zero drops under block policy.
#[test]
fn mpsc_pipeline_one_million_items_in_order_no_drops() {
    const N: i32 = 1_000_000;
    let (tx, rx) = mpsc::channel::<i32>(1024, Default::default());
    let producer = std::thread::spawn(move || {
        block_on(async {
            for i in 0..N {
                tx.send(i).await.unwrap();
            }
        });
    });
    block_on(async {
        for i in 0..N {
            assert_eq!(rx.recv().await.unwrap(), i);
        }
        assert!(rx.recv().await.is_err());
    });
    producer.join().unwrap();
}

/// Two rendezvous channels A->B and B->A; one side sends i on A, awaits
/// B, repeats; the other awaits A, sends the received value back on B.
/// Every transfer is a direct handoff: buffer occupancy never exceeds 0.
#[test]
fn ping_pong_over_rendezvous_channels() {
    const ROUNDS: i32 = 100;
    let (tx_a, rx_a) = mpsc::rendezvous::<i32>(Default::default());
    let (tx_b, rx_b) = mpsc::rendezvous::<i32>(Default::default());

    let responder = std::thread::spawn(move || {
        block_on(async {
            for _ in 0..ROUNDS {
                let v = rx_a.recv().await.unwrap();
                tx_b.send(v).await.unwrap();
            }
        });
    });

    block_on(async {
        for i in 0..ROUNDS {
            tx_a.send(i).await.unwrap();
            let echoed = rx_b.recv().await.unwrap();
            assert_eq!(echoed, i);
        }
    });
    responder.join().unwrap();
}
