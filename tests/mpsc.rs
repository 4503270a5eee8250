mod common;

use chansuite::error::TryRecvError;
use chansuite::mpsc::{self, ChannelConfig};
use chansuite::DropPolicy;
use common::block_on;

/// With capacity K and M > K sends under the oldest-drop policy, the
/// remaining K items are the last K sent, and the drop counter accounts
/// for M - K.
#[test]
fn sliding_oldest_keeps_last_k_and_counts_drops() {
    let cfg = ChannelConfig { policy: DropPolicy::Oldest, ..Default::default() };
    let (tx, rx) = mpsc::channel::<i32>(4, cfg);
    for i in 1..=10 {
        tx.try_send(i).unwrap();
    }
    let mut drained = Vec::new();
    while let Ok(v) = rx.try_recv() {
        drained.push(v);
    }
    assert_eq!(drained, vec![7, 8, 9, 10]);
}

/// Under the newest-drop policy, the remaining K items are the first K
/// sent.
#[test]
fn sliding_newest_keeps_first_k() {
    let cfg = ChannelConfig { policy: DropPolicy::Newest, ..Default::default() };
    let (tx, rx) = mpsc::channel::<i32>(4, cfg);
    for i in 1..=10 {
        let _ = tx.try_send(i);
    }
    let mut drained = Vec::new();
    while let Ok(v) = rx.try_recv() {
        drained.push(v);
    }
    assert_eq!(drained, vec![1, 2, 3, 4]);
}

/// A burst of sends followed by one recv on a latest-only channel yields
/// exactly the most recently sent value.
#[test]
fn latest_only_keeps_most_recent() {
    let (tx, rx) = mpsc::latest::<i32>(Default::default());
    for i in 1..=5 {
        let _ = tx.try_send(i);
    }
    assert_eq!(rx.try_recv().unwrap(), 5);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

/// A rendezvous send never returns before a matched recv accepts it.
#[test]
fn rendezvous_send_waits_for_a_waiting_receiver() {
    let (tx, rx) = mpsc::rendezvous::<i32>(Default::default());
    let handle = std::thread::spawn(move || {
        block_on(async {
            tx.send(42).await.unwrap();
        });
    });
    block_on(async {
        assert_eq!(rx.recv().await.unwrap(), 42);
    });
    handle.join().unwrap();
}

/// All pre-close successful sends drain before the receiver observes
/// disconnected.
#[test]
fn close_ordering_drains_before_disconnect() {
    let (tx, rx) = mpsc::channel::<i32>(8, Default::default());
    tx.try_send(1).unwrap();
    tx.try_send(2).unwrap();
    drop(tx);
    assert_eq!(rx.try_recv().unwrap(), 1);
    assert_eq!(rx.try_recv().unwrap(), 2);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
}

/// A bounded pipeline drains everything sent before close, in order,
/// with zero drops under block policy.
#[test]
fn bounded_pipeline_drains_in_order_with_no_drops() {
    const N: i32 = 10_000;
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

/// `on_drop` is invoked for every value a sliding policy discards.
#[test]
fn on_drop_observer_fires_for_each_sliding_eviction() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_clone = dropped.clone();
    let cfg = ChannelConfig {
        policy: DropPolicy::Oldest,
        on_drop: Some(Arc::new(move |_v: i32| {
            dropped_clone.fetch_add(1, Ordering::SeqCst);
        })),
        ..Default::default()
    };
    let (tx, _rx) = mpsc::channel::<i32>(4, cfg);
    for i in 0..10 {
        tx.try_send(i).unwrap();
    }
    assert_eq!(dropped.load(Ordering::SeqCst), 6);
}
