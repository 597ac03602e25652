#![cfg(not(loom))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use proptest::prelude::*;
use turbo_spsc::harness::{pop_with_backoff, push_with_backoff, RollingHash};
use turbo_spsc::{channel, BoundedSpscQueue, CapacityError, PushError};

#[test]
fn test_basic_push_pop() {
    let (tx, rx) = channel::<i32>(8).unwrap();

    tx.push(42).unwrap();
    assert_eq!(rx.pop(), Some(42));
}

#[test]
fn test_fifo_order() {
    let (tx, rx) = channel::<i32>(16).unwrap();

    for i in 0..10 {
        tx.push(i).unwrap();
    }

    for i in 0..10 {
        assert_eq!(rx.pop(), Some(i));
    }
}

#[test]
fn test_capacity_rounding() {
    let cases = [(1, 1), (2, 2), (3, 4), (1000, 1024), (1024, 1024), (1025, 2048)];
    for (requested, effective) in cases {
        let queue = BoundedSpscQueue::<i32>::new(requested).unwrap();
        assert_eq!(queue.capacity(), effective, "requested {requested}");
        assert_eq!(queue.usable_capacity(), effective - 1);
    }
}

#[test]
fn test_zero_capacity_is_rejected() {
    assert_eq!(channel::<i32>(0).unwrap_err(), CapacityError::Zero);
}

#[test]
fn test_full_queue() {
    let (tx, rx) = channel::<usize>(1024).unwrap();

    for i in 0..1023 {
        assert!(tx.push(i).is_ok());
    }
    assert!(tx.is_full());
    assert_eq!(tx.push(99), Err(PushError(99)));

    assert_eq!(rx.pop(), Some(0));
    assert!(tx.push(1023).is_ok());
    assert_eq!(tx.push(1024), Err(PushError(1024)));
}

#[test]
fn test_empty_queue() {
    let (tx, rx) = channel::<i32>(4).unwrap();
    assert_eq!(rx.pop(), None);

    tx.push(7).unwrap();
    assert_eq!(rx.pop(), Some(7));
    assert_eq!(rx.pop(), None);
    assert_eq!(rx.pop(), None);

    tx.push(8).unwrap();
    assert_eq!(rx.pop(), Some(8));
}

#[test]
fn test_len_and_empty() {
    let (tx, rx) = channel::<i32>(8).unwrap();

    assert!(rx.is_empty());
    assert_eq!(rx.len(), 0);

    tx.push(1).unwrap();
    tx.push(2).unwrap();

    assert!(!tx.is_empty());
    assert_eq!(rx.len(), 2);
}

#[test]
fn test_push_error_returns_value() {
    let (tx, _rx) = channel::<String>(2).unwrap();

    tx.push("first".to_string()).unwrap();

    match tx.push("second".to_string()) {
        Err(PushError(value)) => assert_eq!(value, "second"),
        Ok(()) => panic!("expected PushError"),
    }
}

#[test]
fn test_alternating_push_pop() {
    let (tx, rx) = channel::<i32>(4).unwrap();

    for i in 0..100 {
        tx.push(i).unwrap();
        assert_eq!(rx.pop(), Some(i));
    }
}

#[test]
fn test_wrap_around() {
    let (tx, rx) = channel::<usize>(8).unwrap();

    for round in 0..10 {
        for i in 0..7 {
            tx.push(round * 100 + i).unwrap();
        }
        for i in 0..7 {
            assert_eq!(rx.pop(), Some(round * 100 + i));
        }
    }
}

#[test]
fn test_drop_elements() {
    static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct DropCounter;

    impl Drop for DropCounter {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::Relaxed);
        }
    }

    {
        let (tx, rx) = channel::<DropCounter>(8).unwrap();
        for _ in 0..5 {
            tx.push(DropCounter).unwrap();
        }
        drop(rx.pop());
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 1);
    }

    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 5);
}

#[test]
fn test_drop_elements_after_wrap_around() {
    static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct DropCounter;

    impl Drop for DropCounter {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::Relaxed);
        }
    }

    {
        let (tx, rx) = channel::<DropCounter>(8).unwrap();
        for _ in 0..6 {
            tx.push(DropCounter).unwrap();
        }
        for _ in 0..6 {
            drop(rx.pop());
        }
        // Cursors wrap: head at 6, tail at 3.
        for _ in 0..5 {
            tx.push(DropCounter).unwrap();
        }
        assert_eq!(rx.len(), 5);
        assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 6);
    }

    assert_eq!(DROP_COUNT.load(Ordering::Relaxed), 11);
}

#[test]
fn test_consumer_drains_after_producer_drops() {
    let (tx, rx) = channel::<u64>(16).unwrap();

    let producer = thread::spawn(move || {
        for i in 0..1_000 {
            push_with_backoff(&tx, i).unwrap();
        }
    });

    let mut received = Vec::new();
    while let Some(value) = pop_with_backoff(&rx) {
        received.push(value);
    }

    producer.join().unwrap();
    assert!(rx.is_abandoned());
    assert!(received.iter().copied().eq(0..1_000));
}

#[test]
fn test_handles_outlive_each_other() {
    let (tx, rx) = channel::<Vec<u8>>(4).unwrap();
    tx.push(vec![1, 2, 3]).unwrap();
    drop(tx);
    assert_eq!(rx.pop(), Some(vec![1, 2, 3]));
    assert_eq!(rx.pop(), None);
}

#[test]
fn test_spsc_threaded_stress() {
    const N: u64 = 100_000;

    let (tx, rx) = channel::<u64>(1024).unwrap();

    let producer = thread::spawn(move || {
        let mut hash = RollingHash::new();
        for i in 0..N {
            hash.update(&i);
            push_with_backoff(&tx, i).unwrap();
        }
        hash.value()
    });

    let consumer = thread::spawn(move || {
        let mut hash = RollingHash::new();
        let mut received = Vec::with_capacity(N as usize);
        for _ in 0..N {
            let value = pop_with_backoff(&rx).unwrap();
            hash.update(&value);
            received.push(value);
        }
        (received, hash.value())
    });

    let producer_hash = producer.join().unwrap();
    let (received, consumer_hash) = consumer.join().unwrap();

    assert!(received.iter().copied().eq(0..N));
    assert_eq!(producer_hash, consumer_hash);
}

#[test]
fn test_stress_small_queue_owned_values() {
    let (tx, rx) = channel::<String>(2).unwrap();

    let producer = thread::spawn(move || {
        for i in 0..10_000 {
            push_with_backoff(&tx, i.to_string()).unwrap();
        }
    });

    let consumer = thread::spawn(move || {
        for i in 0..10_000 {
            assert_eq!(pop_with_backoff(&rx), Some(i.to_string()));
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Pop,
}

proptest! {
    #[test]
    fn prop_sequence_matches_vecdeque(
        requested in 1usize..=16,
        ops in prop::collection::vec(
            prop_oneof![any::<i32>().prop_map(Op::Push), Just(Op::Pop)],
            1..200,
        ),
    ) {
        let (tx, rx) = channel::<i32>(requested).unwrap();
        let usable = tx.capacity() - 1;
        let mut model: VecDeque<i32> = VecDeque::with_capacity(usable);

        for op in ops {
            match op {
                Op::Push(v) => {
                    let was_full = model.len() == usable;
                    match tx.push(v) {
                        Ok(()) => {
                            prop_assert!(!was_full);
                            model.push_back(v);
                        }
                        Err(PushError(back)) => {
                            prop_assert!(was_full);
                            prop_assert_eq!(back, v);
                        }
                    }
                }
                Op::Pop => {
                    prop_assert_eq!(rx.pop(), model.pop_front());
                }
            }
            prop_assert_eq!(rx.len(), model.len());
            prop_assert_eq!(tx.is_full(), model.len() == usable);
        }
    }
}
