#![cfg(test)]

use super::test_pool;
use crate::error::SetupError;
use crate::ring::{Ring, TrySendError, channel};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn full_then_fifo() {
    let ring = Ring::with_capacity(4).unwrap();
    for i in 1..=4 {
        ring.try_send(i).unwrap();
    }
    assert!(ring.is_full());
    assert_eq!(ring.try_send(5), Err(TrySendError::Full(5)));
    assert_eq!(ring.len(), 4);

    assert_eq!(ring.try_receive(), Some(1));
    assert_eq!(ring.try_receive(), Some(2));
    assert_eq!(ring.len(), 2);
    ring.try_send(5).unwrap();
    ring.try_send(6).unwrap();
    assert!(ring.try_send(7).is_err());

    let rest: Vec<_> = std::iter::from_fn(|| ring.try_receive()).collect();
    assert_eq!(rest, vec![3, 4, 5, 6]);
    assert!(ring.is_empty());
    assert_eq!(ring.try_receive(), None);
}

#[test]
fn capacity_must_be_power_of_two() {
    assert!(matches!(Ring::<u8>::with_capacity(0), Err(SetupError::Ring(_))));
    assert!(matches!(Ring::<u8>::with_capacity(6), Err(SetupError::Ring(_))));
    assert_eq!(Ring::<u8>::with_capacity(1).unwrap().capacity(), 1);
}

#[test]
fn single_slot_ring_rejects_second_item() {
    let ring = Ring::with_capacity(1).unwrap();
    ring.try_send(1).unwrap();
    assert!(ring.is_full());
    assert_eq!(ring.try_send(2), Err(TrySendError::Full(2)));
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.try_receive(), Some(1));
    assert_eq!(ring.try_receive(), None);
    assert!(ring.is_empty());

    for lap in 10..20 {
        ring.try_send(lap).unwrap();
        assert!(ring.try_send(lap + 100).is_err());
        assert_eq!(ring.try_receive(), Some(lap));
    }
}

#[test]
fn single_slot_ring_keeps_buffers_accounted() {
    let pool = test_pool("one", 4, 64, 0);
    let ring = Ring::with_capacity(1).unwrap();
    ring.try_send(pool.acquire().unwrap()).unwrap();
    let rejected = ring.try_send(pool.acquire().unwrap()).unwrap_err().into_inner();
    assert_eq!(pool.checked_out(), 2);
    pool.release(rejected);
    assert_eq!(pool.checked_out(), 1);
    assert_eq!(ring.len(), 1);

    drop(ring);
    assert_eq!(pool.checked_out(), 0);
    assert_eq!(pool.free_count(), 4);
}

#[test]
fn wraps_many_laps() {
    let ring = Ring::with_capacity(8).unwrap();
    let mut next_out = 0u32;
    for i in 0..1_000u32 {
        ring.try_send(i).unwrap();
        if i % 3 != 0 {
            assert_eq!(ring.try_receive(), Some(next_out));
            next_out += 1;
        }
        if ring.is_full() {
            while let Some(v) = ring.try_receive() {
                assert_eq!(v, next_out);
                next_out += 1;
            }
        }
        assert!(ring.len() <= ring.capacity());
    }
}

#[test]
fn full_ring_hands_buffer_back() {
    let pool = test_pool("ring", 8, 64, 0);
    let ring = Ring::with_capacity(2).unwrap();
    ring.try_send(pool.acquire().unwrap()).unwrap();
    ring.try_send(pool.acquire().unwrap()).unwrap();
    let before = pool.free_count();

    let rejected = ring.try_send(pool.acquire().unwrap()).unwrap_err().into_inner();
    assert_eq!(pool.free_count(), before - 1);
    pool.release(rejected);
    assert_eq!(pool.free_count(), before);

    drop(ring);
    assert_eq!(pool.free_count(), 8);
    assert_eq!(pool.checked_out(), 0);
}

#[test]
fn channel_halves_share_one_ring() {
    let (tx, rx) = channel::<u16>(4).unwrap();
    let tx2 = tx.clone();
    tx.try_send(1).unwrap();
    tx2.try_send(2).unwrap();
    assert_eq!(rx.ring().len(), 2);
    assert_eq!(rx.try_receive(), Some(1));
    assert_eq!(rx.clone().try_receive(), Some(2));
    assert!(tx.ring().is_empty());
}

#[test]
fn mpmc_delivers_each_item_once_in_producer_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 20_000;
    let ring = Arc::new(Ring::<u64>::with_capacity(64).unwrap());
    let received = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let mut item = (p << 32) | seq;
                    while let Err(TrySendError::Full(back)) = ring.try_send(item) {
                        item = back;
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let ring = Arc::clone(&ring);
            let received = Arc::clone(&received);
            std::thread::spawn(move || {
                let mut seen = Vec::new();
                while received.load(Ordering::Relaxed) < (PRODUCERS * PER_PRODUCER) as usize {
                    match ring.try_receive() {
                        Some(item) => {
                            received.fetch_add(1, Ordering::Relaxed);
                            seen.push(item);
                        }
                        None => std::hint::spin_loop(),
                    }
                }
                seen
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let mut all = HashSet::new();
    for consumer in consumers {
        let seen = consumer.join().unwrap();
        let mut last = [None::<u64>; PRODUCERS as usize];
        for item in &seen {
            let producer = (item >> 32) as usize;
            let seq = item & 0xffff_ffff;
            if let Some(prev) = last[producer] {
                assert!(seq > prev, "producer {producer} reordered: {prev} then {seq}");
            }
            last[producer] = Some(seq);
        }
        all.extend(seen);
    }
    assert_eq!(all.len() as u64, PRODUCERS * PER_PRODUCER);
    assert!(ring.is_empty());
}
