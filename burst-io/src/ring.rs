//! # Bounded Lock-Free Ring
//!
//! ## Purpose
//!
//! A fixed-capacity queue of owned handles (normally [`crate::Buffer`]s) that
//! moves work between polling workers. It never blocks and never grows: sending
//! into a full ring hands the item back, receiving from an empty ring returns
//! `None`.
//!
//! ## How it works
//!
//! The ring is an array of `capacity` slots (a power of two) plus two indexes:
//! `tail` for producers and `head` for consumers. An index packs a lap number
//! above a slot index; `one_lap` is the smallest power of two above `capacity`,
//! so the lap bits never overlap the slot bits, even for a single slot. Each slot
//! carries a stamp telling whose turn it is:
//!
//! ```text
//!   stamp == tail            slot is empty, producer at `tail` may claim it
//!   stamp == head + 1        slot is full, consumer at `head` may claim it
//!   stamp == head + one_lap  slot was consumed, free for the next lap
//! ```
//!
//! A producer claims a slot by advancing `tail` with a compare-exchange, writes
//! the value and publishes it by storing the new stamp with `Release`.
//! Consumers mirror this on `head`. Several producers and consumers may run at
//! once; each item is delivered exactly once and items from one producer keep
//! their order.
//!
//! ## Main components
//!
//! - `Ring<T>`: The queue itself, shareable through `Arc`.
//! - `TrySendError<T>`: Returned by `try_send` on a full ring, carrying the item.
//! - `channel()`, `Sender<T>`, `Receiver<T>`: Producer/consumer halves of one ring.

use crate::error::SetupError;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicUsize, Ordering};

#[repr(align(64))]
struct CacheAligned<T>(T);

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity multi-producer multi-consumer queue.
pub struct Ring<T> {
    head: CacheAligned<AtomicUsize>,
    tail: CacheAligned<AtomicUsize>,
    slots: Box<[Slot<T>]>,
    cap: usize,
    one_lap: usize,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

/// The ring was full; the rejected item is handed back to the caller.
#[derive(PartialEq, Eq)]
pub enum TrySendError<T> {
    Full(T),
}

impl<T> TrySendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TrySendError::Full(value) => value,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ring is full")
    }
}

impl<T> std::error::Error for TrySendError<T> {}

impl<T> Ring<T> {
    /// Creates an empty ring holding up to `capacity` items.
    ///
    /// `capacity` must be a non-zero power of two.
    pub fn with_capacity(capacity: usize) -> Result<Self, SetupError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(SetupError::Ring(format!(
                "capacity {capacity} is not a non-zero power of two"
            )));
        }
        let slots = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();
        Ok(Ring {
            head: CacheAligned(AtomicUsize::new(0)),
            tail: CacheAligned(AtomicUsize::new(0)),
            slots,
            cap: capacity,
            one_lap: (capacity + 1).next_power_of_two(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Index following `pos`, moving to the next lap after the last slot.
    #[inline]
    fn advance(&self, pos: usize) -> usize {
        let index = pos & (self.one_lap - 1);
        if index + 1 < self.cap {
            pos + 1
        } else {
            (pos & !(self.one_lap - 1)).wrapping_add(self.one_lap)
        }
    }

    /// Enqueues `value`, or returns it inside `TrySendError::Full` if no slot is free.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut tail = self.tail.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[tail & (self.one_lap - 1)];
            let stamp = slot.stamp.load(Ordering::Acquire);
            if stamp == tail {
                match self.tail.0.compare_exchange_weak(
                    tail,
                    self.advance(tail),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the CAS gives this producer the slot until
                        // the stamp store below publishes it.
                        unsafe { (*slot.value.get()).write(value) };
                        slot.stamp.store(tail + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => tail = current,
                }
            } else if stamp.wrapping_add(self.one_lap) == tail + 1 {
                // The slot still holds last lap's item.
                atomic::fence(Ordering::SeqCst);
                let head = self.head.0.load(Ordering::Relaxed);
                if head.wrapping_add(self.one_lap) == tail {
                    return Err(TrySendError::Full(value));
                }
                tail = self.tail.0.load(Ordering::Relaxed);
            } else {
                std::hint::spin_loop();
                tail = self.tail.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Dequeues the oldest item, or `None` if the ring is empty.
    pub fn try_receive(&self) -> Option<T> {
        let mut head = self.head.0.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head & (self.one_lap - 1)];
            let stamp = slot.stamp.load(Ordering::Acquire);
            if stamp == head + 1 {
                match self.head.0.compare_exchange_weak(
                    head,
                    self.advance(head),
                    Ordering::SeqCst,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the Acquire load saw the producer's publish, and
                        // winning the CAS makes this the only reader of the slot.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.stamp
                            .store(head.wrapping_add(self.one_lap), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => head = current,
                }
            } else if stamp == head {
                atomic::fence(Ordering::SeqCst);
                let tail = self.tail.0.load(Ordering::Relaxed);
                if tail == head {
                    return None;
                }
                head = self.head.0.load(Ordering::Relaxed);
            } else {
                std::hint::spin_loop();
                head = self.head.0.load(Ordering::Relaxed);
            }
        }
    }

    /// Number of resident items. Exact when no other thread is operating on the ring.
    pub fn len(&self) -> usize {
        loop {
            let tail = self.tail.0.load(Ordering::SeqCst);
            let head = self.head.0.load(Ordering::SeqCst);
            if self.tail.0.load(Ordering::SeqCst) == tail {
                let hix = head & (self.one_lap - 1);
                let tix = tail & (self.one_lap - 1);
                return if hix < tix {
                    tix - hix
                } else if hix > tix {
                    self.cap - hix + tix
                } else if tail == head {
                    0
                } else {
                    self.cap
                };
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        while self.try_receive().is_some() {}
    }
}

impl<T> fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// Producer half of a ring created by [`channel`].
pub struct Sender<T>(Arc<Ring<T>>);

/// Consumer half of a ring created by [`channel`].
pub struct Receiver<T>(Arc<Ring<T>>);

/// Creates one ring and returns its producer and consumer halves.
///
/// Both halves are cloneable, so the same ring can serve several producers
/// and consumers.
pub fn channel<T>(capacity: usize) -> Result<(Sender<T>, Receiver<T>), SetupError> {
    let ring = Arc::new(Ring::with_capacity(capacity)?);
    Ok((Sender(Arc::clone(&ring)), Receiver(ring)))
}

impl<T> Sender<T> {
    #[inline]
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        self.0.try_send(value)
    }

    pub fn ring(&self) -> &Ring<T> {
        &self.0
    }
}

impl<T> Receiver<T> {
    #[inline]
    pub fn try_receive(&self) -> Option<T> {
        self.0.try_receive()
    }

    pub fn ring(&self) -> &Ring<T> {
        &self.0
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender(Arc::clone(&self.0))
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver(Arc::clone(&self.0))
    }
}
