//! # Fixed-Size Buffer Pool
//!
//! ## Purpose
//!
//! Hands out and reclaims packet buffers without per-call heap allocation. A pool
//! owns an arena of `capacity` slots of `slot_size` bytes each, reserved once at
//! startup and never resized.
//!
//! ## How it works
//!
//! The arena is a single [`OwnedMmap`]. Free slots are tracked by index in a
//! lock-free `ArrayQueue`, so any worker can acquire or release concurrently.
//! A [`Buffer`] is the only way to reach a slot's bytes: it is move-only, and
//! dropping it pushes the slot index back on the free list, so every checkout is
//! matched by exactly one release. Workers that want to avoid touching the shared
//! queue for every packet put a [`PoolCache`] in front of it; the cache keeps a
//! private stack of free slots, refills it in bulk and flushes the overflow back.
//!
//! Accounting: `free_count()` counts slots on the shared free list plus slots
//! parked in caches, `checked_out()` counts live `Buffer` handles. At every
//! quiescent point `free_count() + checked_out() == capacity()`.
//!
//! ## Main components
//!
//! - `PoolConfig`: Name, slot count, slot size, cache size and huge page choice.
//! - `BufferPool`: Cloneable handle to a shared pool.
//! - `Buffer`: Exclusive handle to one slot plus its valid length.
//! - `PoolCache`: Per-worker cache of free slots.

use crate::error::{BufferError, SetupError};
use crate::mmap::OwnedMmap;
use crossbeam_queue::ArrayQueue;
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Parameters of a buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub name: String,
    /// Number of slots (N).
    pub capacity: usize,
    /// Size of each slot in bytes (S).
    pub slot_size: usize,
    /// Size of each worker's private cache; 0 disables caching.
    pub cache_size: usize,
    /// See [`OwnedMmap::mmap`].
    pub huge_page: Option<bool>,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, capacity: usize, slot_size: usize) -> Self {
        PoolConfig {
            name: name.into(),
            capacity,
            slot_size,
            cache_size: 0,
            huge_page: None,
        }
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_huge_page(mut self, huge_page: Option<bool>) -> Self {
        self.huge_page = huge_page;
        self
    }
}

struct Shared {
    name: String,
    arena: OwnedMmap,
    slot_size: usize,
    capacity: usize,
    cache_size: usize,
    free: ArrayQueue<u32>,
    cached: AtomicUsize,
    checked_out: AtomicUsize,
}

impl Shared {
    fn checkout(self: &Arc<Self>, slot: u32) -> Buffer {
        debug_assert!((slot as usize) < self.capacity);
        self.checked_out.fetch_add(1, Ordering::Relaxed);
        // SAFETY: slot < capacity and the arena holds capacity * slot_size bytes.
        let data = unsafe { self.arena.as_ptr().add(slot as usize * self.slot_size) };
        Buffer {
            pool: Arc::clone(self),
            // SAFETY: derived from the non-null arena base.
            data: unsafe { NonNull::new_unchecked(data) },
            slot,
            len: 0,
        }
    }

    fn put_free(&self, slot: u32) {
        if self.free.push(slot).is_err() {
            // Only possible if a slot index was duplicated, which ownership rules out.
            log::error!("pool {}: free list overflow, slot {slot} lost", self.name);
        }
    }
}

/// Cloneable handle to a shared, thread-safe buffer pool.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<Shared>,
}

impl BufferPool {
    /// Creates a pool and reserves its arena.
    pub fn new(config: PoolConfig) -> Result<Self, SetupError> {
        let fail = |reason: String| SetupError::Pool {
            name: config.name.clone(),
            reason,
        };
        if config.capacity == 0 {
            return Err(fail("capacity must be at least one slot".into()));
        }
        if config.slot_size == 0 {
            return Err(fail("slot size must be non-zero".into()));
        }
        if config.capacity > u32::MAX as usize {
            return Err(fail(format!("capacity {} is too large", config.capacity)));
        }
        let arena_size = config
            .capacity
            .checked_mul(config.slot_size)
            .ok_or_else(|| fail("arena size overflows".into()))?;
        let arena = OwnedMmap::mmap(arena_size, config.huge_page)
            .map_err(|e| fail(format!("failed to allocate arena: {e}")))?;

        let free = ArrayQueue::new(config.capacity);
        for slot in 0..config.capacity as u32 {
            // Cannot fail: the queue holds exactly `capacity` entries.
            let _ = free.push(slot);
        }
        log::debug!(
            "pool {}: {} slots of {} bytes, arena {} bytes{}",
            config.name,
            config.capacity,
            config.slot_size,
            arena.len(),
            if arena.is_huge() { " on huge pages" } else { "" }
        );
        Ok(BufferPool {
            shared: Arc::new(Shared {
                name: config.name,
                arena,
                slot_size: config.slot_size,
                capacity: config.capacity,
                cache_size: config.cache_size,
                free,
                cached: AtomicUsize::new(0),
                checked_out: AtomicUsize::new(0),
            }),
        })
    }

    /// Takes a free buffer from the shared free list, or `None` when the pool is empty.
    ///
    /// The returned buffer has length 0; its bytes keep whatever the previous
    /// owner wrote.
    #[inline]
    pub fn acquire(&self) -> Option<Buffer> {
        let slot = self.shared.free.pop()?;
        Some(self.shared.checkout(slot))
    }

    /// Returns a buffer to its pool. Equivalent to dropping it.
    #[inline]
    pub fn release(&self, buf: Buffer) {
        debug_assert!(buf.belongs_to(self), "buffer released to a foreign pool");
        drop(buf);
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn slot_size(&self) -> usize {
        self.shared.slot_size
    }

    pub fn cache_size(&self) -> usize {
        self.shared.cache_size
    }

    /// Free slots, including those parked in worker caches.
    pub fn free_count(&self) -> usize {
        self.shared.free.len() + self.shared.cached.load(Ordering::Relaxed)
    }

    /// Live `Buffer` handles drawn from this pool.
    pub fn checked_out(&self) -> usize {
        self.shared.checked_out.load(Ordering::Relaxed)
    }

    /// Creates a private cache for one worker.
    pub fn cache(&self) -> PoolCache {
        PoolCache::new(self)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("slot_size", &self.shared.slot_size)
            .field("free", &self.free_count())
            .field("checked_out", &self.checked_out())
            .finish()
    }
}

/// Exclusive handle to one pool slot.
///
/// The slot is owned by exactly one `Buffer` at a time; moving the handle is the
/// only way to transfer it. Dropping the handle returns the slot to its pool.
pub struct Buffer {
    pool: Arc<Shared>,
    data: NonNull<u8>,
    slot: u32,
    len: usize,
}

// SAFETY: the slot's bytes are reachable only through this handle.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

assert_impl_all!(Buffer: Send, Sync);
assert_not_impl_any!(Buffer: Clone, Copy);
assert_impl_all!(BufferPool: Send, Sync, Clone);

impl Buffer {
    /// Length of the valid region.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum length, the pool's slot size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.pool.slot_size
    }

    /// Index of the slot within the pool arena.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }

    /// Returns `true` if this buffer was drawn from `pool`.
    pub fn belongs_to(&self, pool: &BufferPool) -> bool {
        Arc::ptr_eq(&self.pool, &pool.shared)
    }

    /// The valid bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: len <= slot_size, the slot is exclusively ours.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    /// The valid bytes, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: len <= slot_size, the slot is exclusively ours.
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    /// Sets the valid length. Bytes newly exposed keep their previous content.
    pub fn set_len(&mut self, len: usize) -> Result<(), BufferError> {
        if len > self.capacity() {
            return Err(BufferError::TooLong {
                len,
                capacity: self.capacity(),
            });
        }
        self.len = len;
        Ok(())
    }

    /// Copies `bytes` after the valid region and extends it.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let start = self.len;
        self.set_len(start + bytes.len())?;
        self.as_mut_slice()[start..].copy_from_slice(bytes);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Gives up the slot without putting it on the shared free list.
    fn detach(self) -> u32 {
        let mut this = ManuallyDrop::new(self);
        this.pool.checked_out.fetch_sub(1, Ordering::Relaxed);
        let slot = this.slot;
        // SAFETY: `this` is never touched again, the Arc is released exactly once.
        unsafe { ptr::drop_in_place(&mut this.pool) };
        slot
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.pool.checked_out.fetch_sub(1, Ordering::Relaxed);
        self.pool.put_free(self.slot);
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("pool", &self.pool.name)
            .field("slot", &self.slot)
            .field("len", &self.len)
            .finish()
    }
}

/// Per-worker cache of free slots in front of a shared pool.
///
/// Not shared between workers. Acquire and release hit the private stack first;
/// the shared free list is touched only to refill half a cache at a time or to
/// flush the overflow. Remaining slots are flushed when the cache is dropped.
pub struct PoolCache {
    pool: BufferPool,
    slots: Vec<u32>,
    size: usize,
}

impl PoolCache {
    pub fn new(pool: &BufferPool) -> Self {
        let size = pool.cache_size();
        PoolCache {
            pool: pool.clone(),
            slots: Vec::with_capacity(size + 1),
            size,
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Slots currently parked in this cache.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Takes a free buffer, refilling from the shared pool if the cache is empty.
    #[inline]
    pub fn acquire(&mut self) -> Option<Buffer> {
        if self.size == 0 {
            return self.pool.acquire();
        }
        if self.slots.is_empty() {
            self.refill();
        }
        let slot = self.slots.pop()?;
        let shared = &self.pool.shared;
        let buf = shared.checkout(slot);
        shared.cached.fetch_sub(1, Ordering::Relaxed);
        Some(buf)
    }

    /// Parks a buffer's slot in the cache, flushing half of it when it overflows.
    /// Buffers from other pools go straight back to their own pool.
    #[inline]
    pub fn release(&mut self, buf: Buffer) {
        if self.size == 0 || !buf.belongs_to(&self.pool) {
            drop(buf);
            return;
        }
        let slot = buf.detach();
        self.pool.shared.cached.fetch_add(1, Ordering::Relaxed);
        self.slots.push(slot);
        if self.slots.len() > self.size {
            self.flush(self.slots.len() - self.size / 2);
        }
    }

    fn refill(&mut self) {
        let shared = &self.pool.shared;
        let want = self.size.div_ceil(2);
        let mut got = 0;
        while got < want {
            let Some(slot) = shared.free.pop() else {
                break;
            };
            self.slots.push(slot);
            got += 1;
        }
        shared.cached.fetch_add(got, Ordering::Relaxed);
    }

    fn flush(&mut self, count: usize) {
        let shared = &self.pool.shared;
        let count = count.min(self.slots.len());
        for slot in self.slots.drain(self.slots.len() - count..) {
            shared.put_free(slot);
        }
        shared.cached.fetch_sub(count, Ordering::Relaxed);
    }
}

impl Drop for PoolCache {
    fn drop(&mut self) {
        self.flush(self.slots.len());
    }
}
