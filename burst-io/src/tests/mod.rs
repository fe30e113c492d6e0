mod mmap;
mod ring;

use crate::pool::{BufferPool, PoolConfig};

/// Small regular-page pool for tests.
pub(crate) fn test_pool(name: &str, capacity: usize, slot_size: usize, cache_size: usize) -> BufferPool {
    BufferPool::new(
        PoolConfig::new(name, capacity, slot_size)
            .with_cache_size(cache_size)
            .with_huge_page(Some(false)),
    )
    .unwrap()
}
