//! # Memory Mapping for Buffer Arenas
//!
//! ## Purpose
//!
//! This module owns the memory that backs every buffer pool. A pool reserves one
//! contiguous anonymous mapping at startup and carves it into fixed-size slots,
//! so the polling loops never touch the heap for packet data.
//!
//! ## How it works
//!
//! `OwnedMmap::mmap` rounds the requested size up to the page size (2MB when huge
//! pages are used) and maps it with `MAP_POPULATE`, so every page is faulted in
//! before the first burst. When the caller leaves the huge page choice open, the
//! free huge page count in `/proc/meminfo` decides, and a failed huge page mapping
//! falls back to regular pages. The region is released with `munmap` on drop.
//!
//! ## Main components
//!
//! - `OwnedMmap`: A struct that acts as the owner of a memory-mapped region.
//! - `get_hugepage_info()`: Reads huge page availability from `/proc/meminfo`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::ptr::{self, NonNull};

const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Owner of an anonymous memory-mapped region.
pub struct OwnedMmap {
    ptr: NonNull<u8>,
    len: usize,
    huge: bool,
}

// The mapping is plain memory; access to individual slots is coordinated by the pool.
unsafe impl Send for OwnedMmap {}
unsafe impl Sync for OwnedMmap {}

impl OwnedMmap {
    /// Maps at least `size` bytes of zeroed, pre-faulted memory.
    ///
    /// - `huge_page = Some(true)`: requires 2MB huge pages.
    /// - `huge_page = Some(false)`: regular pages only.
    /// - `huge_page = None`: huge pages if `/proc/meminfo` reports free ones,
    ///   regular pages otherwise or if the huge page mapping fails.
    pub fn mmap(size: usize, huge_page: Option<bool>) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty region",
            ));
        }
        match huge_page {
            Some(huge) => map_anonymous(size, huge),
            None => {
                let available = get_hugepage_info()
                    .map(|info| matches!((info.free, info.size_kb), (Some(free), Some(2048)) if free > 0))
                    .unwrap_or(false);
                if available {
                    match map_anonymous(size, true) {
                        Ok(mmap) => return Ok(mmap),
                        Err(e) => log::warn!(
                            "huge page mapping of {size} bytes failed ({e}), using regular pages"
                        ),
                    }
                }
                map_anonymous(size, false)
            }
        }
    }

    /// Returns the base address of the region.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Returns the size of the region in bytes, after page alignment.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the region is backed by huge pages.
    pub fn is_huge(&self) -> bool {
        self.huge
    }
}

fn map_anonymous(size: usize, huge: bool) -> io::Result<OwnedMmap> {
    let page_size = if huge {
        HUGE_PAGE_SIZE
    } else {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    };
    let aligned_size = size
        .checked_add(page_size - 1)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "region size overflows"))?
        & !(page_size - 1);
    let flags = libc::MAP_PRIVATE
        | libc::MAP_ANONYMOUS
        | libc::MAP_POPULATE
        | if huge {
            libc::MAP_HUGETLB | libc::MAP_HUGE_2MB
        } else {
            0
        };
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            aligned_size,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    let ptr = NonNull::new(addr as *mut u8)
        .ok_or_else(|| io::Error::other("mmap returned a null address"))?;
    Ok(OwnedMmap {
        ptr,
        len: aligned_size,
        huge,
    })
}

impl Drop for OwnedMmap {
    fn drop(&mut self) {
        let res = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if res < 0 {
            log::error!("Failed to unmap memory: {}", io::Error::last_os_error());
        }
    }
}

/// Contains information about the system's huge page configuration.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HugePageInfo {
    /// The size of a huge page in kilobytes.
    pub size_kb: Option<u64>,
    /// The total number of huge pages configured in the system.
    pub total: Option<u64>,
    /// The number of free (available) huge pages.
    pub free: Option<u64>,
}

/// Parses `/proc/meminfo` to get information about huge pages.
pub fn get_hugepage_info() -> io::Result<HugePageInfo> {
    parse_meminfo(BufReader::new(File::open("/proc/meminfo")?))
}

/// Extracts `Hugepagesize`, `HugePages_Total` and `HugePages_Free` from
/// meminfo-formatted text.
pub fn parse_meminfo(reader: impl BufRead) -> io::Result<HugePageInfo> {
    let mut info = HugePageInfo::default();
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "Hugepagesize" => &mut info.size_kb,
            "HugePages_Total" => &mut info.total,
            "HugePages_Free" => &mut info.free,
            _ => continue,
        };
        let value = value.trim().trim_end_matches(" kB");
        *slot = Some(value.parse().map_err(io::Error::other)?);
    }
    Ok(info)
}
