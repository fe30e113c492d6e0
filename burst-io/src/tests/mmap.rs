#![cfg(test)]

use crate::mmap::{HugePageInfo, OwnedMmap, parse_meminfo};
use std::io::Cursor;

#[test]
fn regular_pages_are_rounded_and_zeroed() {
    let region = OwnedMmap::mmap(10_000, Some(false)).unwrap();
    assert!(region.len() >= 10_000);
    assert_eq!(region.len() % 4096, 0);
    assert!(!region.is_huge());
    let bytes = unsafe { std::slice::from_raw_parts_mut(region.as_ptr(), region.len()) };
    assert!(bytes.iter().all(|b| *b == 0));
    bytes[region.len() - 1] = 7;
    assert_eq!(bytes[region.len() - 1], 7);
}

#[test]
fn empty_region_is_rejected() {
    assert!(OwnedMmap::mmap(0, Some(false)).is_err());
    assert!(OwnedMmap::mmap(0, None).is_err());
}

#[test]
fn meminfo_hugepage_fields() {
    let text = "MemTotal:       32657320 kB\n\
                HugePages_Total:      64\n\
                HugePages_Free:       60\n\
                HugePages_Rsvd:        0\n\
                Hugepagesize:       2048 kB\n";
    let info = parse_meminfo(Cursor::new(text)).unwrap();
    assert_eq!(
        info,
        HugePageInfo {
            size_kb: Some(2048),
            total: Some(64),
            free: Some(60),
        }
    );
    assert_eq!(parse_meminfo(Cursor::new("")).unwrap(), HugePageInfo::default());
    assert!(parse_meminfo(Cursor::new("HugePages_Free: many\n")).is_err());
}
