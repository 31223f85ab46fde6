//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size4K};

/// Maximum number of physical ranges the boot reservation table can record.
///
/// The table lives inline in the boot context (no heap exists yet), so this
/// bounds its footprint: 16 bytes per entry.
pub const RESERVATION_TABLE_CAPACITY: usize = 128;

/// Minimum mappable/allocatable unit for both physical frames and kernel
/// virtual regions.
pub const ALLOCATION_GRANULARITY: u64 = Size4K::SIZE;

/// Longest diagnostic label (in bytes) attached to a `vmalloc` backing object.
/// Longer names are truncated on a UTF-8 boundary.
pub const VMALLOC_NAME_MAX: usize = 32;

/// Where you place the bytes in *physical* memory (LMA) before paging.
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

const _: () = {
    assert!(ALLOCATION_GRANULARITY.is_power_of_two());
    assert!(RESERVATION_TABLE_CAPACITY > 0);
    assert!(VMALLOC_NAME_MAX > 0);
    assert!(PHYS_LOAD.is_multiple_of(ALLOCATION_GRANULARITY));
};
