//! # Top-Down Placement Search
//!
//! Finds a free, aligned sub-range of a physical window while honoring a set
//! of reserved ranges. Early boot code uses this to carve scratch memory (page
//! tables, bootstrap pools) before the general frame allocator exists.
//!
//! Placements are taken from the **top** of the window: low physical memory
//! tends to hold the structures the bootloader and kernel image already
//! occupy.
//!
//! ## Algorithm
//!
//! ```text
//!  window.base                                              window.end
//!      |--------[ R1 ]-------------------[ R2 ]-------------------|
//!                                                 <--- slot ---->|   (1) highest aligned slot
//!                                 <--- slot --->|                    (2) blocked? drop below R2
//! ```
//!
//! 1. Start with the highest aligned slot of the requested length that fits
//!    inside the window.
//! 2. If any reservation intersects it, move the cursor so the slot ends at
//!    the lowest conflicting reservation's base (rounded down to alignment)
//!    and retry.
//! 3. Stop when a slot is clear, or when the cursor falls below the window.
//!
//! Every step strictly lowers the cursor, and every slot skipped in between
//! still intersects the blocking reservation, so the first clear slot is the
//! highest valid placement. Each step scans the reservations linearly, which
//! is fine for boot-time table sizes.

use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalRange};
use log::trace;

/// Highest `S`-aligned placement of `len` bytes inside `window` that
/// intersects none of `reserved`.
///
/// Returns `None` if `len == 0`, if `len` exceeds the window, or if every
/// aligned slot is blocked. `reserved` may contain overlapping or duplicated
/// entries in any order.
#[must_use]
pub fn search_top_down<S: PageSize>(
    reserved: &[PhysicalRange],
    window: PhysicalRange,
    len: u64,
) -> Option<PhysicalRange> {
    if len == 0 || len > window.len() {
        return None;
    }

    let lowest = window.base().as_u64();
    let mut cursor = S::align_down(window.end() - len);

    loop {
        if cursor < lowest {
            return None;
        }

        // cursor + len <= window.end(), so this never overflows
        let slot = PhysicalRange::new(PhysicalAddress::new(cursor), len)?;
        let Some(blocker) = reserved
            .iter()
            .filter(|r| r.intersects(&slot))
            .min_by_key(|r| r.base())
        else {
            trace!("range search: {slot} is free in {window}");
            return Some(slot);
        };

        trace!("range search: {slot} blocked by {blocker}");
        let below = blocker.base().as_u64().checked_sub(len)?;
        cursor = S::align_down(below);
    }
}
