//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses, frames and physical
//! byte ranges used by the boot-time reservation table and the kernel
//! allocators.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PhysicalAddress`] | A physical (RAM / MMIO) address. |
//! | [`VirtualAddress`] | A virtual (page-table translated) address. |
//! | [`PhysicalPage<S>`] | The aligned base of a physical frame of size `S`. |
//! | [`PhysicalRange`] | A non-empty half-open physical byte range. |
//!
//! ## Page Sizes
//!
//! Three standard x86-64 page sizes are supported via marker types that
//! implement [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages (base granularity)
//! - [`Size2M`]: 2 MiB huge pages
//! - [`Size1G`]: 1 GiB giant pages
//!
//! The trait carries the alignment helpers (`align_down`, `checked_align_up`,
//! `is_aligned`) used throughout the allocators.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let firmware = PhysicalRange::new(PhysicalAddress::new(0x000E_0123), 0x100).unwrap();
//! let frames = firmware.expand_to::<Size4K>().unwrap();
//! assert_eq!(frames.base().as_u64(), 0x000E_0000);
//! assert_eq!(frames.len(), Size4K::SIZE);
//! ```
//!
//! ## Design Notes
//!
//! - The address types are `#[repr(transparent)]` and implement `Copy`, `Eq`,
//!   `Ord`, and `Hash`, making them suitable as map keys.
//! - The phantom marker `S` enforces the frame size at the type level.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod physical_page;
mod physical_range;
mod virtual_address;

pub use page_size::{PageSize, Size1G, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use physical_range::{Frames, PhysicalRange};
pub use virtual_address::VirtualAddress;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_of_address_is_aligned() {
        let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
        assert_eq!(pa.page::<Size4K>().base().as_u64(), 0x0000_0010_2000_0000);
        assert_eq!(pa.page::<Size2M>().base().as_u64(), 0x0000_0010_2000_0000);
        assert!(pa.align_down::<Size4K>().is_aligned::<Size4K>());
    }

    #[test]
    fn frame_numbers_round_trip() {
        let frame = PhysicalPage::<Size4K>::from_number(0x1234);
        assert_eq!(frame.base().as_u64(), 0x1234_000);
        assert_eq!(frame.number(), 0x1234);
    }

    #[test]
    fn virtual_pointer_view() {
        let va = VirtualAddress::new(0x2000);
        let p: *mut u8 = va.as_mut_ptr();
        assert_eq!(p as u64, va.as_u64());
    }
}
