//! # Kernel Memory Allocation
//!
//! Early-boot reservation tracking and kernel virtual allocation: physical
//! ranges that must never be handed out are recorded while the memory map is
//! still being discovered, committed to the frame allocator once, and the
//! kernel then allocates page-granular mapped regions at runtime.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            Boot Reservation Table                   │
//! │    • Fixed-capacity, no heap                        │
//! │    • Top-down placement search                      │
//! │    • One-shot wiring                                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ ReservedFrameSink
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • 4KiB page frame management                     │
//! │    • Bitmap-based free/used tracking                │
//! │    • Reserved frames pinned forever                 │
//! └─────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────┐
//! │           Kernel Virtual Allocator                  │
//! │    • Anonymous object + kernel mapping per region   │
//! │    • Owned handles, released on drop                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ KernelVmBackend
//!                   ▼
//!          object / mapping subsystem
//! ```
//!
//! ## Core Components
//!
//! ### Reservation Table ([`reservation`])
//!
//! Records reserved physical ranges during boot and answers placement
//! queries for early scratch memory through [`range_search`]. Wiring hands
//! every reserved frame to the frame allocator exactly once; afterwards the
//! table is frozen.
//!
//! ### Physical Frame Allocator ([`frame_alloc`])
//!
//! Manages a fixed region of 4 KiB frames with a bitmap. It is the reference
//! consumer of wiring and never reissues a reserved frame.
//!
//! ### Virtual Allocator ([`vmalloc`])
//!
//! `vmalloc`/`vmfree` on top of an abstract object/mapping backend.
//!
//! ## Usage Patterns
//!
//! ### Boot
//! ```rust
//! use kernel_alloc::frame_alloc::{BitmapFrameAlloc, PhysFrameAlloc};
//! use kernel_alloc::reservation::ReservationTable;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let mut table: ReservationTable = ReservationTable::new();
//! table.add_range(PhysicalAddress::new(0x10_0000), 0x20_0000); // kernel image
//!
//! // Scratch memory for early page tables, highest free slot first.
//! let scratch = table
//!     .range_search(PhysicalAddress::zero(), 0x100_0000, 0x4000)
//!     .unwrap();
//! table.add_range(scratch.base(), scratch.len());
//!
//! let mut frames = Box::new(BitmapFrameAlloc::<64>::new(PhysicalAddress::zero()));
//! table.wire(&mut *frames);
//!
//! let frame = frames.alloc_4k().unwrap();
//! assert!(!table.is_reserved(frame.base()));
//! ```
//!
//! ## Integration Points
//!
//! * **kernel-memory-addresses**: address, page and range types
//! * **kernel-info**: capacity, granularity and label-length constants

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

use kernel_info::memory::ALLOCATION_GRANULARITY;
use kernel_memory_addresses::{PageSize, Size4K};

pub mod frame_alloc;
pub mod range_search;
pub mod reservation;
pub mod vmalloc;

/// Page size used for frames, reservations and kernel regions.
pub type Granularity = Size4K;

const _: () = assert!(Granularity::SIZE == ALLOCATION_GRANULARITY);
