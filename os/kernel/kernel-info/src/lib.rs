//! # Kernel Memory Configuration
//!
//! Compile-time constants shared by the boot reservation table and the
//! kernel allocators. Keeping them in one crate gives every consumer a single
//! source of truth and lets `const` assertions reject invalid configurations
//! at build time.
//!
//! ## Memory Layout ([`memory`])
//!
//! * **Reservation table capacity**: fixed entry count of the early table.
//! * **Allocation granularity**: page size used for frames and kernel regions.
//! * **Diagnostic labels**: maximum length of a `vmalloc` object name.
//!
//! ```rust
//! use kernel_info::memory::{ALLOCATION_GRANULARITY, RESERVATION_TABLE_CAPACITY};
//!
//! assert_eq!(ALLOCATION_GRANULARITY, 4096);
//! assert!(RESERVATION_TABLE_CAPACITY >= 64);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
