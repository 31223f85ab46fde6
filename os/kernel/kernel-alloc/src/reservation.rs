//! # Boot Reservation Table
//!
//! Records the physical ranges that must never reach general allocation
//! (firmware tables, bootloader images, the kernel image) while the kernel is
//! still discovering its memory map, and commits them to the physical frame
//! allocator exactly once.
//!
//! ## Lifecycle
//!
//! ```text
//!            add_range            add_range
//!   Empty ─────────────▶ Populated ◀────────┐
//!     │                     │    └──────────┘
//!     │ wire                │ wire
//!     └──────────▶ Wired ◀──┘        (frozen; add_range / wire are fatal)
//! ```
//!
//! The table is an owned context object threaded through boot
//! initialization on the boot processor. Its storage is an inline array, so it
//! works before any allocator exists. For designs that release other
//! processors before wiring, see [`SharedReservationTable`].
//!
//! ## Error Tiers
//!
//! Every `try_*` operation reports problems as [`ReservationError`]. The plain
//! operations ([`add_range`](ReservationTable::add_range),
//! [`wire`](ReservationTable::wire)) treat any such error as boot-fatal: an
//! inconsistent physical memory map cannot be recovered from.

mod shared;

pub use shared::SharedReservationTable;

use crate::Granularity;
use crate::range_search::search_top_down;
use kernel_info::memory::RESERVATION_TABLE_CAPACITY;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
use log::{debug, error, info, trace, warn};

/// Downstream consumer of wired reservations, i.e. the physical frame
/// allocator.
///
/// Each call hands over a range of whole frames that must be removed from the
/// free pool permanently. Ranges arrive in increasing address order and never
/// overlap each other.
pub trait ReservedFrameSink {
    fn reserve_frames(&mut self, frames: PhysicalRange);
}

/// Lifecycle state of a [`ReservationTable`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TableState {
    /// Nothing recorded yet.
    Empty,
    /// At least one range recorded, not yet wired.
    Populated,
    /// Committed to the frame allocator; the table is frozen.
    Wired,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    #[error("table full ({capacity} entries), cannot record {base:#x}+{length:#x}")]
    CapacityExceeded {
        capacity: usize,
        base: u64,
        length: u64,
    },
    #[error("zero-length reservation at {0:#x}")]
    ZeroLength(u64),
    #[error("reservation {base:#x}+{length:#x} overflows the physical address space")]
    Overflow { base: u64, length: u64 },
    #[error("table already wired")]
    AlreadyWired,
}

/// What [`ReservationTable::wire`] handed to the frame allocator.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WireSummary {
    /// Entries in the table, duplicates included.
    pub ranges_recorded: usize,
    /// Disjoint frame ranges reported after rounding and coalescing.
    pub ranges_reported: usize,
    /// Total bytes excluded from the free pool.
    pub bytes_reserved: u64,
}

/// Filler for unused slots; never observable through the API.
const VACANT: PhysicalRange = match PhysicalRange::new(PhysicalAddress::zero(), 1) {
    Some(r) => r,
    None => panic!("vacant slot must be a valid range"),
};

/// Fixed-capacity table of reserved physical ranges.
///
/// Entries are kept in insertion order. Overlapping and duplicated entries are
/// legal; every consumer treats the union of all recorded bytes as
/// unavailable.
pub struct ReservationTable<const N: usize = RESERVATION_TABLE_CAPACITY> {
    entries: [PhysicalRange; N],
    len: usize,
    state: TableState,
}

impl<const N: usize> Default for ReservationTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReservationTable<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [VACANT; N],
            len: 0,
            state: TableState::Empty,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TableState {
        self.state
    }

    #[must_use]
    pub const fn is_wired(&self) -> bool {
        matches!(self.state, TableState::Wired)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Recorded ranges in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[PhysicalRange] {
        &self.entries[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = PhysicalRange> + '_ {
        self.as_slice().iter().copied()
    }

    /// `true` if any recorded range covers `addr`.
    #[must_use]
    pub fn is_reserved(&self, addr: PhysicalAddress) -> bool {
        self.iter().any(|r| r.contains(addr))
    }

    /// `true` if any recorded range shares a byte with `range`.
    #[must_use]
    pub fn overlaps(&self, range: &PhysicalRange) -> bool {
        self.iter().any(|r| r.intersects(range))
    }

    /// Record `[base, base + length)` as reserved.
    ///
    /// # Panics
    /// Boot-fatal if the table is full, `length` is zero, the range overflows
    /// the address space, or the table is already wired.
    #[track_caller]
    pub fn add_range(&mut self, base: PhysicalAddress, length: u64) {
        if let Err(e) = self.try_add_range(base, length) {
            boot_fatal(&e);
        }
    }

    /// Fallible form of [`add_range`](Self::add_range).
    ///
    /// # Errors
    /// See [`ReservationError`]; the table is left unchanged on error.
    pub fn try_add_range(
        &mut self,
        base: PhysicalAddress,
        length: u64,
    ) -> Result<(), ReservationError> {
        if self.is_wired() {
            return Err(ReservationError::AlreadyWired);
        }
        if length == 0 {
            return Err(ReservationError::ZeroLength(base.as_u64()));
        }
        let overflow = ReservationError::Overflow {
            base: base.as_u64(),
            length,
        };
        let range = PhysicalRange::new(base, length).ok_or(overflow)?;
        // Wiring rounds out to whole frames; that must stay representable.
        range.expand_to::<Granularity>().ok_or(overflow)?;

        if self.len == N {
            return Err(ReservationError::CapacityExceeded {
                capacity: N,
                base: base.as_u64(),
                length,
            });
        }

        self.entries[self.len] = range;
        self.len += 1;
        self.state = TableState::Populated;
        trace!("reserved {range} ({}/{N})", self.len);
        Ok(())
    }

    /// Highest granularity-aligned placement of `allocation_length` bytes in
    /// `[candidate_base, candidate_base + candidate_length)` that intersects no
    /// recorded range.
    ///
    /// Returns `None` for a zero-length request, a request larger than the
    /// window, an empty or overflowing window, or a fully blocked window.
    /// Valid in every table state.
    #[must_use]
    pub fn range_search(
        &self,
        candidate_base: PhysicalAddress,
        candidate_length: u64,
        allocation_length: u64,
    ) -> Option<PhysicalRange> {
        let Some(window) = PhysicalRange::new(candidate_base, candidate_length) else {
            warn!(
                "range search: invalid window {candidate_base}+{candidate_length:#x}"
            );
            return None;
        };

        let found = search_top_down::<Granularity>(self.as_slice(), window, allocation_length);
        if found.is_none() {
            warn!(
                "range search: no room for {allocation_length:#x} bytes in {window} ({} reservations)",
                self.len
            );
        }
        found
    }

    /// Commit every recorded range to `sink` and freeze the table.
    ///
    /// # Panics
    /// Boot-fatal when called a second time.
    #[track_caller]
    pub fn wire<F: ReservedFrameSink + ?Sized>(&mut self, sink: &mut F) -> WireSummary {
        match self.try_wire(sink) {
            Ok(summary) => summary,
            Err(e) => boot_fatal(&e),
        }
    }

    /// Fallible form of [`wire`](Self::wire).
    ///
    /// Ranges are rounded out to whole frames, sorted by base and coalesced,
    /// so the sink sees every reserved frame exactly once, lowest first.
    ///
    /// # Errors
    /// [`ReservationError::AlreadyWired`] if the table was wired before; the
    /// sink is not called in that case.
    pub fn try_wire<F: ReservedFrameSink + ?Sized>(
        &mut self,
        sink: &mut F,
    ) -> Result<WireSummary, ReservationError> {
        if self.is_wired() {
            return Err(ReservationError::AlreadyWired);
        }
        self.state = TableState::Wired;

        let mut summary = WireSummary {
            ranges_recorded: self.len,
            ..WireSummary::default()
        };

        let mut sorted = self.entries;
        let sorted = &mut sorted[..self.len];
        sorted.sort_unstable();

        let mut pending: Option<PhysicalRange> = None;
        for frames in sorted.iter().filter_map(PhysicalRange::expand_to::<Granularity>) {
            if let Some(current) = pending {
                if let Some(merged) = current.merge(&frames) {
                    pending = Some(merged);
                    continue;
                }
                report(sink, current, &mut summary);
            }
            pending = Some(frames);
        }
        if let Some(last) = pending {
            report(sink, last, &mut summary);
        }

        info!(
            "wired {} reservations as {} frame ranges, {:#x} bytes excluded",
            summary.ranges_recorded, summary.ranges_reported, summary.bytes_reserved
        );
        Ok(summary)
    }
}

fn report<F: ReservedFrameSink + ?Sized>(
    sink: &mut F,
    frames: PhysicalRange,
    summary: &mut WireSummary,
) {
    debug!("wire: excluding {frames}");
    sink.reserve_frames(frames);
    summary.ranges_reported += 1;
    summary.bytes_reserved += frames.len();
}

#[cold]
#[track_caller]
pub(crate) fn boot_fatal(err: &ReservationError) -> ! {
    error!("boot memory map is inconsistent: {err}");
    panic!("reservation table: {err}");
}
