//! Reservation table for boots that start secondary processors before wiring.

use super::{ReservationError, ReservationTable, ReservedFrameSink, WireSummary, boot_fatal};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel_info::memory::RESERVATION_TABLE_CAPACITY;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRange};
use spin::Mutex;

/// A [`ReservationTable`] behind a spinlock, with an atomic one-shot flag
/// guarding [`wire`](Self::wire).
///
/// Exactly one caller wins the flag; every other `wire` (concurrent or later)
/// is boot-fatal and never reaches the frame allocator. Usable as a `static`.
pub struct SharedReservationTable<const N: usize = RESERVATION_TABLE_CAPACITY> {
    table: Mutex<ReservationTable<N>>,
    wired: AtomicBool,
}

impl<const N: usize> Default for SharedReservationTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SharedReservationTable<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: Mutex::new(ReservationTable::new()),
            wired: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_wired(&self) -> bool {
        self.wired.load(Ordering::Acquire)
    }

    /// # Panics
    /// Boot-fatal under the same conditions as [`ReservationTable::add_range`].
    #[track_caller]
    pub fn add_range(&self, base: PhysicalAddress, length: u64) {
        if let Err(e) = self.try_add_range(base, length) {
            boot_fatal(&e);
        }
    }

    /// # Errors
    /// See [`ReservationTable::try_add_range`].
    pub fn try_add_range(&self, base: PhysicalAddress, length: u64) -> Result<(), ReservationError> {
        if self.is_wired() {
            return Err(ReservationError::AlreadyWired);
        }
        // The table re-checks its own state under the lock, which closes the
        // window between the flag load and a concurrent wire.
        self.table.lock().try_add_range(base, length)
    }

    #[must_use]
    pub fn range_search(
        &self,
        candidate_base: PhysicalAddress,
        candidate_length: u64,
        allocation_length: u64,
    ) -> Option<PhysicalRange> {
        self.table
            .lock()
            .range_search(candidate_base, candidate_length, allocation_length)
    }

    /// # Panics
    /// Boot-fatal for every call after the first.
    #[track_caller]
    pub fn wire<F: ReservedFrameSink + ?Sized>(&self, sink: &mut F) -> WireSummary {
        match self.try_wire(sink) {
            Ok(summary) => summary,
            Err(e) => boot_fatal(&e),
        }
    }

    /// # Errors
    /// [`ReservationError::AlreadyWired`] for every call after the first.
    pub fn try_wire<F: ReservedFrameSink + ?Sized>(
        &self,
        sink: &mut F,
    ) -> Result<WireSummary, ReservationError> {
        if self
            .wired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReservationError::AlreadyWired);
        }
        self.table.lock().try_wire(sink)
    }

    /// Run `f` with the table locked, e.g. to dump it for diagnostics.
    pub fn with_table<R>(&self, f: impl FnOnce(&ReservationTable<N>) -> R) -> R {
        f(&*self.table.lock())
    }
}
