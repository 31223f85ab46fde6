//! Bitmap physical frame allocator.
//!
//! Tracks a fixed, contiguous region of 4 KiB frames with one bit per frame and
//! no heap. Wired reservations arrive through [`ReservedFrameSink`]; those
//! frames are marked used *and* pinned, so they can never be handed out or
//! freed afterwards.

use crate::reservation::ReservedFrameSink;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, PhysicalRange, Size4K};
use log::{trace, warn};

/// Bitmap words needed to cover 512 MiB of 4 KiB frames.
pub const DEFAULT_BITMAP_WORDS: usize = ((512 * 1024 * 1024_usize) >> Size4K::SHIFT) / 64;

/// Physical frame allocation as seen by the rest of the kernel.
pub trait PhysFrameAlloc {
    /// Allocate one 4 KiB frame; `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    ///
    /// # Errors
    /// See [`FrameAllocError`].
    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) -> Result<(), FrameAllocError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("frame {0:#x} is outside the managed region")]
    OutOfRange(u64),
    #[error("frame {0:#x} is reserved and can never be freed")]
    Reserved(u64),
    #[error("frame {0:#x} is not allocated")]
    NotAllocated(u64),
}

/// Frame allocator over `[base, base + WORDS * 64 * 4 KiB)`.
pub struct BitmapFrameAlloc<const WORDS: usize = DEFAULT_BITMAP_WORDS> {
    region: PhysicalRange,
    /// 1 = in use (allocated or reserved).
    used: [u64; WORDS],
    /// 1 = pinned by a wired reservation.
    pinned: [u64; WORDS],
    free: usize,
    /// Word index where the next search starts.
    hint: usize,
}

impl<const WORDS: usize> BitmapFrameAlloc<WORDS> {
    pub const FRAMES: usize = WORDS * 64;

    /// All frames of the region start out free. `base` is aligned down to a
    /// frame boundary.
    ///
    /// # Panics
    /// If the region would run past the end of the physical address space;
    /// see [`try_new`](Self::try_new).
    #[must_use]
    #[track_caller]
    pub const fn new(base: PhysicalAddress) -> Self {
        match Self::try_new(base) {
            Some(alloc) => alloc,
            None => panic!("frame alloc: region does not fit below the top of memory"),
        }
    }

    /// Like [`new`](Self::new), but `None` if `WORDS * 64` frames starting at
    /// `base` do not fit into the physical address space.
    #[must_use]
    pub const fn try_new(base: PhysicalAddress) -> Option<Self> {
        let Some(len) = (WORDS as u64).checked_mul(64 * Size4K::SIZE) else {
            return None;
        };
        let Some(region) = PhysicalRange::new(base.align_down::<Size4K>(), len) else {
            return None;
        };
        Some(Self {
            region,
            used: [0; WORDS],
            pinned: [0; WORDS],
            free: Self::FRAMES,
            hint: 0,
        })
    }

    /// The managed physical region.
    #[must_use]
    pub const fn region(&self) -> PhysicalRange {
        self.region
    }

    #[must_use]
    pub const fn free_frames(&self) -> usize {
        self.free
    }

    #[must_use]
    pub const fn total_frames(&self) -> usize {
        Self::FRAMES
    }

    #[must_use]
    pub fn is_reserved(&self, frame: PhysicalPage<Size4K>) -> bool {
        self.index_of(frame)
            .is_some_and(|i| bit(&self.pinned, i))
    }

    #[must_use]
    pub fn is_allocated(&self, frame: PhysicalPage<Size4K>) -> bool {
        self.index_of(frame)
            .is_some_and(|i| bit(&self.used, i) && !bit(&self.pinned, i))
    }

    fn index_of(&self, frame: PhysicalPage<Size4K>) -> Option<usize> {
        let offset = frame.base().as_u64().checked_sub(self.region.base().as_u64())?;
        let index = usize::try_from(offset / Size4K::SIZE).ok()?;
        (index < Self::FRAMES).then_some(index)
    }

    fn frame_at(&self, index: usize) -> PhysicalPage<Size4K> {
        (self.region.base() + index as u64 * Size4K::SIZE).page()
    }
}

impl<const WORDS: usize> ReservedFrameSink for BitmapFrameAlloc<WORDS> {
    fn reserve_frames(&mut self, frames: PhysicalRange) {
        let region = self.region;
        if !region.intersects(&frames) {
            trace!("frame alloc: {frames} lies outside {region}");
            return;
        }

        let start = frames.base().as_u64().max(region.base().as_u64());
        let end = frames.end().min(region.end());
        let Some(clipped) = PhysicalRange::from_bounds(start, end) else {
            return;
        };

        for frame in clipped.frames::<Size4K>() {
            let Some(i) = self.index_of(frame) else {
                continue;
            };
            // Reporting the same frame twice must not disturb accounting.
            if !bit(&self.used, i) {
                self.free -= 1;
            } else if !bit(&self.pinned, i) {
                warn!("frame alloc: reserving {frame} which was already handed out");
            }
            set_bit(&mut self.used, i);
            set_bit(&mut self.pinned, i);
        }
    }
}

impl<const WORDS: usize> PhysFrameAlloc for BitmapFrameAlloc<WORDS> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        if self.free == 0 {
            return None;
        }

        for step in 0..WORDS {
            let w = (self.hint + step) % WORDS;
            let word = self.used[w];
            if word == u64::MAX {
                continue;
            }
            let index = w * 64 + word.trailing_ones() as usize;
            set_bit(&mut self.used, index);
            self.free -= 1;
            self.hint = w;
            return Some(self.frame_at(index));
        }
        None
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) -> Result<(), FrameAllocError> {
        let addr = frame.base().as_u64();
        let i = self.index_of(frame).ok_or(FrameAllocError::OutOfRange(addr))?;
        if bit(&self.pinned, i) {
            return Err(FrameAllocError::Reserved(addr));
        }
        if !bit(&self.used, i) {
            return Err(FrameAllocError::NotAllocated(addr));
        }
        clear_bit(&mut self.used, i);
        self.free += 1;
        self.hint = self.hint.min(i / 64);
        Ok(())
    }
}

#[inline]
fn bit(words: &[u64], i: usize) -> bool {
    words[i / 64] & (1 << (i % 64)) != 0
}

#[inline]
fn set_bit(words: &mut [u64], i: usize) {
    words[i / 64] |= 1 << (i % 64);
}

#[inline]
fn clear_bit(words: &mut [u64], i: usize) {
    words[i / 64] &= !(1 << (i % 64));
}
