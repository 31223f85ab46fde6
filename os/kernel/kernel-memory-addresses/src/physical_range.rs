use crate::{PageSize, PhysicalAddress, PhysicalPage};
use core::fmt;
use core::marker::PhantomData;

/// A non-empty, half-open range of physical bytes `[base, base + len)`.
///
/// ### Invariants
/// - `len > 0`.
/// - `base + len` does not overflow `u64`, so [`end`](Self::end) is always
///   representable.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let r = PhysicalRange::new(PhysicalAddress::new(0x1000), 0x2000).unwrap();
/// assert_eq!(r.end(), 0x3000);
/// assert!(r.contains(PhysicalAddress::new(0x2FFF)));
/// assert!(!r.contains(PhysicalAddress::new(0x3000)));
/// assert!(PhysicalRange::new(PhysicalAddress::new(0x1000), 0).is_none());
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalRange {
    base: PhysicalAddress,
    len: u64,
}

impl PhysicalRange {
    /// Returns `None` for an empty range or one whose end overflows.
    #[inline]
    #[must_use]
    pub const fn new(base: PhysicalAddress, len: u64) -> Option<Self> {
        if len == 0 || base.as_u64().checked_add(len).is_none() {
            return None;
        }
        Some(Self { base, len })
    }

    /// Builds the range `[start, end)`; `None` if `end <= start`.
    #[inline]
    #[must_use]
    pub const fn from_bounds(start: u64, end: u64) -> Option<Self> {
        if end <= start {
            return None;
        }
        Self::new(PhysicalAddress::new(start), end - start)
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Exclusive end address.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.as_u64() + self.len
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: PhysicalAddress) -> bool {
        addr.as_u64() >= self.base.as_u64() && addr.as_u64() < self.end()
    }

    /// `true` if the two ranges share at least one byte.
    #[inline]
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.base.as_u64() < other.end() && other.base.as_u64() < self.end()
    }

    /// `true` if `other` overlaps or directly follows/precedes `self`.
    #[inline]
    #[must_use]
    pub const fn touches(&self, other: &Self) -> bool {
        self.base.as_u64() <= other.end() && other.base.as_u64() <= self.end()
    }

    /// Union of two touching ranges, or `None` if there is a gap between them.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Option<Self> {
        if !self.touches(other) {
            return None;
        }
        let start = self.base.as_u64().min(other.base.as_u64());
        let end = self.end().max(other.end());
        Self::from_bounds(start, end)
    }

    /// Smallest range of whole `S` frames covering `self`.
    ///
    /// Returns `None` if rounding the end up overflows the address space.
    #[must_use]
    pub fn expand_to<S: PageSize>(&self) -> Option<Self> {
        let start = S::align_down(self.base.as_u64());
        let end = S::checked_align_up(self.end())?;
        Self::from_bounds(start, end)
    }

    /// The frames of size `S` touched by this range, lowest first.
    #[must_use]
    pub const fn frames<S: PageSize>(&self) -> Frames<S> {
        let first = self.base.page::<S>().number();
        let last = PhysicalAddress::new(self.end() - 1).page::<S>().number();
        Frames {
            next: first,
            last,
            done: false,
            _phantom: PhantomData,
        }
    }
}

impl fmt::Debug for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalRange[0x{:016X}..0x{:016X})", self.base.as_u64(), self.end())
    }
}

impl fmt::Display for PhysicalRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}..{:#x})", self.base.as_u64(), self.end())
    }
}

/// Iterator returned by [`PhysicalRange::frames`].
pub struct Frames<S: PageSize> {
    next: u64,
    last: u64,
    done: bool,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> Iterator for Frames<S> {
    type Item = PhysicalPage<S>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let frame = PhysicalPage::from_number(self.next);
        if self.next == self.last {
            self.done = true;
        } else {
            self.next += 1;
        }
        Some(frame)
    }
}
