use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page (and frame) sizes.
///
/// Besides the raw constants, the trait carries the alignment arithmetic that
/// every allocator in the kernel needs, so callers never hand-roll the masks.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Display + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;

    fn as_str() -> &'static str;

    /// Round `x` down to a multiple of [`SIZE`](Self::SIZE).
    #[inline]
    #[must_use]
    fn align_down(x: u64) -> u64 {
        x & !(Self::SIZE - 1)
    }

    /// Round `x` up to a multiple of [`SIZE`](Self::SIZE).
    ///
    /// Returns `None` if the rounded value does not fit in 64 bits.
    #[inline]
    #[must_use]
    fn checked_align_up(x: u64) -> Option<u64> {
        x.checked_add(Self::SIZE - 1).map(Self::align_down)
    }

    #[inline]
    #[must_use]
    fn is_aligned(x: u64) -> bool {
        x & (Self::SIZE - 1) == 0
    }
}

macro_rules! page_size {
    ($(#[$meta:meta])* $name:ident, $shift:literal, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name;

        impl sealed::Sealed for $name {}

        impl PageSize for $name {
            const SIZE: u64 = 1 << $shift;
            const SHIFT: u32 = $shift;

            fn as_str() -> &'static str {
                $label
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(Self::as_str())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self, f)
            }
        }
    };
}

page_size!(
    /// 4 KiB page (4096 bytes), the allocation granularity.
    Size4K,
    12,
    "4K"
);

page_size!(
    /// 2 MiB page (`2_097_152` bytes).
    Size2M,
    21,
    "2M"
);

page_size!(
    /// 1 GiB page (`1_073_741_824` bytes).
    Size1G,
    30,
    "1G"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_shifts() {
        assert_eq!(Size4K::SIZE, 4096);
        assert_eq!(Size2M::SIZE, 2 * 1024 * 1024);
        assert_eq!(Size1G::SIZE, 1024 * 1024 * 1024);
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(Size4K::align_down(0x12345), 0x12000);
        assert_eq!(Size4K::checked_align_up(0x12345), Some(0x13000));
        assert_eq!(Size4K::checked_align_up(0x13000), Some(0x13000));
        assert_eq!(Size4K::checked_align_up(u64::MAX), None);
        assert!(Size2M::is_aligned(0x40_0000));
        assert!(!Size2M::is_aligned(0x40_1000));
    }
}
