//! Caller-chosen integer type for slot indices.

use core::fmt;

mod sealed {
    pub trait Sealed {}
}

/// Unsigned integer type used to address slots and report availability.
///
/// The machine does its arithmetic in `usize` and converts at the API
/// boundary. Construction verifies that both the highest slot index and the
/// usable slot count fit the chosen type, so the internal conversions cannot
/// overflow afterwards.
///
/// Implemented for `u8`, `u16`, `u32`, `u64`, and `usize`; sealed against
/// outside implementations.
pub trait SlotIndex:
    sealed::Sealed + Copy + Eq + Ord + fmt::Debug + fmt::Display + Send + 'static
{
    /// Largest value representable in this index type.
    const MAX_SLOT: usize;

    /// Converts from the kernel's internal arithmetic.
    ///
    /// # Panics
    ///
    /// Panics if `value` exceeds [`Self::MAX_SLOT`]. Construction-time
    /// validation makes this unreachable for in-range slots and counters.
    fn from_usize(value: usize) -> Self;

    /// Widens to the kernel's internal arithmetic.
    fn to_usize(self) -> usize;
}

macro_rules! impl_slot_index {
    ($($int:ty),* $(,)?) => {$(
        impl sealed::Sealed for $int {}

        impl SlotIndex for $int {
            // `as` truncates, which on a 32-bit target caps u64 at the
            // addressable range; slices cannot be larger than that anyway.
            const MAX_SLOT: usize = <$int>::MAX as usize;

            #[inline]
            fn from_usize(value: usize) -> Self {
                assert!(
                    value <= Self::MAX_SLOT,
                    "value {value} does not fit the slot index type"
                );
                value as $int
            }

            #[inline]
            fn to_usize(self) -> usize {
                self as usize
            }
        }
    )*};
}

impl_slot_index!(u8, u16, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::SlotIndex;

    #[test]
    fn round_trips_within_range() {
        assert_eq!(u8::from_usize(255).to_usize(), 255);
        assert_eq!(u16::from_usize(65535).to_usize(), 65535);
        assert_eq!(u32::from_usize(7).to_usize(), 7);
        assert_eq!(usize::from_usize(0).to_usize(), 0);
    }

    #[test]
    #[should_panic(expected = "does not fit the slot index type")]
    fn narrow_type_rejects_wide_value() {
        let _ = u8::from_usize(256);
    }
}
