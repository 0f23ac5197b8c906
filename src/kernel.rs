//! Single-threaded core shared by every façade.
//!
//! The kernel owns the borrowed backing slice, the hierarchical index, and
//! the availability counter, and keeps the three in lockstep. It assumes no
//! concurrent access; the façades in [`machine`](crate::machine) provide
//! that guarantee.

use core::marker::PhantomData;

use crate::error::{BatchError, Error};
use crate::levels::BucketLevels;
use crate::machine::Boundaries;
use crate::slot_index::SlotIndex;

pub(crate) struct Kernel<'a, Idx: SlotIndex, V: Clone> {
    slots: &'a mut [V],
    empty: V,
    boundaries: Boundaries,
    levels: BucketLevels,
    /// Unoccupied slots within the usable range.
    available: usize,
    index_type: PhantomData<Idx>,
}

impl<'a, Idx: SlotIndex, V: Clone> Kernel<'a, Idx, V> {
    /// Builds a kernel over validated inputs.
    ///
    /// The constructor in [`machine`](crate::machine) has already rejected
    /// bad geometry; everything here is an internal invariant.
    pub(crate) fn new(
        slots: &'a mut [V],
        empty: V,
        bucket_size: u8,
        boundaries: Boundaries,
    ) -> Self {
        assert!(boundaries.lower <= boundaries.upper);
        assert!(boundaries.upper < slots.len());

        let levels = BucketLevels::new(slots.len(), bucket_size);
        let available = boundaries.upper - boundaries.lower + 1;
        assert!(available <= Idx::MAX_SLOT);

        Self {
            slots,
            empty,
            boundaries,
            levels,
            available,
            index_type: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn available(&self) -> Idx {
        Idx::from_usize(self.available)
    }

    fn check_boundaries(&self, slot: usize) -> Result<(), Error> {
        if slot < self.boundaries.lower || slot > self.boundaries.upper {
            return Err(Error::OutOfBounds { index: slot });
        }
        Ok(())
    }

    /// Writes `value` at `index` and marks the slot occupied.
    ///
    /// Re-setting an occupied slot overwrites the payload without touching
    /// the index or the counter: the bitmap already tells the truth.
    pub(crate) fn set(&mut self, index: Idx, value: V) -> Result<Idx, Error> {
        let slot = index.to_usize();
        self.check_boundaries(slot)?;

        self.slots[slot] = value;
        if self.levels.occupy(slot) {
            self.available -= 1;
        }

        Ok(self.available())
    }

    /// Writes the empty sentinel at `index` and marks the slot free.
    ///
    /// Unsetting a free slot is a no-op apart from rewriting the sentinel.
    pub(crate) fn unset(&mut self, index: Idx) -> Result<Idx, Error> {
        let slot = index.to_usize();
        self.check_boundaries(slot)?;

        self.slots[slot] = self.empty.clone();
        if self.levels.vacate(slot) {
            self.available += 1;
        }

        Ok(self.available())
    }

    /// Books the leftmost free slot, writes `value` there, and returns it.
    pub(crate) fn book_and_set(&mut self, value: V) -> Result<(Idx, Idx), Error> {
        let slot = self.levels.first_free().ok_or(Error::NoAvailableSlot)?;
        let index = Idx::from_usize(slot);

        // The free bit can fall outside the usable range when the boundaries
        // do not cover the whole slice; the bounds error becomes the cause.
        match self.set(index, value) {
            Ok(available) => Ok((index, available)),
            Err(cause) => Err(Error::NoUsableSlot {
                cause: Some(Box::new(cause)),
            }),
        }
    }

    /// Books `count` slots one at a time.
    ///
    /// On failure the successfully booked prefix stays occupied and is
    /// returned inside the error.
    pub(crate) fn book_and_set_batch(
        &mut self,
        count: Idx,
        value: V,
    ) -> Result<(Vec<Idx>, Idx), BatchError<Idx>> {
        let count = count.to_usize();
        let mut booked = Vec::with_capacity(count);

        for _ in 0..count {
            match self.book_and_set(value.clone()) {
                Ok((slot, _)) => booked.push(slot),
                Err(error) => {
                    return Err(BatchError {
                        booked,
                        available: self.available(),
                        error,
                    });
                }
            }
        }

        Ok((booked, self.available()))
    }

    /// Renders the slice and level geometry as human-readable text.
    pub(crate) fn dump_layout(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "Slice size: {} (Usable slots: {} - {})",
            self.slots.len(),
            self.boundaries.lower,
            self.boundaries.upper
        );
        let _ = writeln!(out, "Bucket size: {}", self.levels.bucket_size());
        for index in (0..self.levels.depth()).rev() {
            let _ = writeln!(out, "Buckets per level: {}", self.levels.word_count(index));
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn levels(&self) -> &BucketLevels {
        &self.levels
    }

    #[cfg(test)]
    pub(crate) fn slot(&self, slot: usize) -> &V {
        &self.slots[slot]
    }
}

#[cfg(test)]
mod tests {
    use super::Kernel;
    use crate::error::Error;
    use crate::machine::Boundaries;

    fn kernel<'a>(slots: &'a mut [u32], boundaries: Boundaries) -> Kernel<'a, u16, u32> {
        Kernel::new(slots, 0, 4, boundaries)
    }

    #[test]
    fn set_and_unset_keep_the_counter_in_lockstep() {
        let mut slots = vec![0u32; 64];
        let mut kernel = kernel(&mut slots, Boundaries { lower: 0, upper: 63 });

        assert_eq!(kernel.set(10, 99), Ok(63));
        assert_eq!(*kernel.slot(10), 99);

        // Double set rewrites the payload only.
        assert_eq!(kernel.set(10, 7), Ok(63));
        assert_eq!(*kernel.slot(10), 7);

        assert_eq!(kernel.unset(10), Ok(64));
        assert_eq!(*kernel.slot(10), 0);

        // Double unset is a no-op.
        assert_eq!(kernel.unset(10), Ok(64));
    }

    #[test]
    fn operations_reject_slots_outside_the_boundaries() {
        let mut slots = vec![0u32; 64];
        let mut kernel = kernel(&mut slots, Boundaries { lower: 8, upper: 15 });

        assert_eq!(kernel.set(7, 1), Err(Error::OutOfBounds { index: 7 }));
        assert_eq!(kernel.unset(16), Err(Error::OutOfBounds { index: 16 }));
        assert_eq!(kernel.available(), 8);
    }

    #[test]
    fn booking_walks_leftmost_and_reports_fullness() {
        let mut slots = vec![0u32; 16];
        let mut kernel = kernel(&mut slots, Boundaries { lower: 0, upper: 15 });

        for expected in 0..16u16 {
            let (slot, _) = kernel.book_and_set(1).unwrap();
            assert_eq!(slot, expected);
        }
        assert_eq!(kernel.book_and_set(1), Err(Error::NoAvailableSlot));

        kernel.unset(5).unwrap();
        assert_eq!(kernel.book_and_set(2), Ok((5, 0)));
    }

    #[test]
    fn booking_beyond_the_upper_boundary_is_unusable() {
        let mut slots = vec![0u32; 16];
        let mut kernel = kernel(&mut slots, Boundaries { lower: 0, upper: 13 });

        for _ in 0..14 {
            kernel.book_and_set(1).unwrap();
        }

        // Slots 14 and 15 are free but unusable.
        let error = kernel.book_and_set(1).unwrap_err();
        assert_eq!(
            error,
            Error::NoUsableSlot {
                cause: Some(Box::new(Error::OutOfBounds { index: 14 })),
            }
        );
        assert_eq!(
            error.to_string(),
            "SlotMachine: No usable slot: slot index 14 is out of bounds"
        );
    }

    #[test]
    fn failed_batch_returns_the_booked_prefix() {
        let mut slots = vec![0u32; 8];
        let mut kernel = kernel(&mut slots, Boundaries { lower: 0, upper: 7 });

        for _ in 0..6 {
            kernel.book_and_set(1).unwrap();
        }

        let error = kernel.book_and_set_batch(4, 2).unwrap_err();
        assert_eq!(error.booked, vec![6, 7]);
        assert_eq!(error.available, 0);
        assert_eq!(error.error, Error::NoAvailableSlot);

        // The prefix stays occupied.
        assert!(kernel.levels().is_occupied(6));
        assert!(kernel.levels().is_occupied(7));
    }

    #[test]
    fn layout_dump_lists_levels_leaf_first() {
        let mut slots = vec![0u32; 64];
        let kernel = kernel(&mut slots, Boundaries { lower: 0, upper: 63 });

        let dump = kernel.dump_layout();
        assert_eq!(
            dump,
            "Slice size: 64 (Usable slots: 0 - 63)\n\
             Bucket size: 4\n\
             Buckets per level: 16\n\
             Buckets per level: 4\n\
             Buckets per level: 1\n"
        );
    }
}
