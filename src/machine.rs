//! Public surface: constructor, validation, and the concurrency façades.
//!
//! One kernel, three disciplines. The façade is selected at construction and
//! hidden behind a single [`SlotMachine`] type whose operations all take
//! `&self`:
//!
//! - [`ConcurrencyMode::None`]: the kernel is entered without queuing or
//!   blocking. Exclusive access is the caller's contract; concurrent entry
//!   is a bug and panics instead of corrupting the index.
//! - [`ConcurrencyMode::Mutex`]: every operation, including a whole batch,
//!   runs under one lock acquisition.
//! - [`ConcurrencyMode::Serialized`]: operations become transactions handled
//!   one at a time by a dedicated worker thread.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::error::{BatchError, Error};
use crate::kernel::Kernel;
use crate::serialized::SerializedMachine;
use crate::slot_index::SlotIndex;

/// Inclusive range of usable slots within the backing slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundaries {
    pub lower: usize,
    pub upper: usize,
}

/// Concurrency discipline wrapped around the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// No protection: the caller guarantees exclusive access.
    None,
    /// A process-wide mutex per machine, held for the whole operation.
    Mutex,
    /// Operations serialized through a dedicated worker thread.
    Serialized,
}

enum Inner<'a, Idx: SlotIndex, V: Clone> {
    /// Entered with `try_lock`: never blocks, panics on concurrent entry.
    Sequential(Mutex<Kernel<'a, Idx, V>>),
    /// Entered with a blocking lock.
    Mutexed(Mutex<Kernel<'a, Idx, V>>),
    /// Kernel owned by a worker thread.
    Serialized(SerializedMachine<'a, Idx, V>),
}

/// Slot allocator over a caller-owned slice, indexed by a hierarchical
/// bitmap.
///
/// `Idx` is the caller-chosen unsigned index type; `V` is the payload, of
/// which one distinguished `empty` value marks unoccupied cells. The machine
/// borrows the slice for its whole lifetime; drop the machine to inspect the
/// slice again.
pub struct SlotMachine<'a, Idx: SlotIndex, V: Clone> {
    inner: Inner<'a, Idx, V>,
}

impl<'a, Idx: SlotIndex, V: Clone> SlotMachine<'a, Idx, V> {
    /// Builds a machine for `mode`.
    ///
    /// Selecting the façade at runtime means this constructor carries the
    /// union of the façades' payload bounds. When the payload never crosses
    /// a thread (`V` is not `Send` or not `'static`), construct the façade
    /// directly with [`SlotMachine::sequential`] or [`SlotMachine::mutexed`],
    /// which only require `V: Clone`.
    ///
    /// `bucket_size` must be a power of two in `2..=64` and `storage.len()`
    /// a power of two; violations are reported as
    /// [`Error::InvalidBucketSize`] and [`Error::InvalidSliceSize`]. Omitted
    /// `boundaries` default to the whole slice.
    ///
    /// # Panics
    ///
    /// Panics if the boundaries do not satisfy `lower <= upper < len`, or if
    /// `Idx` cannot represent the highest slot index and the usable slot
    /// count. Both are programmer errors, not data-dependent conditions.
    pub fn new(
        mode: ConcurrencyMode,
        storage: &'a mut [V],
        empty: V,
        bucket_size: u8,
        boundaries: Option<Boundaries>,
    ) -> Result<Self, Error>
    where
        V: Send + 'static,
    {
        match mode {
            ConcurrencyMode::None => Self::sequential(storage, empty, bucket_size, boundaries),
            ConcurrencyMode::Mutex => Self::mutexed(storage, empty, bucket_size, boundaries),
            ConcurrencyMode::Serialized => {
                Self::serialized(storage, empty, bucket_size, boundaries)
            }
        }
    }

    /// Builds the sequential façade: no queuing, no blocking, exclusive
    /// access is the caller's contract.
    ///
    /// Validation and panics as for [`SlotMachine::new`].
    pub fn sequential(
        storage: &'a mut [V],
        empty: V,
        bucket_size: u8,
        boundaries: Option<Boundaries>,
    ) -> Result<Self, Error> {
        let boundaries = validate_geometry::<Idx>(storage.len(), bucket_size, boundaries)?;
        log::debug!(
            "SlotMachine::sequential: slots={}, bucket_size={bucket_size}",
            storage.len()
        );

        let kernel = Kernel::new(storage, empty, bucket_size, boundaries);
        Ok(Self {
            inner: Inner::Sequential(Mutex::new(kernel)),
        })
    }

    /// Builds the mutex façade: every operation runs under one lock
    /// acquisition.
    ///
    /// Validation and panics as for [`SlotMachine::new`].
    pub fn mutexed(
        storage: &'a mut [V],
        empty: V,
        bucket_size: u8,
        boundaries: Option<Boundaries>,
    ) -> Result<Self, Error> {
        let boundaries = validate_geometry::<Idx>(storage.len(), bucket_size, boundaries)?;
        log::debug!(
            "SlotMachine::mutexed: slots={}, bucket_size={bucket_size}",
            storage.len()
        );

        let kernel = Kernel::new(storage, empty, bucket_size, boundaries);
        Ok(Self {
            inner: Inner::Mutexed(Mutex::new(kernel)),
        })
    }

    /// Builds the serialized façade: a worker thread owns a copy of the
    /// payloads and executes transactions one at a time; the caller's slice
    /// receives the final payloads back when the machine is dropped.
    ///
    /// The payload crosses into the worker, hence `V: Send + 'static` here
    /// and nowhere else.
    ///
    /// Validation and panics as for [`SlotMachine::new`].
    pub fn serialized(
        storage: &'a mut [V],
        empty: V,
        bucket_size: u8,
        boundaries: Option<Boundaries>,
    ) -> Result<Self, Error>
    where
        V: Send + 'static,
    {
        let boundaries = validate_geometry::<Idx>(storage.len(), bucket_size, boundaries)?;
        log::debug!(
            "SlotMachine::serialized: slots={}, bucket_size={bucket_size}",
            storage.len()
        );

        Ok(Self {
            inner: Inner::Serialized(SerializedMachine::spawn(
                storage,
                empty,
                bucket_size,
                boundaries,
            )),
        })
    }

    /// Writes `value` at `index` and marks the slot occupied.
    ///
    /// Returns the updated available counter. Re-setting an occupied slot
    /// overwrites the payload and leaves the counter alone.
    pub fn set(&self, index: Idx, value: V) -> Result<Idx, Error> {
        match &self.inner {
            Inner::Sequential(kernel) => sequential_entry(kernel).set(index, value),
            Inner::Mutexed(kernel) => exclusive_entry(kernel).set(index, value),
            Inner::Serialized(worker) => worker.set(index, value),
        }
    }

    /// Writes the empty sentinel at `index` and marks the slot free.
    ///
    /// Returns the updated available counter.
    pub fn unset(&self, index: Idx) -> Result<Idx, Error> {
        match &self.inner {
            Inner::Sequential(kernel) => sequential_entry(kernel).unset(index),
            Inner::Mutexed(kernel) => exclusive_entry(kernel).unset(index),
            Inner::Serialized(worker) => worker.unset(index),
        }
    }

    /// Books the leftmost free slot and writes `value` there.
    ///
    /// Returns the booked slot and the updated available counter.
    pub fn book_and_set(&self, value: V) -> Result<(Idx, Idx), Error> {
        match &self.inner {
            Inner::Sequential(kernel) => sequential_entry(kernel).book_and_set(value),
            Inner::Mutexed(kernel) => exclusive_entry(kernel).book_and_set(value),
            Inner::Serialized(worker) => worker.book_and_set(value),
        }
    }

    /// Books `count` slots, cloning `value` into each.
    ///
    /// Under [`ConcurrencyMode::Mutex`] the whole batch runs under a single
    /// lock acquisition, so the booked slots are consecutive free slots with
    /// no interleaving. Under [`ConcurrencyMode::Serialized`] each booking
    /// is its own transaction and other callers may interleave.
    pub fn book_and_set_batch(
        &self,
        count: Idx,
        value: V,
    ) -> Result<(Vec<Idx>, Idx), BatchError<Idx>> {
        match &self.inner {
            Inner::Sequential(kernel) => {
                sequential_entry(kernel).book_and_set_batch(count, value)
            }
            Inner::Mutexed(kernel) => exclusive_entry(kernel).book_and_set_batch(count, value),
            Inner::Serialized(worker) => {
                let count = count.to_usize();
                let mut booked = Vec::with_capacity(count);
                for _ in 0..count {
                    match worker.book_and_set(value.clone()) {
                        Ok((slot, _)) => booked.push(slot),
                        Err(error) => {
                            return Err(BatchError {
                                booked,
                                available: worker.available(),
                                error,
                            });
                        }
                    }
                }
                Ok((booked, worker.available()))
            }
        }
    }

    /// Current count of unoccupied slots within the usable range.
    pub fn available(&self) -> Idx {
        match &self.inner {
            Inner::Sequential(kernel) => sequential_entry(kernel).available(),
            Inner::Mutexed(kernel) => exclusive_entry(kernel).available(),
            Inner::Serialized(worker) => worker.available(),
        }
    }

    /// Renders the slice and level geometry as human-readable text.
    pub fn dump_layout(&self) -> String {
        match &self.inner {
            Inner::Sequential(kernel) => sequential_entry(kernel).dump_layout(),
            Inner::Mutexed(kernel) => exclusive_entry(kernel).dump_layout(),
            Inner::Serialized(worker) => worker.dump_layout(),
        }
    }
}

/// Validates the requested geometry and resolves the effective boundaries.
///
/// # Panics
///
/// Panics on inverted or out-of-slice boundaries and on an index type too
/// narrow for the slice or the usable count; see [`SlotMachine::new`].
fn validate_geometry<Idx: SlotIndex>(
    width: usize,
    bucket_size: u8,
    boundaries: Option<Boundaries>,
) -> Result<Boundaries, Error> {
    if !bucket_size.is_power_of_two()
        || bucket_size < 2
        || u32::from(bucket_size) > crate::levels::Word::BITS
    {
        return Err(Error::InvalidBucketSize);
    }

    if !width.is_power_of_two() {
        return Err(Error::InvalidSliceSize {
            suggested: width.next_power_of_two(),
        });
    }

    let boundaries = boundaries.unwrap_or(Boundaries {
        lower: 0,
        upper: width - 1,
    });
    assert!(boundaries.lower <= boundaries.upper, "inverted boundaries");
    assert!(boundaries.upper < width, "upper boundary beyond the slice");
    assert!(
        width - 1 <= Idx::MAX_SLOT,
        "index type too narrow for the slice"
    );
    assert!(
        boundaries.upper - boundaries.lower + 1 <= Idx::MAX_SLOT,
        "index type too narrow for the usable slot count"
    );

    Ok(boundaries)
}

/// Non-blocking kernel entry for the sequential façade.
fn sequential_entry<'k, 'a, Idx: SlotIndex, V: Clone>(
    kernel: &'k Mutex<Kernel<'a, Idx, V>>,
) -> MutexGuard<'k, Kernel<'a, Idx, V>> {
    match kernel.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => {
            panic!("sequential slot machine entered concurrently")
        }
    }
}

/// Blocking kernel entry for the mutex façade.
fn exclusive_entry<'k, 'a, Idx: SlotIndex, V: Clone>(
    kernel: &'k Mutex<Kernel<'a, Idx, V>>,
) -> MutexGuard<'k, Kernel<'a, Idx, V>> {
    kernel.lock().unwrap_or_else(PoisonError::into_inner)
}
