//! Slot allocator over a caller-owned, fixed-capacity slice.
//!
//! A hierarchical bitmap index answers *where is a free slot?* and *is this
//! region full?* in O(log N): leaf bits mark per-slot occupancy, interior
//! bits mark per-child fullness, and the root is a single word. One
//! single-threaded kernel does all the work; three interchangeable
//! concurrency façades (sequential, mutex-guarded, serialized through a
//! worker thread) wrap it behind one operation surface.
//!
//! ```
//! use slotmachine::{ConcurrencyMode, SlotMachine};
//!
//! let mut storage = vec![0u32; 1024];
//! let machine =
//!     SlotMachine::<u16, u32>::new(ConcurrencyMode::None, &mut storage, 0, 8, None).unwrap();
//!
//! let (slot, available) = machine.book_and_set(42).unwrap();
//! assert_eq!(slot, 0);
//! assert_eq!(available, 1023);
//!
//! machine.unset(slot).unwrap();
//! ```

pub mod error;
mod kernel;
pub mod levels;
pub mod machine;
mod serialized;
pub mod slot_index;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{BatchError, Error};
pub use levels::{BucketLevels, Word};
pub use machine::{Boundaries, ConcurrencyMode, SlotMachine};
pub use slot_index::SlotIndex;
