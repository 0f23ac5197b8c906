//! Error taxonomy for construction and slot operations.
//!
//! Construction failures report what was wrong with the requested geometry.
//! Operational failures carry the slot index (or the underlying cause) so
//! callers can log them verbatim; the rendered strings are stable and tests
//! may match on the `"SlotMachine: No "` prefix.

use core::fmt;

/// Errors returned by [`SlotMachine::new`](crate::SlotMachine::new) and the
/// slot operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The bucket width is not a power of two within the index word.
    InvalidBucketSize,

    /// The backing slice length is not a power of two.
    ///
    /// `suggested` is the next power of two; resize to it and constrain the
    /// usable range with an upper boundary instead.
    InvalidSliceSize { suggested: usize },

    /// The slot index lies outside the usable `[lower, upper]` range.
    OutOfBounds { index: usize },

    /// Every usable bucket is full: the root word has no zero bit left.
    NoAvailableSlot,

    /// A free bit was located but the corresponding slot could not be used,
    /// e.g. because it falls outside the usable range. The write error that
    /// rejected the slot is carried as `cause`.
    NoUsableSlot { cause: Option<Box<Error>> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidBucketSize => {
                write!(f, "bucket size must be a power of 2")
            }
            Error::InvalidSliceSize { suggested } => {
                write!(
                    f,
                    "for performance, the slice's size needs to be 2-aligned; \
                     suggest you resize to {suggested} and set upper bound"
                )
            }
            Error::OutOfBounds { index } => {
                write!(f, "slot index {index} is out of bounds")
            }
            Error::NoAvailableSlot => {
                write!(f, "SlotMachine: No available slot")
            }
            Error::NoUsableSlot { cause: None } => {
                write!(f, "SlotMachine: No usable slot")
            }
            Error::NoUsableSlot { cause: Some(cause) } => {
                write!(f, "SlotMachine: No usable slot: {cause}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NoUsableSlot { cause: Some(cause) } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// A batch booking that failed part-way through.
///
/// The slots booked before the failure remain occupied; `booked` lists them
/// in booking order so the caller can decide whether to unset the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchError<Idx> {
    /// Slots successfully booked before the failure, in booking order.
    pub booked: Vec<Idx>,
    /// The available counter at the time of the failure.
    pub available: Idx,
    /// The error that stopped the batch.
    pub error: Error,
}

impl<Idx: fmt::Debug> fmt::Display for BatchError<Idx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} bookings", self.error, self.booked.len())
    }
}

impl<Idx: fmt::Debug> std::error::Error for BatchError<Idx> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
