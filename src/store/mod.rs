//! Reading store access for the Climate View engine.
//!
//! The store is written by an external ingest process; the engine only reads
//! from it through the [`ReadingStore`] trait.

pub mod jsonl;
pub mod memory;

use crate::core::reading::{Reading, TimeRange};
use chrono::{DateTime, Utc};

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// Read contract the engine needs from a reading store.
pub trait ReadingStore: Send + Sync {
    /// Readings inside `range` (all readings for `None`), ascending by timestamp.
    fn readings_in(&self, range: Option<&TimeRange>) -> Result<Vec<Reading>, StoreError>;

    /// Timestamp of the most recent reading, if any.
    fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Select the ascending sub-slice of `readings` that falls inside `range`.
pub(crate) fn slice_range<'a>(readings: &'a [Reading], range: Option<&TimeRange>) -> &'a [Reading] {
    match range {
        None => readings,
        Some(range) if range.is_inverted() => &[],
        Some(range) => {
            let lo = readings.partition_point(|r| r.timestamp < range.start);
            let hi = readings.partition_point(|r| r.timestamp <= range.end);
            &readings[lo..hi]
        }
    }
}

/// Errors reported by a reading store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backing store cannot be reached
    Unavailable(String),
    /// I/O failure while reading the store
    Io(String),
    /// A stored record could not be decoded
    Corrupt { line: usize, message: String },
    /// A reading carries a NaN or infinite measurement
    NonFinite {
        timestamp: DateTime<Utc>,
        field: &'static str,
    },
    /// A reading does not come strictly after the previous one
    OutOfOrder {
        previous: DateTime<Utc>,
        next: DateTime<Utc>,
    },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "Store unavailable: {e}"),
            StoreError::Io(e) => write!(f, "Store IO error: {e}"),
            StoreError::Corrupt { line, message } => {
                write!(f, "Corrupt record at line {line}: {message}")
            }
            StoreError::NonFinite { timestamp, field } => {
                write!(f, "Reading at {timestamp} has a non-finite {field}")
            }
            StoreError::OutOfOrder { previous, next } => write!(
                f,
                "Reading at {next} does not follow previous reading at {previous}"
            ),
        }
    }
}

impl std::error::Error for StoreError {}

/// Check that `next` may be appended after `last`: finite values and a
/// strictly later timestamp.
pub(crate) fn check_append(last: Option<&Reading>, next: &Reading) -> Result<(), StoreError> {
    for (field, value) in [
        ("temperature", next.temperature),
        ("humidity", next.humidity),
    ] {
        if !value.is_finite() {
            return Err(StoreError::NonFinite {
                timestamp: next.timestamp,
                field,
            });
        }
    }

    match last {
        Some(prev) if next.timestamp <= prev.timestamp => Err(StoreError::OutOfOrder {
            previous: prev.timestamp,
            next: next.timestamp,
        }),
        _ => Ok(()),
    }
}
