//! In-memory reading store.

use crate::core::reading::{Reading, TimeRange};
use crate::store::{check_append, slice_range, ReadingStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// An append-only, timestamp-ordered store held in memory.
///
/// Range lookups use binary search and `max_timestamp` reads the tail, so
/// neither scans the whole log.
#[derive(Debug, Default)]
pub struct MemoryStore {
    readings: RwLock<Vec<Reading>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from readings, validating their order.
    pub fn from_readings(readings: Vec<Reading>) -> Result<Self, StoreError> {
        let mut last = None;
        for reading in &readings {
            check_append(last, reading)?;
            last = Some(reading);
        }
        Ok(Self {
            readings: RwLock::new(readings),
        })
    }

    /// Append a reading; it must be strictly newer than the current tail.
    pub fn append(&self, reading: Reading) -> Result<(), StoreError> {
        let mut readings = self
            .readings
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        check_append(readings.last(), &reading)?;
        readings.push(reading);
        Ok(())
    }

    /// Number of readings held.
    pub fn len(&self) -> usize {
        self.readings.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReadingStore for MemoryStore {
    fn readings_in(&self, range: Option<&TimeRange>) -> Result<Vec<Reading>, StoreError> {
        let readings = self
            .readings
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        Ok(slice_range(&readings, range).to_vec())
    }

    fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let readings = self
            .readings
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        Ok(readings.last().map(|r| r.timestamp))
    }
}
