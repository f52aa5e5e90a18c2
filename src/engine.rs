//! Query facade over a reading store.
//!
//! Every result is computed fresh from the store contents at call time;
//! nothing derived is cached here or written back.

use crate::core::reading::{FieldSet, TimeRange, WindowWidth};
use crate::core::smoothing::{smooth_readings, SmoothedSeries};
use crate::core::stats::{summarize, StatsSummary};
use crate::store::{ReadingStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Errors surfaced by engine queries.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The caller supplied a malformed parameter
    InvalidArgument(String),
    /// The reading store failed
    Store(StoreError),
    /// A computation aborted unexpectedly
    Internal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidArgument(e) => write!(f, "Invalid argument: {e}"),
            EngineError::Store(e) => write!(f, "{e}"),
            EngineError::Internal(e) => write!(f, "Internal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            EngineError::InvalidArgument(_) | EngineError::Internal(_) => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}

/// The query side of the engine.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn ReadingStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self { store }
    }

    /// Smoothed series over the whole store, ascending by timestamp.
    pub fn smooth(&self, width: WindowWidth) -> Result<SmoothedSeries, EngineError> {
        let readings = self.store.readings_in(None)?;
        Ok(smooth_readings(&readings, width))
    }

    /// Average / maximum / minimum of the requested fields over `range`.
    ///
    /// An inverted range matches no readings and yields an all-`None`
    /// summary, the same as any other empty range.
    pub fn stats(
        &self,
        range: Option<&TimeRange>,
        fields: FieldSet,
    ) -> Result<StatsSummary, EngineError> {
        if !fields.any_selected() {
            return Err(EngineError::InvalidArgument(
                "at least one field must be selected".to_string(),
            ));
        }
        let readings = self.store.readings_in(range)?;
        Ok(summarize(&readings, fields))
    }

    /// Timestamp of the most recent reading.
    pub fn last_update(&self) -> Result<Option<DateTime<Utc>>, EngineError> {
        Ok(self.store.max_timestamp()?)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}
