//! Core computations for the Climate View engine.
//!
//! This module contains:
//! - The reading data model and query parameter types
//! - Centered moving-average smoothing
//! - Range statistics

pub mod reading;
pub mod smoothing;
pub mod stats;

// Re-export commonly used types
pub use reading::{
    parse_instant, Field, FieldSet, Reading, TimeRange, WindowWidth, DEFAULT_HALF_WINDOW,
};
pub use smoothing::{smooth_readings, SmoothedPoint, SmoothedSeries};
pub use stats::{summarize, StatsSummary};
