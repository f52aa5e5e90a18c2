//! Reading data model and query parameter types.
//!
//! A [`Reading`] is one persisted sample. The remaining types describe the
//! parameters the derived views are computed from.

use crate::engine::EngineError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-window used when no explicit width has been chosen yet.
pub const DEFAULT_HALF_WINDOW: usize = 10;

/// A single timestamped temperature/humidity sample.
///
/// Readings are immutable once written; the store orders them by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, temperature: f64, humidity: f64) -> Self {
        Self {
            timestamp,
            temperature,
            humidity,
        }
    }

    /// Value of the given field.
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::Temperature => self.temperature,
            Field::Humidity => self.humidity,
        }
    }
}

/// A closed time interval `[start, end]`.
///
/// An inverted interval (`start > end`) is representable and simply matches
/// no readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp falls within this range (both ends inclusive).
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Whether the range can match anything at all.
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    /// Build a range from a chart viewport's two bounds.
    ///
    /// A viewport with a missing bound (autoscaled or reset chart) yields
    /// `None`, which callers treat as "whole store".
    pub fn from_bounds(
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Option<Self>, EngineError> {
        match (start, end) {
            (Some(start), Some(end)) => Ok(Some(Self::new(
                parse_instant(start)?,
                parse_instant(end)?,
            ))),
            _ => Ok(None),
        }
    }
}

/// Parse an instant as emitted by chart viewports or typed by a user.
///
/// Accepts RFC 3339 as well as the naive `YYYY-MM-DD[ HH:MM[:SS[.fff]]]`
/// forms; naive values are taken to be UTC.
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>, EngineError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(EngineError::InvalidArgument(format!(
        "unrecognised timestamp '{s}'"
    )))
}

/// Half-window size `k`: smoothing averages over `2k + 1` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowWidth(usize);

impl WindowWidth {
    /// Validate a caller-supplied half-window.
    pub fn new(k: i64) -> Result<Self, EngineError> {
        usize::try_from(k).map(Self).map_err(|_| {
            EngineError::InvalidArgument(format!("half-window must be non-negative, got {k}"))
        })
    }

    pub fn half(&self) -> usize {
        self.0
    }

    /// Number of samples in an unclipped window.
    pub fn span(&self) -> usize {
        self.0.saturating_mul(2).saturating_add(1)
    }
}

impl Default for WindowWidth {
    fn default() -> Self {
        Self(DEFAULT_HALF_WINDOW)
    }
}

impl From<usize> for WindowWidth {
    fn from(k: usize) -> Self {
        Self(k)
    }
}

impl std::fmt::Display for WindowWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A measured quantity of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Temperature,
    Humidity,
}

/// Which fields a statistics query should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSet {
    pub temperature: bool,
    pub humidity: bool,
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FieldSet {
    pub fn all() -> Self {
        Self {
            temperature: true,
            humidity: true,
        }
    }

    pub fn only(field: Field) -> Self {
        Self {
            temperature: field == Field::Temperature,
            humidity: field == Field::Humidity,
        }
    }

    /// Parse a field set from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let fields: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            temperature: fields.iter().any(|s| s == "temperature" || s == "all"),
            humidity: fields.iter().any(|s| s == "humidity" || s == "all"),
        }
    }

    pub fn contains(&self, field: Field) -> bool {
        match field {
            Field::Temperature => self.temperature,
            Field::Humidity => self.humidity,
        }
    }

    /// Check if at least one field is selected.
    pub fn any_selected(&self) -> bool {
        self.temperature || self.humidity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_width_rejects_negative() {
        assert!(WindowWidth::new(-1).is_err());
        assert_eq!(WindowWidth::new(0).unwrap().half(), 0);
        assert_eq!(WindowWidth::new(5).unwrap().span(), 11);
    }

    #[test]
    fn test_time_range_contains_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let range = TimeRange::new(start, end);

        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + chrono::Duration::seconds(1)));
        assert!(!range.is_inverted());
        assert!(TimeRange::new(end, start).is_inverted());
    }

    #[test]
    fn test_from_bounds_parses_viewport_formats() {
        let range = TimeRange::from_bounds(
            Some("2024-03-01 10:15:00.5"),
            Some("2024-03-02T08:00:00Z"),
        )
        .unwrap()
        .unwrap();

        assert_eq!(
            range.start,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap()
                + chrono::Duration::milliseconds(500)
        );
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_from_bounds_missing_bound_is_unbounded() {
        assert_eq!(TimeRange::from_bounds(Some("2024-03-01"), None).unwrap(), None);
        assert_eq!(TimeRange::from_bounds(None, None).unwrap(), None);
    }

    #[test]
    fn test_parse_instant_rejects_garbage() {
        assert!(matches!(
            parse_instant("yesterday"),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_field_set_parsing() {
        let fields = FieldSet::from_csv("temperature");
        assert!(fields.temperature);
        assert!(!fields.humidity);

        let fields = FieldSet::from_csv("all");
        assert!(fields.temperature && fields.humidity);

        assert!(!FieldSet::from_csv("pressure").any_selected());
    }
}
