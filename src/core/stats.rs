//! Range statistics (average / maximum / minimum) over readings.

use crate::core::reading::{Field, FieldSet, Reading};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Summary statistics for a set of readings.
///
/// Every aggregate is rounded to one decimal. A field that was not requested,
/// or a range without readings, leaves the corresponding values `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub avg_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
    pub min_humidity: Option<f64>,
    /// Number of readings the summary was computed from
    pub reading_count: usize,
}

impl StatsSummary {
    /// Whether the summary was computed from zero readings.
    pub fn is_empty(&self) -> bool {
        self.reading_count == 0
    }

    /// `(avg, max, min)` for one field.
    pub fn field(&self, field: Field) -> (Option<f64>, Option<f64>, Option<f64>) {
        match field {
            Field::Temperature => (
                self.avg_temperature,
                self.max_temperature,
                self.min_temperature,
            ),
            Field::Humidity => (self.avg_humidity, self.max_humidity, self.min_humidity),
        }
    }

    /// Render the summary as a three-row table (Average / Maximum / Minimum).
    pub fn to_table(&self) -> String {
        fn cell(value: Option<f64>) -> String {
            value.map_or_else(|| "no data".to_string(), |v| format!("{v:.1}"))
        }

        let mut out = format!("{:<10}{:>14}{:>14}\n", "", "Temperature", "Humidity");
        for (label, t, h) in [
            ("Average", self.avg_temperature, self.avg_humidity),
            ("Maximum", self.max_temperature, self.max_humidity),
            ("Minimum", self.min_temperature, self.min_humidity),
        ] {
            out.push_str(&format!("{label:<10}{:>14}{:>14}\n", cell(t), cell(h)));
        }
        out
    }
}

/// Round to one decimal place, halves away from zero.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `(avg, max, min)` of one field, or all `None` for no readings.
fn aggregate(readings: &[Reading], field: Field) -> (Option<f64>, Option<f64>, Option<f64>) {
    if readings.is_empty() {
        return (None, None, None);
    }

    let values: Vec<f64> = readings.iter().map(|r| r.value(field)).collect();
    (
        Some(round1(Statistics::mean(&values))),
        Some(round1(Statistics::max(&values))),
        Some(round1(Statistics::min(&values))),
    )
}

/// Compute statistics for the requested fields over already-filtered readings.
pub fn summarize(readings: &[Reading], fields: FieldSet) -> StatsSummary {
    let mut summary = StatsSummary {
        reading_count: readings.len(),
        ..StatsSummary::default()
    };

    if fields.temperature {
        (
            summary.avg_temperature,
            summary.max_temperature,
            summary.min_temperature,
        ) = aggregate(readings, Field::Temperature);
    }
    if fields.humidity {
        (summary.avg_humidity, summary.max_humidity, summary.min_humidity) =
            aggregate(readings, Field::Humidity);
    }

    summary
}
