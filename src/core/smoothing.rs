//! Centered moving-average smoothing.
//!
//! Each reading is averaged with up to `k` neighbours on either side. Near the
//! ends of the series the window is clipped rather than padded or re-centered,
//! so point `i` of `n` averages `min(i, k) + min(n - 1 - i, k) + 1` samples.
//! The running sums make the whole pass O(n) regardless of `k`.

use crate::core::reading::{Reading, WindowWidth};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of a smoothed series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub smoothed_temperature: f64,
    pub humidity: f64,
    pub smoothed_humidity: f64,
}

/// A smoothed series together with the half-window it was computed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSeries {
    pub half_window: WindowWidth,
    pub points: Vec<SmoothedPoint>,
}

impl SmoothedSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Time span covered by the series, if any.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

/// Neumaier-compensated running sum.
///
/// Subtracting a sample that has left the window restores the exact prior
/// sum even when that sample dwarfed its neighbours.
#[derive(Debug, Default, Clone, Copy)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, value: f64) {
        let total = self.sum + value;
        if self.sum.abs() >= value.abs() {
            self.compensation += (self.sum - total) + value;
        } else {
            self.compensation += (value - total) + self.sum;
        }
        self.sum = total;
    }

    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Running sums over the current window.
#[derive(Debug, Default)]
struct WindowSums {
    temperature: CompensatedSum,
    humidity: CompensatedSum,
    count: usize,
}

impl WindowSums {
    fn add(&mut self, reading: &Reading) {
        self.temperature.add(reading.temperature);
        self.humidity.add(reading.humidity);
        self.count += 1;
    }

    fn remove(&mut self, reading: &Reading) {
        self.temperature.add(-reading.temperature);
        self.humidity.add(-reading.humidity);
        self.count -= 1;
    }
}

/// Smooth an ascending sequence of readings with half-window `k`.
pub fn smooth_readings(readings: &[Reading], width: WindowWidth) -> SmoothedSeries {
    let n = readings.len();
    // A half-window of n already covers the whole series from every point.
    let k = width.half().min(n);
    let mut points = Vec::with_capacity(n);

    if k == 0 {
        points.extend(readings.iter().map(|r| SmoothedPoint {
            timestamp: r.timestamp,
            temperature: r.temperature,
            smoothed_temperature: r.temperature,
            humidity: r.humidity,
            smoothed_humidity: r.humidity,
        }));
        return SmoothedSeries {
            half_window: width,
            points,
        };
    }

    let mut sums = WindowSums::default();

    // Prime with the samples following index 0 (the window of point 0 is
    // [0, min(k, n - 1)]).
    for reading in readings.iter().take(k.min(n.saturating_sub(1)) + 1) {
        sums.add(reading);
    }

    for (i, reading) in readings.iter().enumerate() {
        if i > 0 {
            // Slide: index i + k enters, index i - k - 1 leaves.
            if let Some(entering) = readings.get(i + k) {
                sums.add(entering);
            }
            if i > k {
                sums.remove(&readings[i - k - 1]);
            }
        }

        let count = sums.count as f64;
        points.push(SmoothedPoint {
            timestamp: reading.timestamp,
            temperature: reading.temperature,
            smoothed_temperature: sums.temperature.value() / count,
            humidity: reading.humidity,
            smoothed_humidity: sums.humidity.value() / count,
        });
    }

    SmoothedSeries {
        half_window: width,
        points,
    }
}
