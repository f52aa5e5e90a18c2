//! Trigger and view types exchanged with the presentation layer.

use crate::core::reading::{FieldSet, TimeRange, WindowWidth};
use crate::core::smoothing::SmoothedSeries;
use crate::core::stats::StatsSummary;
use crate::engine::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An event that may cause views to recompute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Trigger {
    /// Periodic refresh; every view recomputes with its current parameters
    Tick,
    /// The user moved the smoothing control (raw, unvalidated half-window)
    WindowWidthChanged(i64),
    /// The chart viewport changed; `None` when it was reset or autoscaled
    VisibleRangeChanged(Option<TimeRange>),
}

impl Trigger {
    /// Views this trigger recomputes.
    pub fn views(&self) -> &'static [View] {
        match self {
            Trigger::Tick => &[View::SmoothedSeries, View::StatsTable, View::Freshness],
            Trigger::WindowWidthChanged(_) => &[View::SmoothedSeries],
            Trigger::VisibleRangeChanged(_) => &[View::StatsTable],
        }
    }
}

/// One independently recomputed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    SmoothedSeries,
    StatsTable,
    Freshness,
}

impl View {
    pub(crate) fn index(self) -> usize {
        match self {
            View::SmoothedSeries => 0,
            View::StatsTable => 1,
            View::Freshness => 2,
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::SmoothedSeries => write!(f, "smoothed series"),
            View::StatsTable => write!(f, "stats table"),
            View::Freshness => write!(f, "freshness"),
        }
    }
}

/// Parameters the views are currently derived from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewParameters {
    /// Half-window of the smoothed series
    pub half_window: WindowWidth,
    /// Viewport of the smoothed-series chart, which scopes the stats table
    pub visible_range: Option<TimeRange>,
    /// Fields the stats table covers
    pub fields: FieldSet,
}

/// Stats table contents along with the range they describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub range: Option<TimeRange>,
    pub summary: StatsSummary,
}

/// Freshness label contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessView {
    pub last_update: Option<DateTime<Utc>>,
}

/// A freshly computed, immutable view value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewResult {
    SmoothedSeries(Arc<SmoothedSeries>),
    StatsTable(Arc<StatsView>),
    Freshness(FreshnessView),
}

impl ViewResult {
    pub fn view(&self) -> View {
        match self {
            ViewResult::SmoothedSeries(_) => View::SmoothedSeries,
            ViewResult::StatsTable(_) => View::StatsTable,
            ViewResult::Freshness(_) => View::Freshness,
        }
    }
}

/// What happened to one view for one trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutcome {
    /// The view now shows this result
    Updated(ViewResult),
    /// A newer trigger for the view arrived; this computation was discarded
    Superseded { view: View, generation: u64 },
    /// The computation failed; the view keeps its previous result
    Failed { view: View, error: EngineError },
}

impl ViewOutcome {
    pub fn view(&self) -> View {
        match self {
            ViewOutcome::Updated(result) => result.view(),
            ViewOutcome::Superseded { view, .. } | ViewOutcome::Failed { view, .. } => *view,
        }
    }
}

/// Result of handling one trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewUpdate {
    pub trigger: Trigger,
    pub outcomes: Vec<ViewOutcome>,
}

impl ViewUpdate {
    /// Results that were applied.
    pub fn updated(&self) -> impl Iterator<Item = &ViewResult> {
        self.outcomes.iter().filter_map(|o| match o {
            ViewOutcome::Updated(result) => Some(result),
            _ => None,
        })
    }

    /// Outcome for a particular view, if the trigger touched it.
    pub fn outcome(&self, view: View) -> Option<&ViewOutcome> {
        self.outcomes.iter().find(|o| o.view() == view)
    }
}

/// Last-known-good value of every view.
///
/// Each field is replaced whole on update, so a reader never observes a mix
/// of two computations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub smoothed_series: Option<Arc<SmoothedSeries>>,
    pub stats_table: Option<Arc<StatsView>>,
    pub freshness: Option<FreshnessView>,
}

impl ViewSnapshot {
    pub(crate) fn apply(&mut self, result: ViewResult) {
        match result {
            ViewResult::SmoothedSeries(series) => self.smoothed_series = Some(series),
            ViewResult::StatsTable(stats) => self.stats_table = Some(stats),
            ViewResult::Freshness(freshness) => self.freshness = Some(freshness),
        }
    }
}
