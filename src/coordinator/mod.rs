//! Reactive update coordination.
//!
//! The coordinator maps triggers to the views they recompute and keeps each
//! view consistent with the most recent trigger that touched it:
//!
//! - At most one computation per view runs at a time.
//! - The last trigger wins. Every trigger takes a per-view generation number
//!   when it is submitted; a computation whose generation is no longer the
//!   latest is skipped if it has not started, or discarded when it finishes.
//! - Different views compute independently and may run concurrently.
//! - A failed computation leaves the previous view value in place.
//!
//! Handling a trigger is split into [`Coordinator::submit`], which validates
//! and applies parameters and reserves generations, and
//! [`Coordinator::run`], which does the work. [`Coordinator::on_trigger`]
//! does both.

pub mod dashboard;
pub mod types;

pub use dashboard::{Dashboard, DashboardEvent, DashboardHandle};
pub use types::{
    FreshnessView, StatsView, Trigger, View, ViewOutcome, ViewParameters, ViewResult,
    ViewSnapshot, ViewUpdate,
};

use crate::core::reading::{FieldSet, TimeRange, WindowWidth};
use crate::engine::{Engine, EngineError};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Coordinator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorConfig {
    /// Half-window used until the first width change
    pub initial_half_window: WindowWidth,
    /// Largest half-window a trigger may request, if bounded
    pub max_half_window: Option<usize>,
    /// Fields the stats table covers
    pub fields: FieldSet,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            initial_half_window: WindowWidth::default(),
            max_half_window: None,
            fields: FieldSet::all(),
        }
    }
}

/// Work reserved for one view by a submitted trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    Smooth(WindowWidth),
    Stats(Option<TimeRange>, FieldSet),
    Freshness,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Job {
    view: View,
    generation: u64,
    request: Request,
}

/// A validated trigger with its reserved per-view generations.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    trigger: Trigger,
    jobs: Vec<Job>,
}

#[derive(Debug, Default)]
struct ViewSlot {
    /// Generation of the most recently submitted trigger for this view
    latest: AtomicU64,
    /// Held for the duration of a computation
    compute: Mutex<()>,
}

/// Maps triggers to view recomputations.
#[derive(Debug)]
pub struct Coordinator {
    engine: Engine,
    max_half_window: Option<usize>,
    params: Mutex<ViewParameters>,
    slots: [ViewSlot; 3],
    snapshot: RwLock<ViewSnapshot>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic inside a computation must not wedge the view forever.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Coordinator {
    pub fn new(engine: Engine, config: CoordinatorConfig) -> Self {
        Self {
            engine,
            max_half_window: config.max_half_window,
            params: Mutex::new(ViewParameters {
                half_window: config.initial_half_window,
                visible_range: None,
                fields: config.fields,
            }),
            slots: Default::default(),
            snapshot: RwLock::new(ViewSnapshot::default()),
        }
    }

    /// Wrap in an `Arc` for sharing with worker threads.
    pub fn shared(engine: Engine, config: CoordinatorConfig) -> Arc<Self> {
        Arc::new(Self::new(engine, config))
    }

    /// Parameters the next computations will use.
    pub fn parameters(&self) -> ViewParameters {
        *lock(&self.params)
    }

    /// Last-known-good value of every view.
    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Validate a trigger, apply its parameters, and reserve generations.
    ///
    /// An invalid trigger is rejected without touching any parameter or
    /// generation, so it cannot supersede in-flight work.
    pub fn submit(&self, trigger: Trigger) -> Result<Ticket, EngineError> {
        let mut params = lock(&self.params);

        let mut next = *params;
        match trigger {
            Trigger::Tick => {}
            Trigger::WindowWidthChanged(k) => {
                let width = WindowWidth::new(k)?;
                if let Some(max) = self.max_half_window {
                    if width.half() > max {
                        return Err(EngineError::InvalidArgument(format!(
                            "half-window {k} exceeds maximum {max}"
                        )));
                    }
                }
                next.half_window = width;
            }
            Trigger::VisibleRangeChanged(range) => next.visible_range = range,
        }

        let jobs = trigger
            .views()
            .iter()
            .map(|&view| {
                let request = match view {
                    View::SmoothedSeries => Request::Smooth(next.half_window),
                    View::StatsTable => Request::Stats(next.visible_range, next.fields),
                    View::Freshness => Request::Freshness,
                };
                let generation = self.slots[view.index()]
                    .latest
                    .fetch_add(1, Ordering::SeqCst)
                    + 1;
                Job {
                    view,
                    generation,
                    request,
                }
            })
            .collect();

        *params = next;
        Ok(Ticket { trigger, jobs })
    }

    /// Compute every view reserved by `ticket`.
    ///
    /// Views run concurrently with each other; each view serializes with
    /// other tickets for the same view.
    pub fn run(&self, ticket: Ticket) -> ViewUpdate {
        let outcomes = if ticket.jobs.len() == 1 {
            vec![self.run_guarded(ticket.jobs[0])]
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = ticket
                    .jobs
                    .iter()
                    .map(|&job| scope.spawn(move || self.run_guarded(job)))
                    .collect();
                handles
                    .into_iter()
                    .zip(&ticket.jobs)
                    .map(|(handle, job)| {
                        // run_guarded already catches panics from the computation.
                        handle.join().unwrap_or_else(|_| ViewOutcome::Failed {
                            view: job.view,
                            error: EngineError::Internal(format!(
                                "{} worker thread aborted",
                                job.view
                            )),
                        })
                    })
                    .collect()
            })
        };

        ViewUpdate {
            trigger: ticket.trigger,
            outcomes,
        }
    }

    /// Submit and run a trigger.
    pub fn on_trigger(&self, trigger: Trigger) -> Result<ViewUpdate, EngineError> {
        let ticket = self.submit(trigger)?;
        Ok(self.run(ticket))
    }

    fn is_latest(&self, job: &Job) -> bool {
        self.slots[job.view.index()].latest.load(Ordering::SeqCst) == job.generation
    }

    /// Run a job, reporting a panic as a failed computation.
    ///
    /// Locks held by the job recover from poisoning, so the view keeps its
    /// last-known-good value and later triggers still run.
    fn run_guarded(&self, job: Job) -> ViewOutcome {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| self.run_job(job)));
        result.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("{} computation panicked: {}", job.view, message);
            ViewOutcome::Failed {
                view: job.view,
                error: EngineError::Internal(format!(
                    "{} computation panicked: {message}",
                    job.view
                )),
            }
        })
    }

    fn run_job(&self, job: Job) -> ViewOutcome {
        let _computing = lock(&self.slots[job.view.index()].compute);

        if !self.is_latest(&job) {
            tracing::debug!(
                "Skipping {} generation {}: superseded before start",
                job.view,
                job.generation
            );
            return ViewOutcome::Superseded {
                view: job.view,
                generation: job.generation,
            };
        }

        tracing::debug!("Computing {} generation {}", job.view, job.generation);
        let computed = self.compute(job.request);

        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if !self.is_latest(&job) {
            tracing::debug!(
                "Discarding {} generation {}: superseded while computing",
                job.view,
                job.generation
            );
            return ViewOutcome::Superseded {
                view: job.view,
                generation: job.generation,
            };
        }

        match computed {
            Ok(result) => {
                snapshot.apply(result.clone());
                ViewOutcome::Updated(result)
            }
            Err(error) => {
                tracing::warn!(
                    "Failed to compute {} (keeping previous value): {}",
                    job.view,
                    error
                );
                ViewOutcome::Failed {
                    view: job.view,
                    error,
                }
            }
        }
    }

    fn compute(&self, request: Request) -> Result<ViewResult, EngineError> {
        match request {
            Request::Smooth(width) => Ok(ViewResult::SmoothedSeries(Arc::new(
                self.engine.smooth(width)?,
            ))),
            Request::Stats(range, fields) => {
                let summary = self.engine.stats(range.as_ref(), fields)?;
                Ok(ViewResult::StatsTable(Arc::new(StatsView { range, summary })))
            }
            Request::Freshness => Ok(ViewResult::Freshness(FreshnessView {
                last_update: self.engine.last_update()?,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reading::Reading;
    use crate::store::{MemoryStore, ReadingStore, StoreError};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::AtomicBool;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn coordinator(n: i64) -> (Coordinator, Arc<MemoryStore>) {
        let readings = (0..n)
            .map(|i| Reading::new(t(i), 20.0 + i as f64, 50.0))
            .collect();
        let store = Arc::new(MemoryStore::from_readings(readings).unwrap());
        let coordinator = Coordinator::new(Engine::new(store.clone()), CoordinatorConfig::default());
        (coordinator, store)
    }

    /// Store that can be switched into a failing state.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl ReadingStore for FlakyStore {
        fn readings_in(&self, range: Option<&TimeRange>) -> Result<Vec<Reading>, StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("offline".to_string()));
            }
            self.inner.readings_in(range)
        }

        fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("offline".to_string()));
            }
            self.inner.max_timestamp()
        }
    }

    /// Store whose range reads panic while `panicking` is set.
    struct PanickingStore {
        inner: MemoryStore,
        panicking: AtomicBool,
    }

    impl ReadingStore for PanickingStore {
        fn readings_in(&self, range: Option<&TimeRange>) -> Result<Vec<Reading>, StoreError> {
            if self.panicking.load(Ordering::SeqCst) {
                panic!("range read exploded");
            }
            self.inner.readings_in(range)
        }

        fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
            self.inner.max_timestamp()
        }
    }

    #[test]
    fn test_tick_updates_all_views() {
        let (coordinator, _) = coordinator(5);
        let update = coordinator.on_trigger(Trigger::Tick).unwrap();

        assert_eq!(update.updated().count(), 3);
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.smoothed_series.unwrap().len(), 5);
        assert_eq!(snapshot.stats_table.unwrap().summary.reading_count, 5);
        assert_eq!(snapshot.freshness.unwrap().last_update, Some(t(4)));
    }

    #[test]
    fn test_width_change_only_recomputes_series() {
        let (coordinator, _) = coordinator(5);
        let update = coordinator
            .on_trigger(Trigger::WindowWidthChanged(1))
            .unwrap();

        assert_eq!(update.outcomes.len(), 1);
        let snapshot = coordinator.snapshot();
        assert_eq!(
            snapshot.smoothed_series.unwrap().half_window,
            WindowWidth::from(1)
        );
        assert!(snapshot.stats_table.is_none());
        assert!(snapshot.freshness.is_none());
    }

    #[test]
    fn test_visible_range_scopes_stats_on_later_ticks() {
        let (coordinator, _) = coordinator(10);
        let range = TimeRange::new(t(2), t(4));
        coordinator
            .on_trigger(Trigger::VisibleRangeChanged(Some(range)))
            .unwrap();

        let stats = coordinator.snapshot().stats_table.unwrap();
        assert_eq!(stats.range, Some(range));
        assert_eq!(stats.summary.reading_count, 3);
        assert_eq!(stats.summary.avg_temperature, Some(23.0));

        // Ticks keep using the viewport.
        coordinator.on_trigger(Trigger::Tick).unwrap();
        assert_eq!(
            coordinator.snapshot().stats_table.unwrap().summary.reading_count,
            3
        );

        // Clearing the viewport falls back to the whole store.
        coordinator
            .on_trigger(Trigger::VisibleRangeChanged(None))
            .unwrap();
        assert_eq!(
            coordinator.snapshot().stats_table.unwrap().summary.reading_count,
            10
        );
    }

    #[test]
    fn test_invalid_width_is_rejected_without_side_effects() {
        let (coordinator, _) = coordinator(3);
        coordinator
            .on_trigger(Trigger::WindowWidthChanged(2))
            .unwrap();
        let before = coordinator.parameters();

        let ticket = coordinator.submit(Trigger::WindowWidthChanged(3)).unwrap();
        assert!(coordinator.submit(Trigger::WindowWidthChanged(-4)).is_err());

        // The rejected trigger did not supersede the pending one.
        assert!(matches!(
            coordinator.run(ticket).outcomes[0],
            ViewOutcome::Updated(_)
        ));
        assert_eq!(before.half_window, WindowWidth::from(2));
        assert_eq!(coordinator.parameters().half_window, WindowWidth::from(3));
    }

    #[test]
    fn test_max_half_window_is_enforced() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Coordinator::new(
            Engine::new(store),
            CoordinatorConfig {
                max_half_window: Some(100),
                ..CoordinatorConfig::default()
            },
        );

        assert!(coordinator.submit(Trigger::WindowWidthChanged(100)).is_ok());
        assert!(matches!(
            coordinator.submit(Trigger::WindowWidthChanged(101)),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_older_ticket_is_superseded_by_newer_submission() {
        let (coordinator, _) = coordinator(30);
        let first = coordinator.submit(Trigger::WindowWidthChanged(5)).unwrap();
        let second = coordinator.submit(Trigger::WindowWidthChanged(20)).unwrap();

        assert!(matches!(
            coordinator.run(second).outcomes[0],
            ViewOutcome::Updated(_)
        ));
        assert!(matches!(
            coordinator.run(first).outcomes[0],
            ViewOutcome::Superseded { .. }
        ));
        assert_eq!(
            coordinator.snapshot().smoothed_series.unwrap().half_window,
            WindowWidth::from(20)
        );
    }

    #[test]
    fn test_failure_keeps_last_known_good_view() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::from_readings(vec![Reading::new(t(0), 20.0, 50.0)]).unwrap(),
            failing: AtomicBool::new(false),
        });
        let coordinator = Coordinator::new(Engine::new(store.clone()), CoordinatorConfig::default());

        coordinator.on_trigger(Trigger::Tick).unwrap();
        let good = coordinator.snapshot();

        store.failing.store(true, Ordering::SeqCst);
        let update = coordinator.on_trigger(Trigger::Tick).unwrap();

        assert!(update
            .outcomes
            .iter()
            .all(|o| matches!(o, ViewOutcome::Failed { .. })));
        assert!(matches!(
            update.outcome(View::Freshness),
            Some(ViewOutcome::Failed {
                error: EngineError::Store(StoreError::Unavailable(_)),
                ..
            })
        ));
        assert_eq!(coordinator.snapshot(), good);
    }

    #[test]
    fn test_panicking_computation_is_reported_on_every_path() {
        let store = Arc::new(PanickingStore {
            inner: MemoryStore::from_readings(vec![Reading::new(t(0), 20.0, 50.0)]).unwrap(),
            panicking: AtomicBool::new(false),
        });
        let coordinator = Coordinator::new(Engine::new(store.clone()), CoordinatorConfig::default());
        coordinator.on_trigger(Trigger::Tick).unwrap();
        let good = coordinator.snapshot();

        store.panicking.store(true, Ordering::SeqCst);

        // Single-job ticket runs on the calling thread.
        let update = coordinator
            .on_trigger(Trigger::WindowWidthChanged(2))
            .unwrap();
        assert!(matches!(
            update.outcome(View::SmoothedSeries),
            Some(ViewOutcome::Failed {
                error: EngineError::Internal(_),
                ..
            })
        ));

        // Multi-job ticket runs on scoped threads.
        let update = coordinator.on_trigger(Trigger::Tick).unwrap();
        assert!(matches!(
            update.outcome(View::StatsTable),
            Some(ViewOutcome::Failed {
                error: EngineError::Internal(_),
                ..
            })
        ));
        assert!(matches!(
            update.outcome(View::Freshness),
            Some(ViewOutcome::Updated(_))
        ));
        assert_eq!(coordinator.snapshot().smoothed_series, good.smoothed_series);

        // The view is not wedged once the store recovers.
        store.panicking.store(false, Ordering::SeqCst);
        let update = coordinator
            .on_trigger(Trigger::WindowWidthChanged(0))
            .unwrap();
        assert!(matches!(
            update.outcome(View::SmoothedSeries),
            Some(ViewOutcome::Updated(_))
        ));
    }

    #[test]
    fn test_huge_initial_half_window_smooths_whole_series() {
        let store = Arc::new(
            MemoryStore::from_readings(
                (0..3).map(|i| Reading::new(t(i), 10.0 * (i + 1) as f64, 50.0)).collect(),
            )
            .unwrap(),
        );
        let coordinator = Coordinator::new(
            Engine::new(store),
            CoordinatorConfig {
                initial_half_window: WindowWidth::from(usize::MAX),
                ..CoordinatorConfig::default()
            },
        );

        let update = coordinator.on_trigger(Trigger::Tick).unwrap();
        assert!(matches!(
            update.outcome(View::SmoothedSeries),
            Some(ViewOutcome::Updated(_))
        ));
        let series = coordinator.snapshot().smoothed_series.unwrap();
        assert!(series
            .points
            .iter()
            .all(|p| (p.smoothed_temperature - 20.0).abs() < 1e-9));
    }
}
