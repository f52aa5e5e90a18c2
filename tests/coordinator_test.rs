//! Integration tests for trigger supersession and per-view serialization.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use climate_view_engine::{
    core::smooth_readings, Coordinator, CoordinatorConfig, Engine, MemoryStore, Reading,
    ReadingStore, StoreError, TimeRange, Trigger, View, ViewOutcome, WindowWidth,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn readings(n: i64) -> Vec<Reading> {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            Reading::new(
                start + ChronoDuration::minutes(i),
                20.0 + (i % 7) as f64,
                45.0 + (i % 5) as f64,
            )
        })
        .collect()
}

/// Store whose first range read blocks until the test releases it.
struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl ReadingStore for GatedStore {
    fn readings_in(&self, range: Option<&TimeRange>) -> Result<Vec<Reading>, StoreError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.entered.send(());
            let _ = self.release.recv();
        }
        self.inner.readings_in(range)
    }

    fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.inner.max_timestamp()
    }
}

/// Store that records how many range reads overlap.
struct CountingStore {
    inner: MemoryStore,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ReadingStore for CountingStore {
    fn readings_in(&self, range: Option<&TimeRange>) -> Result<Vec<Reading>, StoreError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        let result = self.inner.readings_in(range);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn max_timestamp(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.inner.max_timestamp()
    }
}

#[test]
fn test_result_of_superseded_trigger_is_never_shown() {
    let data = readings(60);
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let store = Arc::new(GatedStore {
        inner: MemoryStore::from_readings(data.clone()).unwrap(),
        armed: AtomicBool::new(true),
        entered: entered_tx,
        release: release_rx,
    });
    let coordinator = Coordinator::shared(Engine::new(store), CoordinatorConfig::default());

    // T1 starts computing and blocks inside the store.
    let first = coordinator.submit(Trigger::WindowWidthChanged(5)).unwrap();
    let worker = {
        let coordinator = coordinator.clone();
        thread::spawn(move || coordinator.run(first))
    };
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first computation never started");

    // T2 arrives before T1's result is observed.
    let second = coordinator.submit(Trigger::WindowWidthChanged(20)).unwrap();
    release_tx.send(()).unwrap();

    let first_update = worker.join().unwrap();
    assert!(matches!(
        first_update.outcome(View::SmoothedSeries),
        Some(ViewOutcome::Superseded { .. })
    ));
    assert!(coordinator.snapshot().smoothed_series.is_none());

    let second_update = coordinator.run(second);
    assert!(matches!(
        second_update.outcome(View::SmoothedSeries),
        Some(ViewOutcome::Updated(_))
    ));

    let shown = coordinator.snapshot().smoothed_series.unwrap();
    assert_eq!(shown.half_window, WindowWidth::from(20));
    assert_eq!(*shown, smooth_readings(&data, WindowWidth::from(20)));
}

#[test]
fn test_at_most_one_computation_per_view() {
    let store = Arc::new(CountingStore {
        inner: MemoryStore::from_readings(readings(40)).unwrap(),
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let coordinator = Coordinator::shared(Engine::new(store.clone()), CoordinatorConfig::default());

    let workers: Vec<_> = (0..8)
        .map(|k| {
            let coordinator = coordinator.clone();
            thread::spawn(move || coordinator.on_trigger(Trigger::WindowWidthChanged(k)))
        })
        .collect();
    for worker in workers {
        worker.join().unwrap().unwrap();
    }

    assert_eq!(store.peak.load(Ordering::SeqCst), 1);

    // Whatever order the triggers landed in, the view shows the latest one.
    let shown = coordinator.snapshot().smoothed_series.unwrap();
    assert_eq!(shown.half_window, coordinator.parameters().half_window);
}

#[test]
fn test_stats_follow_the_chart_viewport() {
    let data = readings(30);
    let store = Arc::new(MemoryStore::from_readings(data.clone()).unwrap());
    let coordinator = Coordinator::new(Engine::new(store.clone()), CoordinatorConfig::default());

    let range = TimeRange::new(data[10].timestamp, data[19].timestamp);
    coordinator
        .on_trigger(Trigger::VisibleRangeChanged(Some(range)))
        .unwrap();
    coordinator
        .on_trigger(Trigger::WindowWidthChanged(3))
        .unwrap();

    // New readings arrive; the next tick refreshes everything with the
    // viewport and width chosen earlier.
    let later = data.last().unwrap().timestamp + ChronoDuration::minutes(1);
    store.append(Reading::new(later, 99.0, 99.0)).unwrap();
    let update = coordinator.on_trigger(Trigger::Tick).unwrap();
    assert_eq!(update.updated().count(), 3);

    let views = coordinator.snapshot();
    let stats = views.stats_table.unwrap();
    assert_eq!(stats.range, Some(range));
    assert_eq!(stats.summary.reading_count, 10);
    assert_ne!(stats.summary.max_temperature, Some(99.0));

    let series = views.smoothed_series.unwrap();
    assert_eq!(series.half_window, WindowWidth::from(3));
    assert_eq!(series.len(), 31);
    assert_eq!(views.freshness.unwrap().last_update, Some(later));
}

#[test]
fn test_inverted_viewport_yields_null_stats() {
    let data = readings(10);
    let store = Arc::new(MemoryStore::from_readings(data.clone()).unwrap());
    let coordinator = Coordinator::new(Engine::new(store), CoordinatorConfig::default());

    let inverted = TimeRange::new(data[8].timestamp, data[2].timestamp);
    coordinator
        .on_trigger(Trigger::VisibleRangeChanged(Some(inverted)))
        .unwrap();

    let stats = coordinator.snapshot().stats_table.unwrap();
    assert!(stats.summary.is_empty());
    assert_eq!(stats.summary.avg_temperature, None);
    assert_eq!(stats.summary.max_humidity, None);
}
