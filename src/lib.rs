//! Climate View - reactive recomputation engine for sensor dashboards.
//!
//! This library turns an append-only log of temperature/humidity readings
//! into the derived views a dashboard shows, and keeps those views current
//! as readings arrive and as the user changes the view parameters.
//!
//! # Views
//!
//! - **Smoothed series**: centered moving average with half-window `k`
//! - **Stats table**: average / maximum / minimum over the chart's visible range
//! - **Freshness label**: timestamp of the newest reading
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Climate View                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Reading   │──▶│   Engine    │──▶│ Coordinator │──▶ views│
//! │  │    Store    │   │  (queries)  │   │ (triggers)  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                                             ▲               │
//! │                                      ┌─────────────┐        │
//! │                                      │  Dashboard  │        │
//! │                                      │ (timer loop)│        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use climate_view_engine::{Coordinator, CoordinatorConfig, Engine, MemoryStore, Reading, Trigger};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store
//!     .append(Reading::new(chrono::Utc::now(), 21.5, 48.0))
//!     .expect("append failed");
//!
//! let coordinator = Coordinator::new(Engine::new(store), CoordinatorConfig::default());
//! coordinator.on_trigger(Trigger::Tick).expect("tick rejected");
//!
//! let views = coordinator.snapshot();
//! assert!(views.freshness.is_some());
//! ```

pub mod config;
pub mod coordinator;
pub mod core;
pub mod engine;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use coordinator::{
    Coordinator, CoordinatorConfig, Dashboard, DashboardEvent, DashboardHandle, Trigger, View,
    ViewOutcome, ViewResult, ViewSnapshot, ViewUpdate,
};
pub use core::{
    Field, FieldSet, Reading, SmoothedPoint, SmoothedSeries, StatsSummary, TimeRange, WindowWidth,
};
pub use engine::{Engine, EngineError};
pub use store::{JsonlStore, MemoryStore, ReadingStore, StoreError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
