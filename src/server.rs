//! HTTP API exposing the engine queries.
//!
//! ```text
//! GET /health
//! GET /smooth?k=10
//! GET /stats?start=...&end=...&fields=temperature,humidity
//! GET /last-update
//! ```
//!
//! Queries run on the blocking pool because store reads are synchronous.

use crate::core::reading::{FieldSet, TimeRange, WindowWidth};
use crate::core::smoothing::SmoothedSeries;
use crate::core::stats::StatsSummary;
use crate::engine::{Engine, EngineError};
use axum::{
    extract::{Query, State},
    http::{HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: std::net::IpAddr,
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Half-window used when a request omits `k`
    pub default_half_window: WindowWidth,
    /// Largest half-window a request may ask for
    pub max_half_window: Option<usize>,
}

impl ServerConfig {
    pub fn new(host: std::net::IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            default_half_window: WindowWidth::default(),
            max_half_window: None,
        }
    }
}

struct ServerState {
    engine: Engine,
    default_half_window: WindowWidth,
    max_half_window: Option<usize>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(error: EngineError) -> ApiError {
    let (status, code) = match &error {
        EngineError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
        EngineError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_ERROR"),
        EngineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

/// Run a blocking engine query off the async runtime.
async fn blocking<T, F>(state: Arc<ServerState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ServerState) -> Result<T, EngineError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            tracing::error!("Query task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Query task failed: {}", e),
                    code: "INTERNAL".to_string(),
                }),
            )
        })?
        .map_err(api_error)
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct SmoothParams {
    k: Option<i64>,
}

/// GET /smooth
async fn smooth(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SmoothParams>,
) -> Result<Json<SmoothedSeries>, ApiError> {
    blocking(state, move |state| {
        let width = match params.k {
            Some(k) => WindowWidth::new(k)?,
            None => state.default_half_window,
        };
        if let Some(max) = state.max_half_window {
            if width.half() > max {
                return Err(EngineError::InvalidArgument(format!(
                    "half-window {width} exceeds maximum {max}"
                )));
            }
        }
        state.engine.smooth(width)
    })
    .await
    .map(Json)
}

#[derive(Debug, Deserialize)]
struct StatsParams {
    start: Option<String>,
    end: Option<String>,
    fields: Option<String>,
}

/// GET /stats
async fn stats(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<StatsParams>,
) -> Result<Json<StatsSummary>, ApiError> {
    blocking(state, move |state| {
        let range = TimeRange::from_bounds(params.start.as_deref(), params.end.as_deref())?;
        let fields = params
            .fields
            .as_deref()
            .map(FieldSet::from_csv)
            .unwrap_or_default();
        state.engine.stats(range.as_ref(), fields)
    })
    .await
    .map(Json)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LastUpdateResponse {
    pub last_update: Option<DateTime<Utc>>,
}

/// GET /last-update
async fn last_update(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<LastUpdateResponse>, ApiError> {
    blocking(state, |state| state.engine.last_update())
        .await
        .map(|last_update| Json(LastUpdateResponse { last_update }))
}

/// Run the HTTP server
pub async fn run(
    engine: Engine,
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState {
        engine,
        default_half_window: config.default_half_window,
        max_half_window: config.max_half_window,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/smooth", get(smooth))
        .route("/stats", get(stats))
        .route("/last-update", get(last_update))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Climate View API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
