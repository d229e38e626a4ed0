// Copyright 2025 KeyFlare (https://github.com/keyflare)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP surface for metrics and the hot-keys API.
//!
//! Routes:
//! - `GET /` — HTML landing page linking the other endpoints
//! - `GET /metrics` — Prometheus text exposition
//! - `GET /hot-keys` — JSON view of the latest snapshot with ranks, trends,
//!   and optional time series (mounted only when the API is enabled)
//!
//! Query parameters are parsed leniently: invalid `limit`,
//! `include_timeseries`, or `timeseries_points` values fall back to their
//! defaults and the request still succeeds.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use keyflare_core::{KeyflareError, Result, SnapshotHistory, TimeSeriesPoint, Trend};

pub const DEFAULT_LISTEN_ADDR: &str = ":9121";
pub const DEFAULT_HOT_KEYS_LIMIT: usize = 100;
pub const DEFAULT_TIMESERIES_POINTS: usize = 50;

// Time series are computed over at most this many of the returned keys.
const MAX_TIMESERIES_KEYS: usize = 10;

const LANDING_PAGE: &str = "<html>\
<head><title>KeyFlare Metrics</title></head>\
<body>\
<h1>KeyFlare Metrics</h1>\
<ul>\
<li><a href=\"/metrics\">Prometheus Metrics</a></li>\
<li><a href=\"/hot-keys\">Hot Key Histories</a></li>\
</ul>\
</body>\
</html>";

/// Shared state behind the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Registry,
    history: Arc<SnapshotHistory>,
}

impl AppState {
    pub fn new(registry: Registry, history: Arc<SnapshotHistory>) -> Self {
        Self { registry, history }
    }
}

/// One hot key in the API response.
#[derive(Debug, Clone, Serialize)]
pub struct HotKeyInfo {
    pub key: String,
    pub count: u64,
    /// 1-based position in the returned list.
    pub rank: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub trend: Trend,
}

/// Response body of `GET /hot-keys`.
#[derive(Debug, Clone, Serialize)]
pub struct HotKeysResponse {
    pub timestamp: DateTime<Utc>,
    pub top_k: usize,
    pub total_keys: usize,
    pub keys: Vec<HotKeyInfo>,
    pub query_limit: usize,
    pub actual_limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<TimeSeriesPoint>>,
}

#[derive(Debug, Default, Deserialize)]
struct HotKeysQuery {
    limit: Option<String>,
    include_timeseries: Option<String>,
    timeseries_points: Option<String>,
}

fn parse_positive(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

/// Builds the hot-keys response from the latest snapshot. An empty history
/// yields an empty key list with the current timestamp.
pub fn build_hot_keys_response(
    history: &SnapshotHistory,
    limit: usize,
    include_timeseries: bool,
    timeseries_points: usize,
) -> HotKeysResponse {
    let Some(snapshot) = history.latest() else {
        return HotKeysResponse {
            timestamp: Utc::now(),
            top_k: 0,
            total_keys: 0,
            keys: Vec::new(),
            query_limit: limit,
            actual_limit: 0,
            time_series: None,
        };
    };

    let keys: Vec<HotKeyInfo> = snapshot
        .keys
        .iter()
        .take(limit)
        .enumerate()
        .map(|(position, kc)| {
            let meta = snapshot.key_meta.get(&kc.key);
            HotKeyInfo {
                key: kc.key.clone(),
                count: kc.count,
                rank: position + 1,
                first_seen: meta.map(|m| m.first_seen).unwrap_or(snapshot.timestamp),
                last_seen: meta.map(|m| m.last_seen).unwrap_or(snapshot.timestamp),
                trend: Trend::derive(kc.count, meta.map(|m| m.prev_count).unwrap_or(0)),
            }
        })
        .collect();

    let time_series = if include_timeseries && !keys.is_empty() {
        let series_keys: Vec<String> = keys
            .iter()
            .take(MAX_TIMESERIES_KEYS)
            .map(|info| info.key.clone())
            .collect();
        Some(history.time_series(&series_keys, timeseries_points))
    } else {
        None
    };

    HotKeysResponse {
        timestamp: snapshot.timestamp,
        top_k: snapshot.keys.len(),
        total_keys: snapshot.keys.len(),
        actual_limit: keys.len(),
        keys,
        query_limit: limit,
        time_series,
    }
}

async fn handle_root() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn handle_metrics(State(state): State<AppState>) -> Response {
    let families = state.registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("failed to encode metrics: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_hot_keys(
    State(state): State<AppState>,
    Query(query): Query<HotKeysQuery>,
) -> Response {
    let limit = parse_positive(query.limit.as_deref(), DEFAULT_HOT_KEYS_LIMIT);
    let include_timeseries = query.include_timeseries.as_deref() == Some("true");
    let timeseries_points =
        parse_positive(query.timeseries_points.as_deref(), DEFAULT_TIMESERIES_POINTS);

    let response =
        build_hot_keys_response(&state.history, limit, include_timeseries, timeseries_points);

    match serde_json::to_vec(&response) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json".to_string())],
            body,
        )
            .into_response(),
        Err(err) => {
            let err = KeyflareError::Encode(err);
            tracing::error!("hot-keys response: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Builds the metrics router. The `/hot-keys` route is mounted only when
/// `enable_api` is set.
pub fn router(state: AppState, enable_api: bool) -> Router {
    let mut router = Router::new()
        .route("/", get(handle_root))
        .route("/metrics", get(handle_metrics));
    if enable_api {
        router = router.route("/hot-keys", get(handle_hot_keys));
    }
    router.with_state(state).layer(TraceLayer::new_for_http())
}

/// Parses a listen address, accepting the `:port` shorthand for
/// all-interfaces binds.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    normalized
        .parse()
        .map_err(|_| KeyflareError::InvalidAddress(addr.to_string()))
}

/// Serves the router until the shutdown signal flips, then drains in-flight
/// requests cooperatively.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            tracing::info!("metrics server shutting down");
        })
        .await
}
