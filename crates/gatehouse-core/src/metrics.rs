//! Per-route latency and error collection.
//!
//! Dual-path, like the rest of our observability: lock-free Prometheus
//! counters and histograms are emitted on every call for scraping, while a
//! per-route ring buffer of raw samples backs the JSON snapshot endpoint
//! with exact on-demand percentiles.
//!
//! The ring buffer is capped at [`MAX_SAMPLES`] per route; percentiles are
//! computed by sorting a copy of the retained window. That is fine at this
//! cap but would not scale to high-cardinality or high-volume routes
//! without a streaming sketch.

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::{collections::VecDeque, sync::OnceLock};

/// Retained latency samples per route; oldest are evicted past this.
pub const MAX_SAMPLES: usize = 1000;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                // A second collector in the same process (tests) cannot
                // install the global recorder again; fall back to a detached
                // one so recording still works.
                tracing::warn!(error = %e, "Prometheus recorder already installed, using fallback");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

#[derive(Default)]
struct RouteStats {
    samples: VecDeque<u64>,
    total: u64,
    errors: u64,
    in_flight: i64,
}

/// Point-in-time view of one route's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSnapshot {
    pub route: String,
    /// Total timings recorded since startup (not capped by the buffer).
    pub count: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub errors: u64,
    pub in_flight: i64,
}

/// Process-wide latency/error collector keyed by route.
pub struct MetricsCollector {
    routes: DashMap<String, RouteStats>,
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self { routes: DashMap::new(), prometheus_handle: init_prometheus_recorder() }
    }

    /// Records one request's wall-clock duration for `route`.
    pub fn record_timing(&self, route: &str, ms: u64) {
        counter!("api_requests_total", "route" => route.to_string()).increment(1);
        #[allow(clippy::cast_precision_loss)]
        histogram!("api_request_duration_seconds", "route" => route.to_string())
            .record(ms as f64 / 1000.0);

        let mut stats = self.routes.entry(route.to_string()).or_default();
        if stats.samples.len() == MAX_SAMPLES {
            stats.samples.pop_front();
        }
        stats.samples.push_back(ms);
        stats.total += 1;
    }

    /// Records a failed request for `route`.
    pub fn record_error(&self, route: &str) {
        counter!("api_request_errors_total", "route" => route.to_string()).increment(1);
        self.routes.entry(route.to_string()).or_default().errors += 1;
    }

    /// Marks one request for `route` as in flight.
    pub fn incr_in_flight(&self, route: &str) {
        gauge!("api_requests_in_flight", "route" => route.to_string()).increment(1.0);
        self.routes.entry(route.to_string()).or_default().in_flight += 1;
    }

    /// Marks one request for `route` as finished.
    pub fn decr_in_flight(&self, route: &str) {
        gauge!("api_requests_in_flight", "route" => route.to_string()).decrement(1.0);
        let mut stats = self.routes.entry(route.to_string()).or_default();
        stats.in_flight = (stats.in_flight - 1).max(0);
    }

    /// Computes per-route statistics from the retained sample windows,
    /// sorted by route for stable output.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RouteSnapshot> {
        let mut snapshots: Vec<RouteSnapshot> = self
            .routes
            .iter()
            .map(|entry| {
                let stats = entry.value();
                let mut sorted: Vec<u64> = stats.samples.iter().copied().collect();
                sorted.sort_unstable();

                RouteSnapshot {
                    route: entry.key().clone(),
                    count: stats.total,
                    p50: percentile(&sorted, 50.0),
                    p95: percentile(&sorted, 95.0),
                    p99: percentile(&sorted, 99.0),
                    errors: stats.errors,
                    in_flight: stats.in_flight,
                }
            })
            .collect();

        snapshots.sort_by(|a, b| a.route.cmp(&b.route));
        snapshots
    }

    /// Renders the Prometheus exposition text.
    #[must_use]
    pub fn render_prometheus(&self) -> String {
        self.prometheus_handle.render()
    }

    /// Retained sample count for `route`.
    #[doc(hidden)]
    #[must_use]
    pub fn retained_samples(&self, route: &str) -> usize {
        self.routes.get(route).map_or(0, |stats| stats.samples.len())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Nearest-rank percentile over an already-sorted slice; 0 when empty.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
