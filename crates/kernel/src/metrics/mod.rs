//! Prometheus metrics collection.
//!
//! Provides application metrics in Prometheus format.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    pub path: String,
    pub status: u16,
}

/// Permission aggregation outcome labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AggregationLabels {
    /// "ok" or an `AuthzError::kind()` label.
    pub outcome: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    /// HTTP request counter by method/path/status.
    pub http_requests: Family<HttpLabels, Counter>,

    /// HTTP request duration histogram.
    pub http_duration_seconds: Family<HttpLabels, Histogram>,

    /// Effective permission resolutions by outcome.
    pub aggregations: Family<AggregationLabels, Counter>,

    /// Duration of one effective permission resolution (membership + fan-out + merge).
    pub aggregation_duration_seconds: Histogram,

    /// Per-group permission fetches issued by the aggregator.
    pub group_fetches: Counter,

    /// Group permission cache hit counter.
    pub cache_hits: Counter,

    /// Group permission cache miss counter.
    pub cache_misses: Counter,
}

impl Metrics {
    /// Create a new metrics registry.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total HTTP requests",
            http_requests.clone(),
        );

        let http_duration_seconds = Family::<HttpLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 12))
        });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_duration_seconds.clone(),
        );

        let aggregations = Family::<AggregationLabels, Counter>::default();
        registry.register(
            "permission_aggregations",
            "Effective permission resolutions by outcome",
            aggregations.clone(),
        );

        let aggregation_duration_seconds = Histogram::new(exponential_buckets(0.0001, 2.0, 14));
        registry.register(
            "permission_aggregation_duration_seconds",
            "Effective permission resolution duration in seconds",
            aggregation_duration_seconds.clone(),
        );

        let group_fetches = Counter::default();
        registry.register(
            "permission_group_fetches",
            "Per-group permission fetches",
            group_fetches.clone(),
        );

        let cache_hits = Counter::default();
        registry.register("cache_hits", "Cache hit count", cache_hits.clone());

        let cache_misses = Counter::default();
        registry.register(
            "cache_misses",
            "Cache miss count",
            cache_misses.clone(),
        );

        Self {
            registry,
            http_requests,
            http_duration_seconds,
            aggregations,
            aggregation_duration_seconds,
            group_fetches,
            cache_hits,
            cache_misses,
        }
    }

    /// Record an HTTP request.
    pub fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests.get_or_create(&labels).inc();
        self.http_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record one effective permission resolution.
    pub fn record_aggregation(&self, outcome: &str, duration_secs: f64) {
        let labels = AggregationLabels {
            outcome: outcome.to_string(),
        };

        self.aggregations.get_or_create(&labels).inc();
        self.aggregation_duration_seconds.observe(duration_secs);
    }

    /// Record per-group fetches issued for one resolution.
    pub fn record_group_fetches(&self, count: u64) {
        self.group_fetches.inc_by(count);
    }

    /// Record a cache hit.
    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    /// Record a cache miss.
    pub fn record_cache_miss(&self) {
        self.cache_misses.inc();
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if Prometheus metric encoding to a `String` buffer fails.
    /// The `fmt::Write` impl for `String` is infallible.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        // Prometheus encoding to String buffer is infallible
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

/// Normalize a path for metrics labels.
///
/// Replaces numeric ids (menu ids, group ids) with a placeholder to limit cardinality.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|s| {
            if !s.is_empty() && s.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
                "{id}"
            } else {
                s
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/api/menus/3"), "/api/menus/{id}");
        assert_eq!(
            normalize_path("/api/admin/permissions/groups/42/invalidate"),
            "/api/admin/permissions/groups/{id}/invalidate"
        );
        assert_eq!(normalize_path("/api/permissions"), "/api/permissions");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        let output = metrics.encode();
        assert!(output.contains("permission_aggregation_duration_seconds"));
        assert!(output.contains("cache_hits_total"));
    }

    #[test]
    fn test_record_aggregation() {
        let metrics = Metrics::new();
        metrics.record_aggregation("ok", 0.002);
        metrics.record_aggregation("aggregation_failed", 0.010);
        metrics.record_group_fetches(3);

        let output = metrics.encode();
        assert!(output.contains("outcome=\"aggregation_failed\""));
        assert!(output.contains("permission_group_fetches_total 3"));
    }
}
