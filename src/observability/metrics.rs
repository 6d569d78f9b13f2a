//! Gateway metrics: lightweight counters and gauges
//!
//! In-process counters exported as JSON snapshots or Prometheus text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

/// Metrics snapshot: a point-in-time view of all metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total requests received
    pub total_requests: u64,
    /// Responses by status code class (2xx, 3xx, 4xx, 5xx)
    pub status_classes: HashMap<String, u64>,
    /// Total bytes sent to clients
    pub total_response_bytes: u64,
    /// Currently active connections
    pub active_connections: i64,
    /// Cold starts that began provisioning
    pub cold_starts: u64,
    /// Cold starts that failed or timed out
    pub cold_start_failures: u64,
    /// Cumulative cold-start wait in milliseconds (successful ones)
    pub cold_start_ms: u64,
    /// Requests for unknown views
    pub no_route: u64,
    pub views_created: u64,
    pub views_deleted: u64,
    /// Views currently in the registry
    pub views: i64,
    /// Proxied requests per view
    pub view_requests: HashMap<String, u64>,
}

/// Gateway metrics collector
pub struct GatewayMetrics {
    total_requests: AtomicU64,
    status_2xx: AtomicU64,
    status_3xx: AtomicU64,
    status_4xx: AtomicU64,
    status_5xx: AtomicU64,
    total_response_bytes: AtomicU64,
    active_connections: AtomicI64,
    cold_starts: AtomicU64,
    cold_start_failures: AtomicU64,
    cold_start_ms: AtomicU64,
    no_route: AtomicU64,
    views_created: AtomicU64,
    views_deleted: AtomicU64,
    views: AtomicI64,
    view_requests: RwLock<HashMap<String, u64>>,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            status_2xx: AtomicU64::new(0),
            status_3xx: AtomicU64::new(0),
            status_4xx: AtomicU64::new(0),
            status_5xx: AtomicU64::new(0),
            total_response_bytes: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            cold_starts: AtomicU64::new(0),
            cold_start_failures: AtomicU64::new(0),
            cold_start_ms: AtomicU64::new(0),
            no_route: AtomicU64::new(0),
            views_created: AtomicU64::new(0),
            views_deleted: AtomicU64::new(0),
            views: AtomicI64::new(0),
            view_requests: RwLock::new(HashMap::new()),
        }
    }

    /// Record a completed request
    pub fn record_request(&self, status: u16, response_bytes: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_bytes
            .fetch_add(response_bytes, Ordering::Relaxed);

        let class = match status / 100 {
            2 => &self.status_2xx,
            3 => &self.status_3xx,
            4 => &self.status_4xx,
            5 => &self.status_5xx,
            _ => return,
        };
        class.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request forwarded to a view
    pub fn record_view_request(&self, view: &str) {
        let mut map = self.view_requests.write().unwrap();
        *map.entry(view.to_string()).or_insert(0) += 1;
    }

    pub fn record_cold_start(&self) {
        self.cold_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cold_start_complete(&self, elapsed_ms: u64) {
        self.cold_start_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
    }

    pub fn record_cold_start_failure(&self) {
        self.cold_start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_route(&self) {
        self.no_route.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_view_created(&self) {
        self.views_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_view_deleted(&self) {
        self.views_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_views(&self, count: usize) {
        self.views.store(count as i64, Ordering::Relaxed);
    }

    pub fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> i64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cold_starts(&self) -> u64 {
        self.cold_starts.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut status_classes = HashMap::new();
        status_classes.insert("2xx".to_string(), self.status_2xx.load(Ordering::Relaxed));
        status_classes.insert("3xx".to_string(), self.status_3xx.load(Ordering::Relaxed));
        status_classes.insert("4xx".to_string(), self.status_4xx.load(Ordering::Relaxed));
        status_classes.insert("5xx".to_string(), self.status_5xx.load(Ordering::Relaxed));

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            status_classes,
            total_response_bytes: self.total_response_bytes.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            cold_starts: self.cold_starts.load(Ordering::Relaxed),
            cold_start_failures: self.cold_start_failures.load(Ordering::Relaxed),
            cold_start_ms: self.cold_start_ms.load(Ordering::Relaxed),
            no_route: self.no_route.load(Ordering::Relaxed),
            views_created: self.views_created.load(Ordering::Relaxed),
            views_deleted: self.views_deleted.load(Ordering::Relaxed),
            views: self.views.load(Ordering::Relaxed),
            view_requests: self.view_requests.read().unwrap().clone(),
        }
    }

    /// Render metrics in Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let snap = self.snapshot();
        let mut output = String::new();

        let mut counter = |name: &str, help: &str, value: u64| {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        };
        counter(
            "gateway_requests_total",
            "Total number of requests",
            snap.total_requests,
        );
        counter(
            "gateway_response_bytes_total",
            "Total response bytes",
            snap.total_response_bytes,
        );
        counter(
            "gateway_cold_starts_total",
            "Cold starts that began provisioning",
            snap.cold_starts,
        );
        counter(
            "gateway_cold_start_failures_total",
            "Cold starts that failed or timed out",
            snap.cold_start_failures,
        );
        counter(
            "gateway_cold_start_milliseconds_total",
            "Cumulative successful cold-start wait in milliseconds",
            snap.cold_start_ms,
        );
        counter(
            "gateway_no_route_total",
            "Requests for unknown views",
            snap.no_route,
        );
        counter(
            "gateway_views_created_total",
            "Views declared through the management API",
            snap.views_created,
        );
        counter(
            "gateway_views_deleted_total",
            "Views deleted through the management API",
            snap.views_deleted,
        );

        output.push_str("# HELP gateway_responses_total Total responses by status class\n");
        output.push_str("# TYPE gateway_responses_total counter\n");
        for class in ["2xx", "3xx", "4xx", "5xx"] {
            let count = snap.status_classes.get(class).unwrap_or(&0);
            output.push_str(&format!(
                "gateway_responses_total{{status_class=\"{}\"}} {}\n",
                class, count
            ));
        }

        output.push_str("# HELP gateway_active_connections Current active connections\n");
        output.push_str("# TYPE gateway_active_connections gauge\n");
        output.push_str(&format!(
            "gateway_active_connections {}\n",
            snap.active_connections
        ));

        output.push_str("# HELP gateway_views Views currently in the registry\n");
        output.push_str("# TYPE gateway_views gauge\n");
        output.push_str(&format!("gateway_views {}\n", snap.views));

        if !snap.view_requests.is_empty() {
            output.push_str("# HELP gateway_view_requests_total Proxied requests per view\n");
            output.push_str("# TYPE gateway_view_requests_total counter\n");
            let mut views: Vec<_> = snap.view_requests.iter().collect();
            views.sort();
            for (view, count) in views {
                output.push_str(&format!(
                    "gateway_view_requests_total{{view=\"{}\"}} {}\n",
                    view, count
                ));
            }
        }

        output
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let m = GatewayMetrics::new();
        assert_eq!(m.total_requests(), 0);
        assert_eq!(m.active_connections(), 0);
        assert_eq!(m.cold_starts(), 0);
    }

    #[test]
    fn test_record_request_status_classes() {
        let m = GatewayMetrics::new();
        m.record_request(200, 10);
        m.record_request(201, 5);
        m.record_request(404, 0);
        m.record_request(503, 0);
        m.record_request(600, 0);

        let snap = m.snapshot();
        assert_eq!(snap.total_requests, 5);
        assert_eq!(snap.status_classes["2xx"], 2);
        assert_eq!(snap.status_classes["4xx"], 1);
        assert_eq!(snap.status_classes["5xx"], 1);
        assert_eq!(snap.total_response_bytes, 15);
    }

    #[test]
    fn test_connections() {
        let m = GatewayMetrics::new();
        m.inc_connections();
        m.inc_connections();
        m.dec_connections();
        assert_eq!(m.active_connections(), 1);
    }

    #[test]
    fn test_cold_start_counters() {
        let m = GatewayMetrics::new();
        m.record_cold_start();
        m.record_cold_start();
        m.record_cold_start_complete(1500);
        m.record_cold_start_failure();

        let snap = m.snapshot();
        assert_eq!(snap.cold_starts, 2);
        assert_eq!(snap.cold_start_failures, 1);
        assert_eq!(snap.cold_start_ms, 1500);
    }

    #[test]
    fn test_view_counters() {
        let m = GatewayMetrics::new();
        m.record_view_created();
        m.record_view_deleted();
        m.record_no_route();
        m.set_views(3);
        m.record_view_request("abc");
        m.record_view_request("abc");

        let snap = m.snapshot();
        assert_eq!(snap.views_created, 1);
        assert_eq!(snap.views_deleted, 1);
        assert_eq!(snap.no_route, 1);
        assert_eq!(snap.views, 3);
        assert_eq!(snap.view_requests["abc"], 2);
    }

    #[test]
    fn test_snapshot_serialization() {
        let m = GatewayMetrics::new();
        m.record_request(200, 100);
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        let parsed: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_requests, 1);
    }

    #[test]
    fn test_prometheus_format() {
        let m = GatewayMetrics::new();
        m.record_request(200, 100);
        m.record_cold_start();
        m.record_view_request("test01");
        m.set_views(1);

        let output = m.render_prometheus();
        assert!(output.contains("# TYPE gateway_requests_total counter"));
        assert!(output.contains("gateway_requests_total 1"));
        assert!(output.contains("gateway_cold_starts_total 1"));
        assert!(output.contains("gateway_responses_total{status_class=\"2xx\"} 1"));
        assert!(output.contains("# TYPE gateway_views gauge"));
        assert!(output.contains("gateway_views 1"));
        assert!(output.contains("gateway_view_requests_total{view=\"test01\"} 1"));
    }

    #[test]
    fn test_prometheus_omits_empty_view_requests() {
        let output = GatewayMetrics::new().render_prometheus();
        assert!(!output.contains("gateway_view_requests_total"));
        assert!(output.contains("gateway_no_route_total 0"));
    }
}
