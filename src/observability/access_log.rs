//! Structured access log: JSON-formatted request/response logging
//!
//! One entry per request, emitted under the `access_log` tracing target.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A single access log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub client_ip: String,
    pub method: String,
    pub path: String,
    /// Host header value
    pub host: Option<String>,
    pub status: u16,
    /// Response size in bytes
    pub response_bytes: u64,
    /// Request duration in milliseconds, including any cold-start wait
    pub duration_ms: u64,
    /// View the request addressed
    pub view: Option<String>,
    /// Workload endpoint the request was forwarded to
    pub endpoint: Option<String>,
    pub user_agent: Option<String>,
}

/// Access log manager: tracks and emits structured log entries
pub struct AccessLog {
    total_entries: AtomicU64,
}

impl AccessLog {
    pub fn new() -> Self {
        Self {
            total_entries: AtomicU64::new(0),
        }
    }

    /// Start tracking a request. Returns a RequestTracker to measure duration.
    pub fn start_request(&self) -> RequestTracker {
        RequestTracker {
            start: Instant::now(),
        }
    }

    /// Record and emit a log entry
    pub fn record(&self, entry: &AccessLogEntry) {
        self.total_entries.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            target: "access_log",
            client_ip = entry.client_ip,
            method = entry.method,
            path = entry.path,
            status = entry.status,
            duration_ms = entry.duration_ms,
            response_bytes = entry.response_bytes,
            view = entry.view.as_deref().unwrap_or("-"),
            endpoint = entry.endpoint.as_deref().unwrap_or("-"),
            "{}",
            serde_json::to_string(entry).unwrap_or_default()
        );
    }

    pub fn total_entries(&self) -> u64 {
        self.total_entries.load(Ordering::Relaxed)
    }
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks request duration
pub struct RequestTracker {
    start: Instant,
}

impl RequestTracker {
    /// Elapsed time in milliseconds since the request started
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Build an access log entry from the tracked request
    #[allow(clippy::too_many_arguments)]
    pub fn build_entry(
        &self,
        client_ip: String,
        method: String,
        path: String,
        host: Option<String>,
        status: u16,
        response_bytes: u64,
        view: Option<String>,
        endpoint: Option<String>,
        user_agent: Option<String>,
    ) -> AccessLogEntry {
        AccessLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            client_ip,
            method,
            path,
            host,
            status,
            response_bytes,
            duration_ms: self.elapsed_ms(),
            view,
            endpoint,
            user_agent,
        }
    }
}
