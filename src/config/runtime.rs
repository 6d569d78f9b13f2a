//! Runtime tuning: cold-start bounds, reconciliation, retries, proxying

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds for the cold-start readiness wait
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdStartConfig {
    /// Maximum time a request waits for a workload to become ready
    #[serde(default = "default_cold_start_timeout")]
    pub timeout_secs: u64,

    /// Endpoint polling interval while waiting
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_cold_start_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    500
}

impl ColdStartConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "cold_start.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(GatewayError::Config(
                "cold_start.poll_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_cold_start_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Registry reconciliation against the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Periodic re-scan interval after the first successful reconcile
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,

    /// First retry delay when the startup reconcile fails
    #[serde(default = "default_reconcile_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Cap on the startup retry delay
    #[serde(default = "default_reconcile_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_resync_interval() -> u64 {
    30
}

fn default_reconcile_initial_backoff() -> u64 {
    500
}

fn default_reconcile_max_backoff() -> u64 {
    10_000
}

impl ReconcileConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.resync_interval_secs == 0 {
            return Err(GatewayError::Config(
                "reconcile.resync_interval_secs must be > 0".to_string(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(GatewayError::Config(
                "reconcile.initial_backoff_ms must not exceed max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval(),
            initial_backoff_ms: default_reconcile_initial_backoff(),
            max_backoff_ms: default_reconcile_max_backoff(),
        }
    }
}

/// Retry policy for individual control-plane calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles each time
    #[serde(default = "default_retry_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    200
}

impl RetryConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(GatewayError::Config(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_retry_backoff(),
        }
    }
}

/// Upstream forwarding to view workloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Per-request upstream timeout; 0 disables it for long-lived responses
    #[serde(default)]
    pub timeout_secs: u64,

    /// Extra attempts on connect failure
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// `Host` header sent upstream
    #[serde(default = "default_host_rewrite")]
    pub host_rewrite: String,
}

fn default_connect_retries() -> u32 {
    3
}

fn default_host_rewrite() -> String {
    "localhost".to_string()
}

impl ProxyConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            connect_retries: default_connect_retries(),
            host_rewrite: default_host_rewrite(),
        }
    }
}

/// In-process orchestrator used for local development
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Address every provisioned view resolves to
    #[serde(default = "default_memory_endpoint")]
    pub endpoint: String,

    /// Readiness polls a new workload reports empty before becoming ready
    #[serde(default)]
    pub ready_after_polls: u32,
}

fn default_memory_endpoint() -> String {
    "127.0.0.1:9000".to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_memory_endpoint(),
            ready_after_polls: 0,
        }
    }
}
