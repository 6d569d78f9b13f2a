//! Configuration types for the view gateway
//!
//! Uses HCL (HashiCorp Configuration Language) as the configuration format.
//! Every field has a default, so an empty file (or no file at all) yields a
//! gateway serving `localhost` on port 8080 against the in-cluster
//! Kubernetes API.

mod kubernetes;
mod runtime;

pub use kubernetes::{
    ContainerConfig, KubernetesConfig, VolumeConfig, VolumeMountConfig, WorkloadConfig,
};
pub use runtime::{ColdStartConfig, MemoryConfig, ProxyConfig, ReconcileConfig, RetryConfig};

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{GatewayError, Result};

/// Which control-plane backend the gateway talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorKind {
    /// Kubernetes API (requires the `kube` feature)
    #[default]
    Kubernetes,
    /// In-process orchestrator for local development and tests
    Memory,
}

impl std::fmt::Display for OrchestratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubernetes => write!(f, "kubernetes"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Top-level gateway configuration
///
/// # HCL Example
///
/// ```hcl
/// hostname = "localhost"
/// listen   = "0.0.0.0:8080"
///
/// kubernetes {
///   namespace = "ui"
///   app_label = "lakeview"
/// }
///
/// cold_start {
///   timeout_secs     = 60
///   poll_interval_ms = 500
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway domain; views are addressed as `<view>.<hostname>`
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Listen address for both traffic and the management API
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Control-plane backend
    #[serde(default)]
    pub orchestrator: OrchestratorKind,

    /// Kubernetes naming, labels and namespace
    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// Pod template for view workloads
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Cold-start readiness bounds
    #[serde(default)]
    pub cold_start: ColdStartConfig,

    /// Registry reconciliation
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Retry policy for control-plane calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Upstream forwarding
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// In-process orchestrator settings (only used with `orchestrator = "memory"`)
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Graceful shutdown timeout in seconds (default: 30)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl GatewayConfig {
    /// Load configuration from an HCL file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_hcl(&content)
    }

    /// Parse configuration from an HCL string
    pub fn from_hcl(content: &str) -> Result<Self> {
        hcl::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse HCL config: {}", e)))
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            GatewayError::Config(format!("Invalid listen address '{}': {}", self.listen, e))
        })
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(GatewayError::Config("hostname must not be empty".to_string()));
        }
        if self.hostname.contains(':') {
            return Err(GatewayError::Config(format!(
                "hostname '{}' must not include a port",
                self.hostname
            )));
        }

        self.listen_addr()?;
        self.kubernetes.validate()?;
        self.workload.validate()?;
        self.cold_start.validate()?;
        self.reconcile.validate()?;
        self.retry.validate()?;

        if self.orchestrator == OrchestratorKind::Kubernetes && !cfg!(feature = "kube") {
            return Err(GatewayError::Config(
                "orchestrator \"kubernetes\" requires the `kube` feature".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            listen: default_listen(),
            orchestrator: OrchestratorKind::default(),
            kubernetes: KubernetesConfig::default(),
            workload: WorkloadConfig::default(),
            cold_start: ColdStartConfig::default(),
            reconcile: ReconcileConfig::default(),
            retry: RetryConfig::default(),
            proxy: ProxyConfig::default(),
            memory: MemoryConfig::default(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}
