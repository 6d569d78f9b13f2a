//! # View Gateway
//!
//! A multi-tenant HTTP gateway that fronts per-view workloads and starts them
//! on demand.
//!
//! ## Architecture
//!
//! ```text
//! Entrypoint → Admission (cold start) → Router → Proxy → View workload
//!                 │                                 ↑
//!                 └── Provisioner / Readiness ── Orchestrator (Job + Service)
//! ```
//!
//! A view is addressed by the first label of the request host
//! (`<view>.<hostname>`). The first request for a view that has no ready
//! workload creates it and waits for readiness; concurrent requests for the
//! same view share a single cold start. The registry is reconciled from the
//! control plane at startup and periodically, so a restarted gateway adopts
//! existing workloads instead of creating duplicates.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use view_gateway::{Gateway, config::GatewayConfig};
//!
//! #[tokio::main]
//! async fn main() -> view_gateway::Result<()> {
//!     let config = GatewayConfig::from_file("gateway.hcl").await?;
//!     let gateway = Gateway::from_config(config).await?;
//!     gateway.start().await?;
//!     gateway.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod api;
pub mod config;
pub(crate) mod entrypoint;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod orchestrator;
pub mod provisioner;
pub(crate) mod proxy;
pub mod readiness;
pub mod registry;
pub mod retry;
pub mod router;
pub mod view;

// Re-export main types
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use orchestrator::{DiscoveredView, InMemoryOrchestrator, Orchestrator};
pub use view::{Endpoint, Subset, View, ViewName, ViewState};

use serde::{Deserialize, Serialize};

/// Gateway runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayState {
    /// Gateway has been created but not yet started
    #[default]
    Created,
    /// Gateway is binding its listener
    Starting,
    /// Gateway is accepting requests
    Running,
    /// Gateway is draining connections and shutting down
    Stopping,
    /// Gateway has fully stopped
    Stopped,
}

impl std::fmt::Display for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Gateway health status snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Current gateway state
    pub state: GatewayState,
    /// Uptime in seconds since gateway started
    pub uptime_secs: u64,
    /// Number of active connections
    pub active_connections: usize,
    /// Total requests handled since start
    pub total_requests: u64,
    /// Views known to the registry
    pub views: usize,
    /// Whether the registry has completed its first reconcile
    pub synced: bool,
    /// Orchestrator backend name
    pub orchestrator: String,
}
