//! Orchestrator: the control-plane seam behind views
//!
//! Provides the `Orchestrator` async trait with two implementations:
//! - `InMemoryOrchestrator`: keeps objects in process (tests, local development)
//! - `K8sOrchestrator`: Jobs, Services and EndpointSlices (feature-gated behind `kube`)
//!
//! Every object is addressed by view name, never by a generated name, so
//! repeated applies and deletes are idempotent across retries and restarts.

pub mod kubernetes;
pub mod memory;

#[cfg(feature = "kube")]
pub use kubernetes::K8sOrchestrator;
pub use memory::InMemoryOrchestrator;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{GatewayConfig, OrchestratorKind};
use crate::error::Result;
use crate::view::{Endpoint, Subset, View, ViewName, ViewState};

/// A view as found in the control plane by label query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredView {
    pub name: ViewName,
    pub subset: Subset,
    /// Whether an unfinished compute unit (Job) exists
    pub has_job: bool,
    /// Serving endpoints of the view's Service
    pub endpoints: Vec<Endpoint>,
}

impl DiscoveredView {
    /// Lifecycle state implied by the discovered objects
    pub fn state(&self) -> ViewState {
        if !self.endpoints.is_empty() {
            ViewState::Ready
        } else if self.has_job {
            ViewState::Provisioning
        } else {
            ViewState::Absent
        }
    }

    pub fn into_view(self) -> View {
        let state = self.state();
        let endpoint = self.endpoints.into_iter().next();
        View {
            name: self.name,
            subset: self.subset,
            state,
            endpoint: if state == ViewState::Ready {
                endpoint
            } else {
                None
            },
        }
    }
}

/// Async trait for the control plane hosting view workloads
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Every view carrying the gateway's application label. Read-only.
    async fn list_views(&self) -> Result<Vec<DiscoveredView>>;

    /// Create the view's Service unless it already exists
    async fn apply_service(&self, name: &ViewName, subset: &Subset) -> Result<()>;

    /// Create the view's Job unless a running one already exists.
    /// A Job that has finished is deleted and created again.
    async fn apply_job(&self, name: &ViewName, subset: &Subset) -> Result<()>;

    /// Delete the view's Job; an absent Job is success
    async fn delete_job(&self, name: &ViewName) -> Result<()>;

    /// Delete the view's Service; an absent Service is success
    async fn delete_service(&self, name: &ViewName) -> Result<()>;

    /// Serving endpoints behind the view's Service
    async fn ready_endpoints(&self, name: &ViewName) -> Result<Vec<Endpoint>>;

    /// Backend name (for logging)
    fn name(&self) -> &str;
}

/// Build the orchestrator selected by `config.orchestrator`
pub async fn from_config(config: &GatewayConfig) -> Result<Arc<dyn Orchestrator>> {
    match config.orchestrator {
        OrchestratorKind::Memory => Ok(Arc::new(InMemoryOrchestrator::from_config(
            &config.memory,
        )?)),
        #[cfg(feature = "kube")]
        OrchestratorKind::Kubernetes => Ok(Arc::new(
            K8sOrchestrator::new(config.kubernetes.clone(), config.workload.clone()).await?,
        )),
        #[cfg(not(feature = "kube"))]
        OrchestratorKind::Kubernetes => Err(crate::error::GatewayError::Config(
            "orchestrator \"kubernetes\" requires the `kube` feature".to_string(),
        )),
    }
}
