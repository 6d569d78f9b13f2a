//! Management API: view CRUD, health and metrics under `/_api`
//!
//! Handlers are independent of the HTTP server: they take a method, a path
//! and a body and return an [`ApiResponse`].

use http::Method;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::admission::AdmissionController;
use crate::error::GatewayError;
use crate::observability::GatewayMetrics;
use crate::provisioner::WorkloadProvisioner;
use crate::registry::ViewRegistry;
use crate::view::{Endpoint, Subset, View, ViewName, ViewRequest, ViewState};
use crate::{GatewayState, HealthStatus};

/// Body of `GET /` on the bare gateway host
pub const HEALTH_BODY: &str = "gateway ok\n";

/// A view as listed by the API
#[derive(Debug, Clone, Serialize)]
pub struct ViewInfo {
    pub name: String,
    pub subset: Subset,
    pub state: ViewState,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
}

impl From<View> for ViewInfo {
    fn from(view: View) -> Self {
        Self {
            ready: view.is_ready(),
            name: view.name.to_string(),
            subset: view.subset,
            state: view.state,
            endpoint: view.endpoint,
        }
    }
}

/// Response from the management API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Type header
    pub content_type: String,
    /// Response body
    pub body: String,
}

impl ApiResponse {
    pub(crate) fn json(status: u16, value: &impl Serialize) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: serde_json::to_string(value).unwrap_or_default(),
        }
    }

    pub(crate) fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: body.into(),
        }
    }

    pub(crate) fn error(err: &GatewayError) -> Self {
        Self {
            status: err.status_code(),
            content_type: "application/json".to_string(),
            body: err.to_json(),
        }
    }

    pub(crate) fn not_found(message: &str) -> Self {
        Self::json(404, &serde_json::json!({ "error": message }))
    }

    pub(crate) fn method_not_allowed() -> Self {
        Self::json(405, &serde_json::json!({ "error": "Method not allowed" }))
    }
}

/// Management API over the view registry
pub struct ManagementApi {
    registry: Arc<ViewRegistry>,
    provisioner: Arc<WorkloadProvisioner>,
    admission: Arc<AdmissionController>,
    metrics: Arc<GatewayMetrics>,
    state: Arc<RwLock<GatewayState>>,
    start_time: Instant,
}

impl ManagementApi {
    pub fn new(
        registry: Arc<ViewRegistry>,
        provisioner: Arc<WorkloadProvisioner>,
        admission: Arc<AdmissionController>,
        metrics: Arc<GatewayMetrics>,
        state: Arc<RwLock<GatewayState>>,
    ) -> Self {
        Self {
            registry,
            provisioner,
            admission,
            metrics,
            state,
            start_time: Instant::now(),
        }
    }

    /// Health status snapshot
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            state: self.state.read().unwrap().clone(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            active_connections: self.metrics.active_connections().max(0) as usize,
            total_requests: self.metrics.total_requests(),
            views: self.registry.len(),
            synced: self.registry.is_synced(),
            orchestrator: self.provisioner.orchestrator().name().to_string(),
        }
    }

    /// Handle a request addressed to the gateway itself
    pub async fn handle(&self, method: &Method, path: &str, body: &[u8]) -> ApiResponse {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };

        match path {
            "/" => match *method {
                Method::GET | Method::HEAD => ApiResponse::text(200, HEALTH_BODY),
                _ => ApiResponse::method_not_allowed(),
            },
            "/_api/health" => match *method {
                Method::GET => ApiResponse::json(200, &self.health()),
                _ => ApiResponse::method_not_allowed(),
            },
            "/_api/metrics" => match *method {
                Method::GET => {
                    self.metrics.set_views(self.registry.len());
                    ApiResponse {
                        status: 200,
                        content_type: "text/plain; version=0.0.4".to_string(),
                        body: self.metrics.render_prometheus(),
                    }
                }
                _ => ApiResponse::method_not_allowed(),
            },
            "/_api/views" => match *method {
                Method::GET => self.list_views(),
                Method::POST => self.create_view(body).await,
                _ => ApiResponse::method_not_allowed(),
            },
            p if p.starts_with("/_api/views/") => {
                let name = &p["/_api/views/".len()..];
                if name.contains('/') {
                    return ApiResponse::not_found("Not found");
                }
                match *method {
                    Method::GET => self.get_view(name),
                    Method::DELETE => self.delete_view(name).await,
                    _ => ApiResponse::method_not_allowed(),
                }
            }
            _ => ApiResponse::not_found("Not found"),
        }
    }

    fn list_views(&self) -> ApiResponse {
        let views: Vec<ViewInfo> = self
            .registry
            .list()
            .into_iter()
            .map(ViewInfo::from)
            .collect();
        ApiResponse::json(200, &views)
    }

    fn get_view(&self, name: &str) -> ApiResponse {
        match self.registry.get(name) {
            Some(view) => ApiResponse::json(200, &ViewInfo::from(view)),
            None => ApiResponse::not_found("View not found"),
        }
    }

    /// Declare a view. Idempotent: an existing name returns the stored view.
    async fn create_view(&self, body: &[u8]) -> ApiResponse {
        let request: ViewRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                return ApiResponse::error(&GatewayError::Validation(format!(
                    "invalid request body: {}",
                    e
                )))
            }
        };
        let view = match request.into_view() {
            Ok(v) => v,
            Err(e) => return ApiResponse::error(&e),
        };

        if let Some(existing) = self.registry.get(view.name.as_str()) {
            tracing::debug!(view = %view.name, "View already declared");
            return ApiResponse::json(200, &ViewInfo::from(existing));
        }

        // The Service carries the declaration so it survives a restart
        if let Err(e) = self.provisioner.declare(&view.name, &view.subset).await {
            tracing::error!(view = %view.name, error = %e, "Failed to declare view");
            return ApiResponse::error(&e);
        }

        let (stored, inserted) = self.registry.insert_if_absent(view);
        if inserted {
            self.metrics.record_view_created();
            self.metrics.set_views(self.registry.len());
            tracing::info!(view = %stored.name, cluster = %stored.subset.cluster, "View declared");
            ApiResponse::json(201, &ViewInfo::from(stored))
        } else {
            ApiResponse::json(200, &ViewInfo::from(stored))
        }
    }

    /// Tear down and forget a view. Unknown names succeed.
    async fn delete_view(&self, raw: &str) -> ApiResponse {
        let deleted = serde_json::json!({ "status": "deleted", "name": raw });

        // Nothing can exist under an invalid name
        let Ok(name) = ViewName::parse(raw) else {
            return ApiResponse::json(200, &deleted);
        };

        let previous = self.registry.get(name.as_str());
        if previous.is_some() {
            self.registry.set_state(name.as_str(), ViewState::Deleting);
        }
        // A re-declared view must not join a cold start of the old one
        self.admission.detach(name.as_str());

        if let Err(e) = self.provisioner.teardown(&name).await {
            // Restore so the view stays routable and a retried delete can run
            if let Some(view) = previous {
                self.registry.upsert(view);
            }
            return ApiResponse::error(&e);
        }

        if self.registry.remove(name.as_str()).is_some() {
            self.metrics.record_view_deleted();
            self.metrics.set_views(self.registry.len());
            tracing::info!(view = %name, "View deleted");
        }
        ApiResponse::json(200, &deleted)
    }
}
