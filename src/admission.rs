//! Admission controller: decides, before routing, whether a request may proceed
//!
//! Every request passes through [`AdmissionController::admit`]:
//! - management paths (`/_api/...`) and the bare gateway host stay local
//! - ready views pass straight through
//! - unknown views are rejected with "no route"
//! - known views without a ready endpoint are cold-started inline
//!
//! Cold starts are single-flight per view: the first request spawns the
//! provisioning task and every concurrent request for the same view awaits
//! that same task. The task is detached from the requests, so a client
//! disconnect never cancels work other waiters depend on. Deleting a view
//! detaches its cold start: the task stops waiting and the next request
//! after a re-declare starts a fresh one.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{GatewayError, Result};
use crate::observability::GatewayMetrics;
use crate::provisioner::WorkloadProvisioner;
use crate::readiness::ReadinessWaiter;
use crate::registry::ViewRegistry;
use crate::router::{RouteLookup, Router};
use crate::view::{Endpoint, View, ViewName, ViewState};

/// Path prefix served by the gateway itself
pub const MANAGEMENT_PREFIX: &str = "/_api";

type ColdStartResult = std::result::Result<Endpoint, Arc<GatewayError>>;
type ColdStart = Shared<BoxFuture<'static, ColdStartResult>>;

/// A running cold start, as tracked in the in-flight table
struct Flight {
    id: u64,
    detached: Arc<AtomicBool>,
    start: ColdStart,
}

/// Outcome of admitting a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Served by the gateway (health, management API)
    Local,
    /// Addressed to a view that now has a ready endpoint
    Admitted {
        view: String,
        /// Whether this request waited on a cold start
        cold_start: bool,
    },
}

/// Whether a path belongs to the management surface
pub fn is_management_path(path: &str) -> bool {
    path == MANAGEMENT_PREFIX
        || path
            .strip_prefix(MANAGEMENT_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Rebuild an error that was shared between cold-start waiters
fn replay(e: &GatewayError) -> GatewayError {
    match e {
        GatewayError::Validation(m) => GatewayError::Validation(m.clone()),
        GatewayError::NoRoute(m) => GatewayError::NoRoute(m.clone()),
        GatewayError::ProvisioningTimeout { view, waited_ms } => GatewayError::ProvisioningTimeout {
            view: view.clone(),
            waited_ms: *waited_ms,
        },
        GatewayError::OrchestrationUnavailable(m) => {
            GatewayError::OrchestrationUnavailable(m.clone())
        }
        GatewayError::NotReconciled => GatewayError::NotReconciled,
        GatewayError::Upstream(m) => GatewayError::Upstream(m.clone()),
        other => GatewayError::Other(other.to_string()),
    }
}

/// Shared collaborators of a cold start task
#[derive(Clone)]
struct ColdStarter {
    registry: Arc<ViewRegistry>,
    provisioner: Arc<WorkloadProvisioner>,
    waiter: Arc<ReadinessWaiter>,
    metrics: Arc<GatewayMetrics>,
    timeout: Duration,
    in_flight: Arc<Mutex<HashMap<String, Flight>>>,
}

impl ColdStarter {
    async fn run(self, view: View, id: u64, detached: Arc<AtomicBool>) -> ColdStartResult {
        let name = view.name.clone();
        let key = name.as_str().to_string();
        let started = Instant::now();

        self.registry.set_state(&key, ViewState::Provisioning);
        self.metrics.record_cold_start();
        tracing::info!(view = %name, "Cold start begun");

        let result = self.provision(&view, &detached).await;

        match &result {
            Ok(endpoint) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_cold_start_complete(elapsed_ms);
                tracing::info!(view = %name, endpoint = %endpoint, elapsed_ms, "Cold start complete");
            }
            Err(e) => {
                self.metrics.record_cold_start_failure();
                tracing::warn!(
                    view = %name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Cold start failed"
                );
            }
        }

        // A detached entry may already have been replaced by a newer start
        let mut in_flight = self.in_flight.lock().unwrap();
        if in_flight.get(&key).is_some_and(|f| f.id == id) {
            in_flight.remove(&key);
        }
        drop(in_flight);
        result.map_err(Arc::new)
    }

    async fn provision(&self, view: &View, detached: &AtomicBool) -> Result<Endpoint> {
        let name = &view.name;
        self.provisioner.ensure(name, &view.subset).await?;

        // A delete may have torn the workload down while we were creating it
        if !self.still_wanted(name.as_str(), detached) {
            return self.abandon(name).await;
        }

        let wanted = || self.still_wanted(name.as_str(), detached);
        let endpoint = match self.waiter.wait_ready_while(name, self.timeout, wanted).await {
            Err(GatewayError::NoRoute(_)) => return self.abandon(name).await,
            other => other?,
        };

        if !self.still_wanted(name.as_str(), detached) {
            return self.abandon(name).await;
        }
        if !self.registry.mark_ready(name.as_str(), endpoint.clone()) {
            if !self.still_wanted(name.as_str(), detached) {
                return self.abandon(name).await;
            }
            // A resync already observed the endpoint
            if let Some(ep) = self.registry.get(name.as_str()).and_then(|v| v.endpoint) {
                return Ok(ep);
            }
        }
        Ok(endpoint)
    }

    fn still_wanted(&self, name: &str, detached: &AtomicBool) -> bool {
        !detached.load(Ordering::SeqCst)
            && matches!(
                self.registry.get(name).map(|v| v.state),
                Some(ViewState::Provisioning | ViewState::Ready)
            )
    }

    /// Stop a cold start whose view went away. The workload is torn down
    /// unless the view has been declared again in the meantime.
    async fn abandon(&self, name: &ViewName) -> Result<Endpoint> {
        let redeclared = self
            .registry
            .get(name.as_str())
            .is_some_and(|v| v.state != ViewState::Deleting);
        if !redeclared {
            self.provisioner.teardown(name).await?;
        }
        tracing::info!(view = %name, redeclared, "Cold start abandoned");
        Err(GatewayError::NoRoute(name.to_string()))
    }
}

/// Intercepts requests and cold-starts views on demand
pub struct AdmissionController {
    router: Arc<Router>,
    starter: ColdStarter,
    next_id: AtomicU64,
}

impl AdmissionController {
    pub fn new(
        router: Arc<Router>,
        registry: Arc<ViewRegistry>,
        provisioner: Arc<WorkloadProvisioner>,
        waiter: Arc<ReadinessWaiter>,
        metrics: Arc<GatewayMetrics>,
        timeout: Duration,
    ) -> Self {
        Self {
            router,
            starter: ColdStarter {
                registry,
                provisioner,
                waiter,
                metrics,
                timeout,
                in_flight: Arc::new(Mutex::new(HashMap::new())),
            },
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of cold starts currently running
    pub fn in_flight(&self) -> usize {
        self.starter.in_flight.lock().unwrap().len()
    }

    /// Forget the cold start running for `name`, if any.
    ///
    /// Requests already waiting on it get `NoRoute` once the task notices;
    /// the next request for the name starts a new cold start.
    pub fn detach(&self, name: &str) -> bool {
        let Some(flight) = self.starter.in_flight.lock().unwrap().remove(name) else {
            return false;
        };
        flight.detached.store(true, Ordering::SeqCst);
        tracing::debug!(view = %name, "Cold start detached");
        true
    }

    /// Classify a request and, for a view that is not ready, block until it is
    pub async fn admit(&self, host: Option<&str>, path: &str) -> Result<Admission> {
        if is_management_path(path) {
            return Ok(Admission::Local);
        }
        let Some(name) = host.and_then(|h| self.router.view_for_host(h)) else {
            return Ok(Admission::Local);
        };

        if !self.starter.registry.is_synced() {
            return Err(GatewayError::NotReconciled);
        }

        match self.router.lookup(&name) {
            RouteLookup::Ready(_) => Ok(Admission::Admitted {
                view: name,
                cold_start: false,
            }),
            RouteLookup::Unknown => {
                self.starter.metrics.record_no_route();
                tracing::info!(view = %name, "No route for view");
                Err(GatewayError::NoRoute(name))
            }
            RouteLookup::NotReady(view) => {
                self.cold_start(view).await.map_err(|e| replay(&e))?;
                Ok(Admission::Admitted {
                    view: name,
                    cold_start: true,
                })
            }
        }
    }

    /// Join the in-flight cold start for `view`, starting one if needed
    fn join_or_start(&self, view: View) -> ColdStart {
        let key = view.name.as_str().to_string();
        let mut in_flight = self.starter.in_flight.lock().unwrap();
        if let Some(existing) = in_flight.get(&key) {
            tracing::debug!(view = %key, "Joining in-flight cold start");
            return existing.start.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let detached = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(self.starter.clone().run(view, id, detached.clone()));
        let shared = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(Arc::new(GatewayError::Other(format!(
                    "cold start task failed: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();
        in_flight.insert(
            key,
            Flight {
                id,
                detached,
                start: shared.clone(),
            },
        );
        shared
    }

    async fn cold_start(&self, view: View) -> ColdStartResult {
        self.join_or_start(view).await
    }
}
