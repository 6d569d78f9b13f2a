//! Gateway orchestrator: high-level coordinator for all gateway components
//!
//! Ties together configuration, the view registry, cold-start admission, the
//! management API and the HTTP entrypoint into a single manageable unit.

use crate::admission::AdmissionController;
use crate::api::ManagementApi;
use crate::config::GatewayConfig;
use crate::entrypoint::{self, ServerState};
use crate::error::{GatewayError, Result};
use crate::observability::{AccessLog, GatewayMetrics};
use crate::orchestrator::{self, Orchestrator};
use crate::provisioner::WorkloadProvisioner;
use crate::proxy::HttpProxy;
use crate::readiness::ReadinessWaiter;
use crate::registry::ViewRegistry;
use crate::retry::RetryPolicy;
use crate::router::Router;
use crate::{GatewayState, HealthStatus};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// The main Gateway: coordinates all components
pub struct Gateway {
    /// Current configuration
    config: GatewayConfig,
    /// Gateway runtime state
    state: Arc<RwLock<GatewayState>>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
    /// Metrics collector
    metrics: Arc<GatewayMetrics>,
    registry: Arc<ViewRegistry>,
    orchestrator: Arc<dyn Orchestrator>,
    server: Arc<ServerState>,
    /// Bound listener address, once started
    local_addr: RwLock<Option<SocketAddr>>,
    /// Listener and resync task handles
    handles: RwLock<Vec<tokio::task::JoinHandle<()>>>,
}

impl Gateway {
    /// Create a gateway over an explicit orchestrator backend
    pub fn new(config: GatewayConfig, orchestrator: Arc<dyn Orchestrator>) -> Result<Self> {
        config.validate()?;

        let state = Arc::new(RwLock::new(GatewayState::Created));
        let metrics = Arc::new(GatewayMetrics::new());
        let registry = Arc::new(ViewRegistry::new());
        let router = Arc::new(Router::new(config.hostname.clone(), registry.clone()));
        let provisioner = Arc::new(WorkloadProvisioner::new(
            orchestrator.clone(),
            RetryPolicy::from_config(&config.retry),
        ));
        let waiter = Arc::new(ReadinessWaiter::from_config(
            orchestrator.clone(),
            &config.cold_start,
        ));
        let admission = Arc::new(AdmissionController::new(
            router.clone(),
            registry.clone(),
            provisioner.clone(),
            waiter,
            metrics.clone(),
            config.cold_start.timeout(),
        ));
        let api = Arc::new(ManagementApi::new(
            registry.clone(),
            provisioner,
            admission.clone(),
            metrics.clone(),
            state.clone(),
        ));

        let server = Arc::new(ServerState {
            admission,
            router,
            api,
            http_proxy: Arc::new(HttpProxy::from_config(&config.proxy)),
            metrics: metrics.clone(),
            access_log: Arc::new(AccessLog::new()),
        });

        Ok(Self {
            config,
            state,
            shutdown: Arc::new(AtomicBool::new(false)),
            metrics,
            registry,
            orchestrator,
            server,
            local_addr: RwLock::new(None),
            handles: RwLock::new(Vec::new()),
        })
    }

    /// Create a gateway with the orchestrator backend the configuration selects
    pub async fn from_config(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let orchestrator = orchestrator::from_config(&config).await?;
        Self::new(config, orchestrator)
    }

    /// Start the gateway: binds the listener, then reconciles in the background.
    ///
    /// Traffic for views is answered with 503 until the first reconcile
    /// succeeds; the management API answers immediately.
    pub async fn start(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(GatewayError::Other("Gateway already shut down".to_string()));
        }
        self.set_state(GatewayState::Starting);

        let listener = entrypoint::bind(self.config.listen_addr()?).await?;
        let addr = listener.local_addr()?;
        *self.local_addr.write().unwrap() = Some(addr);

        let sync = self.registry.clone().spawn_sync(
            self.orchestrator.clone(),
            self.config.reconcile.clone(),
        );
        let http = entrypoint::start_http_entrypoint(listener, self.server.clone());

        self.handles.write().unwrap().extend([sync, http]);

        self.set_state(GatewayState::Running);
        tracing::info!(
            address = %addr,
            hostname = %self.config.hostname,
            orchestrator = self.orchestrator.name(),
            "Gateway started"
        );
        Ok(())
    }

    /// Initiate graceful shutdown
    ///
    /// Stops accepting connections, then waits up to `shutdown_timeout_secs`
    /// for open connections to drain.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return; // Already shutting down
        }

        self.set_state(GatewayState::Stopping);
        tracing::info!("Gateway shutting down");

        let handles: Vec<_> = self.handles.write().unwrap().drain(..).collect();
        for handle in handles {
            handle.abort();
        }

        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.shutdown_timeout_secs);
        while self.metrics.active_connections() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let remaining = self.metrics.active_connections();
        if remaining > 0 {
            tracing::warn!(connections = remaining, "Shutdown timeout with open connections");
        }

        self.set_state(GatewayState::Stopped);
        tracing::info!("Gateway stopped");
    }

    /// Wait for a shutdown signal (Ctrl+C or SIGTERM)
    pub async fn wait_for_shutdown(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C"),
            _ = terminate => tracing::info!("Received SIGTERM"),
        }
        self.shutdown().await;
    }

    /// Get the current gateway state
    pub fn state(&self) -> GatewayState {
        self.state.read().unwrap().clone()
    }

    /// Get a health status snapshot
    pub fn health(&self) -> HealthStatus {
        self.server.api.health()
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Get the view registry
    pub fn registry(&self) -> &Arc<ViewRegistry> {
        &self.registry
    }

    /// Get the current configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().unwrap()
    }

    /// Check if the gateway is running
    pub fn is_running(&self) -> bool {
        self.state() == GatewayState::Running
    }

    /// Check if shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn set_state(&self, new_state: GatewayState) {
        let mut state = self.state.write().unwrap();
        tracing::debug!(from = %*state, to = %new_state, "State transition");
        *state = new_state;
    }
}
