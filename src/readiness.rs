//! Readiness waiter: polls a view's endpoints until one is serving

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ColdStartConfig;
use crate::error::{GatewayError, Result};
use crate::orchestrator::Orchestrator;
use crate::view::{Endpoint, ViewName};

/// Waits for a provisioned workload to report a serving endpoint
pub struct ReadinessWaiter {
    orchestrator: Arc<dyn Orchestrator>,
    poll_interval: Duration,
}

impl ReadinessWaiter {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            poll_interval,
        }
    }

    pub fn from_config(orchestrator: Arc<dyn Orchestrator>, config: &ColdStartConfig) -> Self {
        Self::new(orchestrator, config.poll_interval())
    }

    /// Poll until the view has an endpoint or `timeout` elapses.
    ///
    /// Transient control-plane errors count as "not ready yet" and are
    /// retried on the next tick; the last one is logged on timeout.
    pub async fn wait_ready(&self, name: &ViewName, timeout: Duration) -> Result<Endpoint> {
        self.wait_ready_while(name, timeout, || true).await
    }

    /// Like [`wait_ready`](Self::wait_ready), but gives up with `NoRoute` as
    /// soon as `keep_waiting` returns false. It is checked before every poll.
    pub async fn wait_ready_while(
        &self,
        name: &ViewName,
        timeout: Duration,
        keep_waiting: impl Fn() -> bool,
    ) -> Result<Endpoint> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_error: Option<GatewayError> = None;

        loop {
            if !keep_waiting() {
                tracing::debug!(
                    view = %name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Stopped waiting for workload"
                );
                return Err(GatewayError::NoRoute(name.to_string()));
            }

            match self.orchestrator.ready_endpoints(name).await {
                Ok(endpoints) => {
                    if let Some(endpoint) = endpoints.into_iter().next() {
                        tracing::debug!(
                            view = %name,
                            endpoint = %endpoint,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Workload ready"
                        );
                        return Ok(endpoint);
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(view = %name, error = %e, "Readiness poll failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            if tokio::time::Instant::now() + self.poll_interval > deadline {
                let waited_ms = started.elapsed().as_millis() as u64;
                match last_error {
                    Some(e) => tracing::warn!(
                        view = %name,
                        waited_ms,
                        error = %e,
                        "Workload not ready before timeout"
                    ),
                    None => tracing::warn!(view = %name, waited_ms, "Workload not ready before timeout"),
                }
                return Err(GatewayError::ProvisioningTimeout {
                    view: name.to_string(),
                    waited_ms,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
