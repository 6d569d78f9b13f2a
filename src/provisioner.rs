//! Workload provisioner: creates and destroys the objects backing a view
//!
//! `ensure` and `teardown` are serialized per view name so that concurrent
//! callers never race each other into the control plane. Different views
//! never block one another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::retry::RetryPolicy;
use crate::view::{Subset, ViewName};

/// Creates and removes view workloads through an [`Orchestrator`]
pub struct WorkloadProvisioner {
    orchestrator: Arc<dyn Orchestrator>,
    retry: RetryPolicy,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WorkloadProvisioner {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, retry: RetryPolicy) -> Self {
        Self {
            orchestrator,
            retry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    fn lock_for(&self, name: &ViewName) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(name.as_str().to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry once nobody else holds a handle to it
    fn release(&self, name: &ViewName, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap();
        // One reference in the map, one held here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(name.as_str());
        }
    }

    /// Persist the view's declaration (its Service) without compute
    pub async fn declare(&self, name: &ViewName, subset: &Subset) -> Result<()> {
        let lock = self.lock_for(name);
        let result = {
            let _guard = lock.lock().await;
            self.retry
                .run("apply_service", || {
                    self.orchestrator.apply_service(name, subset)
                })
                .await
        };
        self.release(name, lock);
        result
    }

    /// Create the view's Service and Job, reusing whichever already exist
    pub async fn ensure(&self, name: &ViewName, subset: &Subset) -> Result<()> {
        let lock = self.lock_for(name);
        let started = Instant::now();
        let result = {
            let _guard = lock.lock().await;
            async {
                self.retry
                    .run("apply_service", || {
                        self.orchestrator.apply_service(name, subset)
                    })
                    .await?;
                self.retry
                    .run("apply_job", || self.orchestrator.apply_job(name, subset))
                    .await
            }
            .await
        };
        self.release(name, lock);

        match &result {
            Ok(()) => tracing::debug!(
                view = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Workload ensured"
            ),
            Err(e) => tracing::error!(view = %name, error = %e, "Failed to ensure workload"),
        }
        result
    }

    /// Delete the view's Job, then its Service. Absent objects are success.
    pub async fn teardown(&self, name: &ViewName) -> Result<()> {
        let lock = self.lock_for(name);
        let result = {
            let _guard = lock.lock().await;
            async {
                self.retry
                    .run("delete_job", || self.orchestrator.delete_job(name))
                    .await?;
                self.retry
                    .run("delete_service", || self.orchestrator.delete_service(name))
                    .await
            }
            .await
        };
        self.release(name, lock);

        match &result {
            Ok(()) => tracing::info!(view = %name, "Workload torn down"),
            Err(e) => tracing::error!(view = %name, error = %e, "Failed to tear down workload"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::InMemoryOrchestrator;
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryOrchestrator>, Arc<WorkloadProvisioner>) {
        let orch = Arc::new(InMemoryOrchestrator::default());
        let provisioner = Arc::new(WorkloadProvisioner::new(
            orch.clone(),
            RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
            },
        ));
        (orch, provisioner)
    }

    fn name(s: &str) -> ViewName {
        ViewName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_ensure_creates_service_and_job() {
        let (orch, provisioner) = setup();
        provisioner
            .ensure(&name("test01"), &Subset::cluster("dev"))
            .await
            .unwrap();
        assert!(orch.has_service("test01"));
        assert!(orch.has_job("test01"));
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (orch, provisioner) = setup();
        for _ in 0..3 {
            provisioner
                .ensure(&name("test01"), &Subset::cluster("dev"))
                .await
                .unwrap();
        }
        assert_eq!(orch.services_created(), 1);
        assert_eq!(orch.jobs_created(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_single_workload() {
        let (orch, provisioner) = setup();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let p = provisioner.clone();
            handles.push(tokio::spawn(async move {
                p.ensure(&name("race"), &Subset::cluster("dev")).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(orch.jobs_created(), 1);
        assert!(provisioner.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declare_creates_service_only() {
        let (orch, provisioner) = setup();
        provisioner
            .declare(&name("decl"), &Subset::cluster("dev"))
            .await
            .unwrap();
        assert!(orch.has_service("decl"));
        assert!(!orch.has_job("decl"));
    }

    #[tokio::test]
    async fn test_teardown_absent_is_ok() {
        let (orch, provisioner) = setup();
        provisioner.teardown(&name("missing")).await.unwrap();
        assert_eq!(orch.jobs_deleted(), 0);
    }

    #[tokio::test]
    async fn test_teardown_removes_both() {
        let (orch, provisioner) = setup();
        let n = name("test01");
        provisioner.ensure(&n, &Subset::cluster("dev")).await.unwrap();
        provisioner.teardown(&n).await.unwrap();
        assert!(!orch.has_job("test01"));
        assert!(!orch.has_service("test01"));
        assert_eq!(orch.jobs_deleted(), 1);
        assert_eq!(orch.services_deleted(), 1);
    }

    #[tokio::test]
    async fn test_ensure_surfaces_unavailable() {
        let (orch, provisioner) = setup();
        orch.set_unavailable(true);
        let err = provisioner
            .ensure(&name("test01"), &Subset::cluster("dev"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.status_code(), 503);
    }
}
