//! In-process orchestrator
//!
//! Keeps Services and Jobs in a map and resolves every ready view to a fixed
//! endpoint. Used for local development (`orchestrator = "memory"`) and as
//! the control-plane double in tests, where its counters let callers assert
//! that no duplicate workloads were created.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use super::{DiscoveredView, Orchestrator};
use crate::config::MemoryConfig;
use crate::error::{GatewayError, Result};
use crate::view::{Endpoint, Subset, ViewName};

#[derive(Debug, Clone)]
struct Objects {
    subset: Subset,
    service: bool,
    job: bool,
    /// The Job's pod has exited
    finished: bool,
    /// Readiness polls seen since the Job was created
    polls: u32,
}

/// Orchestrator that keeps view objects in memory
pub struct InMemoryOrchestrator {
    objects: Mutex<HashMap<ViewName, Objects>>,
    endpoint: Mutex<Endpoint>,
    ready_after_polls: AtomicU32,
    hold_readiness: AtomicBool,
    unavailable: AtomicBool,
    services_created: AtomicU32,
    jobs_created: AtomicU32,
    services_deleted: AtomicU32,
    jobs_deleted: AtomicU32,
}

impl InMemoryOrchestrator {
    /// Create an orchestrator whose workloads resolve to `endpoint`
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            endpoint: Mutex::new(endpoint),
            ready_after_polls: AtomicU32::new(0),
            hold_readiness: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            services_created: AtomicU32::new(0),
            jobs_created: AtomicU32::new(0),
            services_deleted: AtomicU32::new(0),
            jobs_deleted: AtomicU32::new(0),
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        let addr: SocketAddr = config.endpoint.parse().map_err(|e| {
            GatewayError::Config(format!(
                "Invalid memory.endpoint '{}': {}",
                config.endpoint, e
            ))
        })?;
        let orchestrator = Self::new(Endpoint::new(addr.ip().to_string(), addr.port()));
        orchestrator.set_ready_after_polls(config.ready_after_polls);
        Ok(orchestrator)
    }

    /// Number of empty readiness polls a new Job reports before serving
    pub fn set_ready_after_polls(&self, polls: u32) {
        self.ready_after_polls.store(polls, Ordering::SeqCst);
    }

    /// While held, no workload reports ready endpoints
    pub fn hold_readiness(&self, hold: bool) {
        self.hold_readiness.store(hold, Ordering::SeqCst);
    }

    /// Make every call fail as if the control plane were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_endpoint(&self, endpoint: Endpoint) {
        *self.endpoint.lock().unwrap() = endpoint;
    }

    pub fn services_created(&self) -> u32 {
        self.services_created.load(Ordering::SeqCst)
    }

    pub fn jobs_created(&self) -> u32 {
        self.jobs_created.load(Ordering::SeqCst)
    }

    pub fn services_deleted(&self) -> u32 {
        self.services_deleted.load(Ordering::SeqCst)
    }

    pub fn jobs_deleted(&self) -> u32 {
        self.jobs_deleted.load(Ordering::SeqCst)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .any(|(n, o)| n.as_str() == name && o.service)
    }

    /// Mark the view's Job as run to completion, as if its pod had exited
    pub fn finish_job(&self, name: &str) {
        let mut objects = self.objects.lock().unwrap();
        if let Some((_, o)) = objects.iter_mut().find(|(n, o)| n.as_str() == name && o.job) {
            o.finished = true;
        }
    }

    pub fn has_job(&self, name: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .any(|(n, o)| n.as_str() == name && o.job)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::OrchestrationUnavailable(
                "in-memory control plane marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn serving(&self, objects: &Objects) -> bool {
        objects.job
            && !objects.finished
            && !self.hold_readiness.load(Ordering::SeqCst)
            && objects.polls >= self.ready_after_polls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryOrchestrator {
    fn default() -> Self {
        Self::new(Endpoint::new("127.0.0.1", 9000))
    }
}

#[async_trait]
impl Orchestrator for InMemoryOrchestrator {
    async fn list_views(&self) -> Result<Vec<DiscoveredView>> {
        self.check_available()?;
        let endpoint = self.endpoint.lock().unwrap().clone();
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(_, o)| o.service || o.job)
            .map(|(name, o)| DiscoveredView {
                name: name.clone(),
                subset: o.subset.clone(),
                has_job: o.job && !o.finished,
                endpoints: if self.serving(o) {
                    vec![endpoint.clone()]
                } else {
                    vec![]
                },
            })
            .collect())
    }

    async fn apply_service(&self, name: &ViewName, subset: &Subset) -> Result<()> {
        self.check_available()?;
        let mut objects = self.objects.lock().unwrap();
        let entry = objects.entry(name.clone()).or_insert_with(|| Objects {
            subset: subset.clone(),
            service: false,
            job: false,
            finished: false,
            polls: 0,
        });
        if entry.service {
            tracing::debug!(view = %name, "Service already exists");
            return Ok(());
        }
        entry.service = true;
        entry.subset = subset.clone();
        self.services_created.fetch_add(1, Ordering::SeqCst);
        tracing::info!(view = %name, "Service created");
        Ok(())
    }

    async fn apply_job(&self, name: &ViewName, subset: &Subset) -> Result<()> {
        self.check_available()?;
        let mut objects = self.objects.lock().unwrap();
        let entry = objects.entry(name.clone()).or_insert_with(|| Objects {
            subset: subset.clone(),
            service: false,
            job: false,
            finished: false,
            polls: 0,
        });
        if entry.job && !entry.finished {
            tracing::debug!(view = %name, "Job already exists");
            return Ok(());
        }
        if entry.finished {
            tracing::info!(view = %name, "Replacing finished Job");
            self.jobs_deleted.fetch_add(1, Ordering::SeqCst);
        }
        entry.job = true;
        entry.finished = false;
        entry.polls = 0;
        self.jobs_created.fetch_add(1, Ordering::SeqCst);
        tracing::info!(view = %name, "Job created");
        Ok(())
    }

    async fn delete_job(&self, name: &ViewName) -> Result<()> {
        self.check_available()?;
        let mut objects = self.objects.lock().unwrap();
        if let Some(entry) = objects.get_mut(name) {
            if entry.job {
                entry.job = false;
                entry.finished = false;
                self.jobs_deleted.fetch_add(1, Ordering::SeqCst);
                tracing::info!(view = %name, "Job deleted");
            }
            if !entry.service {
                objects.remove(name);
            }
        }
        Ok(())
    }

    async fn delete_service(&self, name: &ViewName) -> Result<()> {
        self.check_available()?;
        let mut objects = self.objects.lock().unwrap();
        if let Some(entry) = objects.get_mut(name) {
            if entry.service {
                entry.service = false;
                self.services_deleted.fetch_add(1, Ordering::SeqCst);
                tracing::info!(view = %name, "Service deleted");
            }
            if !entry.job {
                objects.remove(name);
            }
        }
        Ok(())
    }

    async fn ready_endpoints(&self, name: &ViewName) -> Result<Vec<Endpoint>> {
        self.check_available()?;
        let endpoint = self.endpoint.lock().unwrap().clone();
        let mut objects = self.objects.lock().unwrap();
        let Some(entry) = objects.get_mut(name) else {
            return Ok(vec![]);
        };
        if !entry.job {
            return Ok(vec![]);
        }
        let ready = self.serving(entry);
        entry.polls = entry.polls.saturating_add(1);
        Ok(if ready { vec![endpoint] } else { vec![] })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ViewName {
        ViewName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let orch = InMemoryOrchestrator::default();
        let n = name("test01");
        let subset = Subset::cluster("dev");

        orch.apply_service(&n, &subset).await.unwrap();
        orch.apply_service(&n, &subset).await.unwrap();
        orch.apply_job(&n, &subset).await.unwrap();
        orch.apply_job(&n, &subset).await.unwrap();

        assert_eq!(orch.services_created(), 1);
        assert_eq!(orch.jobs_created(), 1);
        assert!(orch.has_service("test01"));
        assert!(orch.has_job("test01"));
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let orch = InMemoryOrchestrator::default();
        let n = name("missing");
        orch.delete_job(&n).await.unwrap();
        orch.delete_service(&n).await.unwrap();
        assert_eq!(orch.jobs_deleted(), 0);
        assert_eq!(orch.services_deleted(), 0);
    }

    #[tokio::test]
    async fn test_list_views_derives_objects() {
        let orch = InMemoryOrchestrator::new(Endpoint::new("10.1.1.1", 8080));
        orch.apply_service(&name("decl"), &Subset::cluster("dev"))
            .await
            .unwrap();
        orch.apply_service(&name("live"), &Subset::cluster("prod"))
            .await
            .unwrap();
        orch.apply_job(&name("live"), &Subset::cluster("prod"))
            .await
            .unwrap();

        let mut views = orch.list_views().await.unwrap();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].name.as_str(), "decl");
        assert!(!views[0].has_job);
        assert!(views[0].endpoints.is_empty());
        assert_eq!(views[1].name.as_str(), "live");
        assert_eq!(views[1].subset.cluster, "prod");
        assert_eq!(views[1].endpoints, vec![Endpoint::new("10.1.1.1", 8080)]);
    }

    #[tokio::test]
    async fn test_ready_after_polls() {
        let orch = InMemoryOrchestrator::default();
        orch.set_ready_after_polls(2);
        let n = name("slow");
        orch.apply_job(&n, &Subset::cluster("dev")).await.unwrap();

        assert!(orch.ready_endpoints(&n).await.unwrap().is_empty());
        assert!(orch.ready_endpoints(&n).await.unwrap().is_empty());
        assert_eq!(orch.ready_endpoints(&n).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hold_readiness() {
        let orch = InMemoryOrchestrator::default();
        orch.hold_readiness(true);
        let n = name("held");
        orch.apply_job(&n, &Subset::cluster("dev")).await.unwrap();
        assert!(orch.ready_endpoints(&n).await.unwrap().is_empty());

        orch.hold_readiness(false);
        assert_eq!(orch.ready_endpoints(&n).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_endpoints_without_job() {
        let orch = InMemoryOrchestrator::default();
        let n = name("decl");
        orch.apply_service(&n, &Subset::cluster("dev")).await.unwrap();
        assert!(orch.ready_endpoints(&n).await.unwrap().is_empty());
        assert!(!orch.has_job("decl"));
    }

    #[tokio::test]
    async fn test_finished_job_is_replaced() {
        let orch = InMemoryOrchestrator::new(Endpoint::new("10.1.1.1", 8080));
        let n = name("done");
        let subset = Subset::cluster("dev");
        orch.apply_service(&n, &subset).await.unwrap();
        orch.apply_job(&n, &subset).await.unwrap();
        assert_eq!(orch.ready_endpoints(&n).await.unwrap().len(), 1);

        orch.finish_job("done");
        assert!(orch.ready_endpoints(&n).await.unwrap().is_empty());
        let views = orch.list_views().await.unwrap();
        assert!(!views[0].has_job);
        assert_eq!(views[0].state(), crate::view::ViewState::Absent);

        orch.apply_job(&n, &subset).await.unwrap();
        assert_eq!(orch.jobs_created(), 2);
        assert_eq!(orch.jobs_deleted(), 1);
        assert_eq!(orch.ready_endpoints(&n).await.unwrap().len(), 1);
        assert!(orch.list_views().await.unwrap()[0].has_job);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let orch = InMemoryOrchestrator::default();
        orch.set_unavailable(true);
        let err = orch.list_views().await.unwrap_err();
        assert!(err.is_transient());

        orch.set_unavailable(false);
        assert!(orch.list_views().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_from_listing() {
        let orch = InMemoryOrchestrator::default();
        let n = name("gone");
        orch.apply_service(&n, &Subset::cluster("dev")).await.unwrap();
        orch.apply_job(&n, &Subset::cluster("dev")).await.unwrap();

        orch.delete_job(&n).await.unwrap();
        orch.delete_service(&n).await.unwrap();

        assert!(orch.list_views().await.unwrap().is_empty());
        assert_eq!(orch.jobs_deleted(), 1);
        assert_eq!(orch.services_deleted(), 1);
    }

    #[test]
    fn test_from_config() {
        let orch = InMemoryOrchestrator::from_config(&MemoryConfig {
            endpoint: "127.0.0.1:9100".to_string(),
            ready_after_polls: 3,
        })
        .unwrap();
        assert_eq!(orch.endpoint.lock().unwrap().port, 9100);
        assert_eq!(orch.ready_after_polls.load(Ordering::SeqCst), 3);

        assert!(InMemoryOrchestrator::from_config(&MemoryConfig {
            endpoint: "nope".to_string(),
            ready_after_polls: 0,
        })
        .is_err());
    }
}
