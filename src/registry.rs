//! View registry: read-mostly cache of views rebuilt from the control plane
//!
//! The registry is never the source of truth. On start and then periodically
//! it is reconciled against [`Orchestrator::list_views`]; local writes made
//! while a scan is in flight win over that scan's observations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::view::{Endpoint, View, ViewState};

#[derive(Debug, Clone)]
struct Entry {
    view: View,
    /// Last local write
    touched: Instant,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub discovered: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// In-memory view registry
pub struct ViewRegistry {
    views: RwLock<HashMap<String, Entry>>,
    synced: AtomicBool,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self {
            views: RwLock::new(HashMap::new()),
            synced: AtomicBool::new(false),
        }
    }

    pub fn get(&self, name: &str) -> Option<View> {
        self.views
            .read()
            .unwrap()
            .get(name)
            .map(|e| e.view.clone())
    }

    /// All views, sorted by name
    pub fn list(&self) -> Vec<View> {
        let mut views: Vec<View> = self
            .views
            .read()
            .unwrap()
            .values()
            .map(|e| e.view.clone())
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        views
    }

    pub fn len(&self) -> usize {
        self.views.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a view
    pub fn upsert(&self, view: View) {
        self.views.write().unwrap().insert(
            view.name.as_str().to_string(),
            Entry {
                view,
                touched: Instant::now(),
            },
        );
    }

    /// Insert `view` unless the name is taken. Returns the stored view and
    /// whether it was inserted.
    pub fn insert_if_absent(&self, view: View) -> (View, bool) {
        let mut views = self.views.write().unwrap();
        if let Some(existing) = views.get(view.name.as_str()) {
            return (existing.view.clone(), false);
        }
        views.insert(
            view.name.as_str().to_string(),
            Entry {
                view: view.clone(),
                touched: Instant::now(),
            },
        );
        (view, true)
    }

    pub fn remove(&self, name: &str) -> Option<View> {
        self.views.write().unwrap().remove(name).map(|e| e.view)
    }

    /// Move a view along its lifecycle. Returns `false` when the view is
    /// unknown or the transition is not allowed.
    pub fn set_state(&self, name: &str, next: ViewState) -> bool {
        let mut views = self.views.write().unwrap();
        let Some(entry) = views.get_mut(name) else {
            return false;
        };
        let current = entry.view.state;
        if !current.can_transition_to(next) {
            tracing::debug!(view = name, from = %current, to = %next, "Rejected state transition");
            return false;
        }
        entry.view.state = next;
        if next != ViewState::Ready {
            entry.view.endpoint = None;
        }
        entry.touched = Instant::now();
        tracing::debug!(view = name, from = %current, to = %next, "View state transition");
        true
    }

    /// Record a ready endpoint; the view must be provisioning
    pub fn mark_ready(&self, name: &str, endpoint: Endpoint) -> bool {
        let mut views = self.views.write().unwrap();
        let Some(entry) = views.get_mut(name) else {
            return false;
        };
        if !entry.view.state.can_transition_to(ViewState::Ready) {
            return false;
        }
        entry.view.state = ViewState::Ready;
        entry.view.endpoint = Some(endpoint);
        entry.touched = Instant::now();
        true
    }

    /// Whether at least one reconciliation has succeeded
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Rebuild from the control plane. Read-only against the orchestrator.
    ///
    /// - discovered views replace local entries, except entries written after
    ///   the scan started and entries in `deleting`, and except that an
    ///   in-flight `provisioning` entry is only replaced by a ready one
    /// - local entries missing from the control plane are dropped when they
    ///   are `absent` or `ready`
    pub async fn reconcile(&self, orchestrator: &dyn Orchestrator) -> Result<ReconcileStats> {
        let started = Instant::now();
        let discovered = orchestrator.list_views().await?;

        let mut stats = ReconcileStats {
            discovered: discovered.len(),
            ..ReconcileStats::default()
        };

        let mut views = self.views.write().unwrap();
        let mut seen = Vec::with_capacity(discovered.len());

        for d in discovered {
            let key = d.name.as_str().to_string();
            seen.push(key.clone());
            let observed = d.into_view();

            match views.get_mut(&key) {
                None => {
                    views.insert(
                        key,
                        Entry {
                            view: observed,
                            touched: started,
                        },
                    );
                    stats.added += 1;
                }
                Some(entry) => {
                    if entry.touched > started {
                        continue;
                    }
                    let keep = match entry.view.state {
                        ViewState::Deleting => true,
                        ViewState::Provisioning => observed.state != ViewState::Ready,
                        _ => false,
                    };
                    if !keep && entry.view != observed {
                        entry.view = observed;
                        stats.updated += 1;
                    }
                }
            }
        }

        views.retain(|name, entry| {
            if seen.contains(name) || entry.touched > started {
                return true;
            }
            match entry.view.state {
                ViewState::Absent | ViewState::Ready => {
                    tracing::info!(view = %name, "View no longer in control plane");
                    stats.removed += 1;
                    false
                }
                ViewState::Provisioning | ViewState::Deleting => true,
            }
        });
        drop(views);

        if !self.synced.swap(true, Ordering::AcqRel) {
            tracing::info!(views = self.len(), "View registry synced");
        }
        Ok(stats)
    }

    /// Reconcile until the first success, backing off exponentially
    pub async fn reconcile_until_synced(
        &self,
        orchestrator: &dyn Orchestrator,
        config: &ReconcileConfig,
    ) -> ReconcileStats {
        let max = Duration::from_millis(config.max_backoff_ms);
        let mut backoff = Duration::from_millis(config.initial_backoff_ms);
        loop {
            match self.reconcile(orchestrator).await {
                Ok(stats) => return stats,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Initial reconcile failed, routing stays disabled"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max);
                }
            }
        }
    }

    /// Spawn the startup reconcile followed by a periodic resync
    pub fn spawn_sync(
        self: Arc<Self>,
        orchestrator: Arc<dyn Orchestrator>,
        config: ReconcileConfig,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let stats = self
                .reconcile_until_synced(orchestrator.as_ref(), &config)
                .await;
            tracing::info!(
                discovered = stats.discovered,
                added = stats.added,
                "Startup reconcile complete"
            );

            let interval = config.resync_interval();
            loop {
                tokio::time::sleep(interval).await;
                match self.reconcile(orchestrator.as_ref()).await {
                    Ok(stats) if stats.added + stats.updated + stats.removed > 0 => {
                        tracing::info!(
                            added = stats.added,
                            updated = stats.updated,
                            removed = stats.removed,
                            "View registry resynced"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to resync view registry");
                    }
                }
            }
        })
    }
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::InMemoryOrchestrator;
    use crate::view::{Subset, ViewName};

    fn view(name: &str) -> View {
        View::declared(ViewName::parse(name).unwrap(), Subset::cluster("dev"))
    }

    fn vname(name: &str) -> ViewName {
        ViewName::parse(name).unwrap()
    }

    #[test]
    fn test_upsert_get_remove() {
        let registry = ViewRegistry::new();
        assert!(registry.is_empty());

        registry.upsert(view("abc"));
        assert_eq!(registry.get("abc").unwrap().state, ViewState::Absent);
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("abc").is_some());
        assert!(registry.get("abc").is_none());
        assert!(registry.remove("abc").is_none());
    }

    #[test]
    fn test_list_sorted() {
        let registry = ViewRegistry::new();
        registry.upsert(view("zzz"));
        registry.upsert(view("aaa"));
        registry.upsert(view("mmm"));
        let names: Vec<_> = registry
            .list()
            .into_iter()
            .map(|v| v.name.to_string())
            .collect();
        assert_eq!(names, vec!["aaa", "mmm", "zzz"]);
    }

    #[test]
    fn test_insert_if_absent() {
        let registry = ViewRegistry::new();
        let (_, inserted) = registry.insert_if_absent(view("abc"));
        assert!(inserted);

        let mut other = view("abc");
        other.subset = Subset::cluster("prod");
        let (stored, inserted) = registry.insert_if_absent(other);
        assert!(!inserted);
        assert_eq!(stored.subset.cluster, "dev");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let registry = ViewRegistry::new();
        registry.upsert(view("abc"));

        assert!(!registry.mark_ready("abc", Endpoint::new("10.0.0.1", 8080)));
        assert!(registry.set_state("abc", ViewState::Provisioning));
        assert!(registry.mark_ready("abc", Endpoint::new("10.0.0.1", 8080)));
        assert!(registry.get("abc").unwrap().is_ready());

        assert!(!registry.set_state("abc", ViewState::Provisioning));
        assert!(registry.set_state("abc", ViewState::Deleting));
        assert!(registry.get("abc").unwrap().endpoint.is_none());
        assert!(!registry.set_state("missing", ViewState::Provisioning));
    }

    #[tokio::test]
    async fn test_reconcile_rebuilds_from_control_plane() {
        let orch = InMemoryOrchestrator::new(Endpoint::new("10.0.0.7", 8080));
        orch.apply_service(&vname("decl"), &Subset::cluster("dev"))
            .await
            .unwrap();
        orch.apply_service(&vname("live"), &Subset::cluster("dev"))
            .await
            .unwrap();
        orch.apply_job(&vname("live"), &Subset::cluster("dev"))
            .await
            .unwrap();

        let registry = ViewRegistry::new();
        assert!(!registry.is_synced());
        let stats = registry.reconcile(&orch).await.unwrap();
        assert!(registry.is_synced());
        assert_eq!(stats.discovered, 2);
        assert_eq!(stats.added, 2);

        assert_eq!(registry.get("decl").unwrap().state, ViewState::Absent);
        let live = registry.get("live").unwrap();
        assert!(live.is_ready());
        assert_eq!(live.endpoint, Some(Endpoint::new("10.0.0.7", 8080)));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let orch = InMemoryOrchestrator::default();
        orch.apply_service(&vname("abc"), &Subset::cluster("dev"))
            .await
            .unwrap();

        let registry = ViewRegistry::new();
        registry.reconcile(&orch).await.unwrap();
        let second = registry.reconcile(&orch).await.unwrap();
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.removed, 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(orch.services_created(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_drops_externally_deleted() {
        let orch = InMemoryOrchestrator::default();
        orch.apply_service(&vname("abc"), &Subset::cluster("dev"))
            .await
            .unwrap();
        let registry = ViewRegistry::new();
        registry.reconcile(&orch).await.unwrap();

        orch.delete_service(&vname("abc")).await.unwrap();
        let stats = registry.reconcile(&orch).await.unwrap();
        assert_eq!(stats.removed, 1);
        assert!(registry.get("abc").is_none());
    }

    #[tokio::test]
    async fn test_reconcile_keeps_in_flight_entries() {
        let orch = InMemoryOrchestrator::default();
        let registry = ViewRegistry::new();
        registry.upsert(view("prov"));
        registry.set_state("prov", ViewState::Provisioning);
        registry.upsert(view("gone"));
        registry.set_state("gone", ViewState::Deleting);

        // Entries written before the scan started
        tokio::time::sleep(Duration::from_millis(5)).await;
        registry.reconcile(&orch).await.unwrap();

        assert_eq!(registry.get("prov").unwrap().state, ViewState::Provisioning);
        assert_eq!(registry.get("gone").unwrap().state, ViewState::Deleting);
    }

    #[tokio::test]
    async fn test_reconcile_does_not_downgrade_provisioning() {
        let orch = InMemoryOrchestrator::default();
        orch.hold_readiness(true);
        orch.apply_service(&vname("abc"), &Subset::cluster("dev"))
            .await
            .unwrap();

        let registry = ViewRegistry::new();
        registry.upsert(view("abc"));
        registry.set_state("abc", ViewState::Provisioning);
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Control plane shows a declaration only; the cold start owns the entry
        registry.reconcile(&orch).await.unwrap();
        assert_eq!(registry.get("abc").unwrap().state, ViewState::Provisioning);
    }

    #[tokio::test]
    async fn test_reconcile_failure_leaves_unsynced() {
        let orch = InMemoryOrchestrator::default();
        orch.set_unavailable(true);
        let registry = ViewRegistry::new();
        assert!(registry.reconcile(&orch).await.is_err());
        assert!(!registry.is_synced());
    }

    #[tokio::test]
    async fn test_reconcile_until_synced_retries() {
        let orch = Arc::new(InMemoryOrchestrator::default());
        orch.set_unavailable(true);
        let registry = Arc::new(ViewRegistry::new());
        let config = ReconcileConfig {
            resync_interval_secs: 30,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
        };

        let handle = registry.clone().spawn_sync(orch.clone(), config);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!registry.is_synced());

        orch.set_unavailable(false);
        for _ in 0..100 {
            if registry.is_synced() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(registry.is_synced());
        handle.abort();
    }
}
