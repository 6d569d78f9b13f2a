//! Kubernetes orchestrator
//!
//! A view is a headless Service (its declaration and network identity) plus
//! a one-shot Job (its compute), both named `<prefix><view>` and labelled
//! `app=<app_label>` and `<view_label>=<view>`. Readiness comes from the
//! Service's EndpointSlices.
//!
//! Feature-gated behind `kube`. Object assembly and discovery logic work on
//! local records so they are testable without a cluster.

#![cfg_attr(not(feature = "kube"), allow(dead_code))]

use serde_json::json;
use std::collections::BTreeMap;

use super::DiscoveredView;
use crate::config::{KubernetesConfig, WorkloadConfig};
use crate::view::{Endpoint, Subset, ViewName};

/// Label set by the EndpointSlice controller naming the owning Service
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

// -----------------------------------------------------------------------
// Local records: the parts of Services, Jobs and EndpointSlices we read
// -----------------------------------------------------------------------

/// Metadata of a labelled Service or Job
#[derive(Debug, Clone, Default)]
pub struct ObjectRecord {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Jobs only: the Job completed or failed and will not serve again
    pub finished: bool,
}

/// Serving addresses of one EndpointSlice
#[derive(Debug, Clone, Default)]
pub struct SliceRecord {
    /// Value of `kubernetes.io/service-name`
    pub service: String,
    pub port: Option<u16>,
    pub serving_addresses: Vec<String>,
}

/// View name of a managed object: the view label, else the object name minus the prefix
fn view_name_of(k8s: &KubernetesConfig, object: &ObjectRecord) -> Option<ViewName> {
    let raw = object
        .labels
        .get(&k8s.view_label)
        .map(String::as_str)
        .or_else(|| k8s.view_from_object_name(&object.name))?;
    match ViewName::parse(raw) {
        Ok(name) => Some(name),
        Err(e) => {
            tracing::warn!(object = %object.name, error = %e, "Skipping object with invalid view name");
            None
        }
    }
}

fn subset_of(k8s: &KubernetesConfig, object: &ObjectRecord) -> Subset {
    let cluster = object
        .annotations
        .get(&k8s.cluster_annotation)
        .cloned()
        .unwrap_or_default();
    let namespace = object
        .annotations
        .get(&k8s.namespace_annotation)
        .filter(|ns| !ns.is_empty())
        .cloned();
    Subset {
        cluster,
        namespace,
        ..Subset::default()
    }
}

/// Serving endpoints across slices, using `default_port` for slices without ports
pub fn slice_endpoints(slices: &[SliceRecord], default_port: u16) -> Vec<Endpoint> {
    slices
        .iter()
        .flat_map(|slice| {
            let port = slice.port.unwrap_or(default_port);
            slice
                .serving_addresses
                .iter()
                .map(move |addr| Endpoint::new(addr.clone(), port))
        })
        .collect()
}

/// Merge Services, Jobs and EndpointSlices into one record per view
pub fn assemble_views(
    k8s: &KubernetesConfig,
    default_port: u16,
    services: &[ObjectRecord],
    jobs: &[ObjectRecord],
    slices: &[SliceRecord],
) -> Vec<DiscoveredView> {
    let mut views: BTreeMap<ViewName, DiscoveredView> = BTreeMap::new();

    for service in services {
        if let Some(name) = view_name_of(k8s, service) {
            views.insert(
                name.clone(),
                DiscoveredView {
                    name,
                    subset: subset_of(k8s, service),
                    has_job: false,
                    endpoints: vec![],
                },
            );
        }
    }

    // A Job without its Service still counts; it was created before the
    // Service or the Service was removed out of band.
    for job in jobs {
        if let Some(name) = view_name_of(k8s, job) {
            let view = views.entry(name.clone()).or_insert_with(|| DiscoveredView {
                name,
                subset: subset_of(k8s, job),
                has_job: false,
                endpoints: vec![],
            });
            // A finished Job is replaced on the next cold start
            view.has_job |= !job.finished;
        }
    }

    for view in views.values_mut() {
        let object = k8s.object_name(view.name.as_str());
        let owned: Vec<SliceRecord> = slices
            .iter()
            .filter(|s| s.service == object)
            .cloned()
            .collect();
        view.endpoints = slice_endpoints(&owned, default_port);
    }

    views.into_values().collect()
}

fn labels(k8s: &KubernetesConfig, name: &ViewName) -> serde_json::Value {
    json!({
        "app": k8s.app_label,
        k8s.view_label.as_str(): name.as_str(),
    })
}

fn annotations(k8s: &KubernetesConfig, subset: &Subset) -> serde_json::Value {
    json!({
        k8s.cluster_annotation.as_str(): subset.cluster,
        k8s.namespace_annotation.as_str(): subset.namespace.clone().unwrap_or_default(),
    })
}

/// Headless Service manifest for a view
pub fn service_manifest(
    k8s: &KubernetesConfig,
    workload: &WorkloadConfig,
    name: &ViewName,
    subset: &Subset,
) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": k8s.object_name(name.as_str()),
            "namespace": k8s.namespace,
            "labels": labels(k8s, name),
            "annotations": annotations(k8s, subset),
        },
        "spec": {
            "clusterIP": "None",
            "publishNotReadyAddresses": true,
            "selector": { k8s.view_label.as_str(): name.as_str() },
            "ports": [{
                "name": "http",
                "port": workload.port,
                "targetPort": workload.port,
            }],
        },
    })
}

fn container_manifest(container: &crate::config::ContainerConfig) -> serde_json::Value {
    let mut spec = json!({
        "name": container.name,
        "image": container.image,
    });
    if let Some(policy) = &container.pull_policy {
        spec["imagePullPolicy"] = json!(policy);
    }
    if let Some(port) = container.port {
        spec["ports"] = json!([{ "name": "http", "containerPort": port }]);
        if let Some(path) = &container.readiness_path {
            spec["readinessProbe"] = json!({
                "httpGet": { "path": path, "port": port },
                "initialDelaySeconds": 5,
                "periodSeconds": 5,
            });
        }
    }
    if !container.volume_mounts.is_empty() {
        spec["volumeMounts"] = container
            .volume_mounts
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "mountPath": m.mount_path,
                    "readOnly": m.read_only,
                })
            })
            .collect();
    }
    spec
}

/// One-shot Job manifest for a view
pub fn job_manifest(
    k8s: &KubernetesConfig,
    workload: &WorkloadConfig,
    name: &ViewName,
    subset: &Subset,
) -> serde_json::Value {
    let containers: Vec<_> = workload.containers.iter().map(container_manifest).collect();
    let volumes: Vec<_> = workload
        .volumes
        .iter()
        .map(|v| json!({ "name": v.name, "configMap": { "name": v.config_map } }))
        .collect();

    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": k8s.object_name(name.as_str()),
            "namespace": k8s.namespace,
            "labels": labels(k8s, name),
            "annotations": annotations(k8s, subset),
        },
        "spec": {
            "activeDeadlineSeconds": workload.active_deadline_secs,
            "backoffLimit": workload.backoff_limit,
            "template": {
                "metadata": { "labels": labels(k8s, name) },
                "spec": {
                    "restartPolicy": "Never",
                    "containers": containers,
                    "volumes": volumes,
                },
            },
        },
    })
}

// -----------------------------------------------------------------------
// K8sOrchestrator: feature-gated behind `kube`
// -----------------------------------------------------------------------

#[cfg(feature = "kube")]
pub use client::K8sOrchestrator;

#[cfg(feature = "kube")]
mod client {
    use super::*;
    use crate::error::{GatewayError, Result};
    use crate::orchestrator::Orchestrator;
    use async_trait::async_trait;
    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::api::discovery::v1::EndpointSlice;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::api::{Api, DeleteParams, ListParams, PostParams};

    /// Orchestrator backed by the Kubernetes API
    pub struct K8sOrchestrator {
        client: kube::Client,
        k8s: KubernetesConfig,
        workload: WorkloadConfig,
    }

    fn unavailable(what: &str, e: kube::Error) -> GatewayError {
        GatewayError::OrchestrationUnavailable(format!("{}: {}", what, e))
    }

    fn is_status(e: &kube::Error, code: u16) -> bool {
        matches!(e, kube::Error::Api(ae) if ae.code == code)
    }

    fn record(meta: &ObjectMeta) -> ObjectRecord {
        ObjectRecord {
            name: meta.name.clone().unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
            annotations: meta.annotations.clone().unwrap_or_default(),
            finished: false,
        }
    }

    fn job_record(job: &Job) -> ObjectRecord {
        ObjectRecord {
            finished: job_finished(job),
            ..record(&job.metadata)
        }
    }

    /// Whether a Job has completed, or failed past its backoff limit
    pub(super) fn job_finished(job: &Job) -> bool {
        let Some(status) = &job.status else {
            return false;
        };
        let terminal = status.conditions.iter().flatten().any(|c| {
            (c.type_ == "Complete" || c.type_ == "Failed") && c.status == "True"
        });
        // Kubernetes defaults backoffLimit to 6
        let backoff_limit = job
            .spec
            .as_ref()
            .and_then(|s| s.backoff_limit)
            .unwrap_or(6);
        terminal
            || status.succeeded.unwrap_or(0) > 0
            || status.failed.unwrap_or(0) > backoff_limit
    }

    /// Serving condition only: `publishNotReadyAddresses` forces `ready` to true
    fn slice_record(slice: &EndpointSlice) -> SliceRecord {
        let service = slice
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(SERVICE_NAME_LABEL))
            .cloned()
            .unwrap_or_default();
        let port = slice
            .ports
            .as_ref()
            .and_then(|ports| ports.first())
            .and_then(|p| p.port)
            .and_then(|p| u16::try_from(p).ok());
        let serving_addresses = slice
            .endpoints
            .iter()
            .filter(|ep| {
                ep.conditions
                    .as_ref()
                    .and_then(|c| c.serving)
                    .unwrap_or(false)
            })
            .flat_map(|ep| ep.addresses.iter().cloned())
            .collect();
        SliceRecord {
            service,
            port,
            serving_addresses,
        }
    }

    impl K8sOrchestrator {
        /// Connect using the in-cluster or kubeconfig credentials
        pub async fn new(k8s: KubernetesConfig, workload: WorkloadConfig) -> Result<Self> {
            let client = kube::Client::try_default().await.map_err(|e| {
                GatewayError::OrchestrationUnavailable(format!(
                    "Failed to create Kubernetes client: {}",
                    e
                ))
            })?;
            Ok(Self::with_client(client, k8s, workload))
        }

        pub fn with_client(
            client: kube::Client,
            k8s: KubernetesConfig,
            workload: WorkloadConfig,
        ) -> Self {
            Self {
                client,
                k8s,
                workload,
            }
        }

        fn jobs(&self) -> Api<Job> {
            Api::namespaced(self.client.clone(), &self.k8s.namespace)
        }

        fn services(&self) -> Api<Service> {
            Api::namespaced(self.client.clone(), &self.k8s.namespace)
        }

        fn slices(&self) -> Api<EndpointSlice> {
            Api::namespaced(self.client.clone(), &self.k8s.namespace)
        }

        /// Handle a create conflict: keep a live Job, replace a finished one
        async fn replace_if_finished(&self, name: &ViewName, job: &Job) -> Result<()> {
            let object = self.k8s.object_name(name.as_str());
            let existing = self
                .jobs()
                .get_opt(&object)
                .await
                .map_err(|e| unavailable("Failed to get Job", e))?;
            match existing {
                Some(existing) if !job_finished(&existing) => {
                    tracing::debug!(view = %name, "Job already exists");
                    return Ok(());
                }
                Some(_) => {
                    tracing::info!(view = %name, "Replacing finished Job");
                    self.delete_job(name).await?;
                }
                // Deleted since the conflict
                None => {}
            }

            match self.jobs().create(&PostParams::default(), job).await {
                Ok(_) => {
                    tracing::info!(view = %name, "Job created");
                    Ok(())
                }
                // Still being removed; transient, so the provisioner retries
                Err(e) if is_status(&e, 409) => Err(GatewayError::OrchestrationUnavailable(
                    format!("previous Job for view {} is still terminating", name),
                )),
                Err(e) => Err(unavailable(
                    &format!("Failed to create Job for view {}", name),
                    e,
                )),
            }
        }
    }

    #[async_trait]
    impl Orchestrator for K8sOrchestrator {
        async fn list_views(&self) -> Result<Vec<DiscoveredView>> {
            let lp = ListParams::default().labels(&self.k8s.app_selector());

            let services = self
                .services()
                .list(&lp)
                .await
                .map_err(|e| unavailable("Failed to list view Services", e))?;
            let jobs = self
                .jobs()
                .list(&lp)
                .await
                .map_err(|e| unavailable("Failed to list view Jobs", e))?;
            // EndpointSlices carry the service-name label, not the app label
            let slices = self
                .slices()
                .list(&ListParams::default().labels(SERVICE_NAME_LABEL))
                .await
                .map_err(|e| unavailable("Failed to list EndpointSlices", e))?;

            let services: Vec<_> = services.items.iter().map(|s| record(&s.metadata)).collect();
            let jobs: Vec<_> = jobs.items.iter().map(job_record).collect();
            let slices: Vec<_> = slices.items.iter().map(slice_record).collect();

            Ok(assemble_views(
                &self.k8s,
                self.workload.port,
                &services,
                &jobs,
                &slices,
            ))
        }

        async fn apply_service(&self, name: &ViewName, subset: &Subset) -> Result<()> {
            let service: Service = serde_json::from_value(service_manifest(
                &self.k8s,
                &self.workload,
                name,
                subset,
            ))?;
            match self.services().create(&PostParams::default(), &service).await {
                Ok(_) => {
                    tracing::info!(view = %name, "Service created");
                    Ok(())
                }
                Err(e) if is_status(&e, 409) => {
                    tracing::debug!(view = %name, "Service already exists");
                    Ok(())
                }
                Err(e) => Err(unavailable(
                    &format!("Failed to create Service for view {}", name),
                    e,
                )),
            }
        }

        async fn apply_job(&self, name: &ViewName, subset: &Subset) -> Result<()> {
            let job: Job = serde_json::from_value(job_manifest(
                &self.k8s,
                &self.workload,
                name,
                subset,
            ))?;
            match self.jobs().create(&PostParams::default(), &job).await {
                Ok(_) => {
                    tracing::info!(view = %name, "Job created");
                    Ok(())
                }
                Err(e) if is_status(&e, 409) => self.replace_if_finished(name, &job).await,
                Err(e) => Err(unavailable(
                    &format!("Failed to create Job for view {}", name),
                    e,
                )),
            }
        }

        async fn delete_job(&self, name: &ViewName) -> Result<()> {
            let object = self.k8s.object_name(name.as_str());
            match self.jobs().delete(&object, &DeleteParams::background()).await {
                Ok(_) => {
                    tracing::info!(view = %name, "Job deleted");
                    Ok(())
                }
                Err(e) if is_status(&e, 404) => Ok(()),
                Err(e) => Err(unavailable(
                    &format!("Failed to delete Job for view {}", name),
                    e,
                )),
            }
        }

        async fn delete_service(&self, name: &ViewName) -> Result<()> {
            let object = self.k8s.object_name(name.as_str());
            match self.services().delete(&object, &DeleteParams::default()).await {
                Ok(_) => {
                    tracing::info!(view = %name, "Service deleted");
                    Ok(())
                }
                Err(e) if is_status(&e, 404) => Ok(()),
                Err(e) => Err(unavailable(
                    &format!("Failed to delete Service for view {}", name),
                    e,
                )),
            }
        }

        async fn ready_endpoints(&self, name: &ViewName) -> Result<Vec<Endpoint>> {
            let selector = format!(
                "{}={}",
                SERVICE_NAME_LABEL,
                self.k8s.object_name(name.as_str())
            );
            let slices = self
                .slices()
                .list(&ListParams::default().labels(&selector))
                .await
                .map_err(|e| unavailable("Failed to list EndpointSlices", e))?;
            let records: Vec<_> = slices.items.iter().map(slice_record).collect();
            Ok(slice_endpoints(&records, self.workload.port))
        }

        fn name(&self) -> &str {
            "kubernetes"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k8s() -> KubernetesConfig {
        KubernetesConfig::default()
    }

    fn name(s: &str) -> ViewName {
        ViewName::parse(s).unwrap()
    }

    fn object(name: &str, view: Option<&str>, cluster: &str) -> ObjectRecord {
        let cfg = k8s();
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), cfg.app_label.clone());
        if let Some(view) = view {
            labels.insert(cfg.view_label.clone(), view.to_string());
        }
        let mut annotations = BTreeMap::new();
        annotations.insert(cfg.cluster_annotation.clone(), cluster.to_string());
        annotations.insert(cfg.namespace_annotation.clone(), String::new());
        ObjectRecord {
            name: name.to_string(),
            labels,
            annotations,
            finished: false,
        }
    }

    #[test]
    fn test_service_manifest() {
        let manifest = service_manifest(
            &k8s(),
            &WorkloadConfig::default(),
            &name("test01"),
            &Subset::cluster("dev").with_namespace("logs"),
        );
        assert_eq!(manifest["metadata"]["name"], "view-test01");
        assert_eq!(manifest["metadata"]["namespace"], "ui");
        assert_eq!(manifest["metadata"]["labels"]["app"], "lakeview");
        assert_eq!(
            manifest["metadata"]["labels"]["lakeview.yolean.se/view-name"],
            "test01"
        );
        assert_eq!(
            manifest["metadata"]["annotations"]["lakeview.yolean.se/cluster"],
            "dev"
        );
        assert_eq!(
            manifest["metadata"]["annotations"]["lakeview.yolean.se/namespace"],
            "logs"
        );
        assert_eq!(manifest["spec"]["clusterIP"], "None");
        assert_eq!(manifest["spec"]["publishNotReadyAddresses"], true);
        assert_eq!(
            manifest["spec"]["selector"]["lakeview.yolean.se/view-name"],
            "test01"
        );
        assert_eq!(manifest["spec"]["ports"][0]["port"], 8080);
    }

    #[test]
    fn test_job_manifest() {
        let manifest = job_manifest(
            &k8s(),
            &WorkloadConfig::default(),
            &name("test01"),
            &Subset::cluster("dev"),
        );
        assert_eq!(manifest["kind"], "Job");
        assert_eq!(manifest["metadata"]["name"], "view-test01");
        assert_eq!(manifest["spec"]["activeDeadlineSeconds"], 3600);
        assert_eq!(manifest["spec"]["backoffLimit"], 0);

        let template = &manifest["spec"]["template"];
        assert_eq!(
            template["metadata"]["labels"]["lakeview.yolean.se/view-name"],
            "test01"
        );
        assert_eq!(template["spec"]["restartPolicy"], "Never");

        let containers = template["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["name"], "duckdb");
        assert_eq!(containers[0]["imagePullPolicy"], "Never");
        assert!(containers[0].get("ports").is_none());
        assert_eq!(containers[1]["ports"][0]["containerPort"], 8080);
        assert_eq!(containers[1]["readinessProbe"]["httpGet"]["path"], "/");
        assert_eq!(containers[1]["volumeMounts"][0]["mountPath"], "/etc/envoy");

        let volumes = template["spec"]["volumes"].as_array().unwrap();
        assert_eq!(volumes[0]["configMap"]["name"], "duckdb-envoy");
    }

    #[cfg(feature = "kube")]
    #[test]
    fn test_manifests_deserialize_into_typed_objects() {
        use k8s_openapi::api::batch::v1::Job;
        use k8s_openapi::api::core::v1::Service;

        let cfg = k8s();
        let workload = WorkloadConfig::default();
        let n = name("test01");
        let subset = Subset::cluster("dev");

        let job: Job = serde_json::from_value(job_manifest(&cfg, &workload, &n, &subset)).unwrap();
        assert_eq!(job.metadata.name.as_deref(), Some("view-test01"));
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(0));
        assert_eq!(spec.template.spec.unwrap().containers.len(), 2);

        let svc: Service =
            serde_json::from_value(service_manifest(&cfg, &workload, &n, &subset)).unwrap();
        assert_eq!(svc.spec.unwrap().cluster_ip.as_deref(), Some("None"));
    }

    #[test]
    fn test_slice_endpoints_default_port() {
        let slices = vec![
            SliceRecord {
                service: "view-a".into(),
                port: Some(9000),
                serving_addresses: vec!["10.0.0.1".into()],
            },
            SliceRecord {
                service: "view-a".into(),
                port: None,
                serving_addresses: vec!["10.0.0.2".into(), "10.0.0.3".into()],
            },
        ];
        let endpoints = slice_endpoints(&slices, 8080);
        assert_eq!(
            endpoints,
            vec![
                Endpoint::new("10.0.0.1", 9000),
                Endpoint::new("10.0.0.2", 8080),
                Endpoint::new("10.0.0.3", 8080),
            ]
        );
    }

    #[test]
    fn test_assemble_views_states() {
        let cfg = k8s();
        let services = vec![
            object("view-decl", Some("decl"), "dev"),
            object("view-prov", Some("prov"), "dev"),
            object("view-live", Some("live"), "prod"),
        ];
        let jobs = vec![
            object("view-prov", Some("prov"), "dev"),
            object("view-live", Some("live"), "prod"),
        ];
        let slices = vec![
            SliceRecord {
                service: "view-live".into(),
                port: Some(8080),
                serving_addresses: vec!["10.0.0.9".into()],
            },
            SliceRecord {
                service: "view-prov".into(),
                port: Some(8080),
                serving_addresses: vec![],
            },
        ];

        let views = assemble_views(&cfg, 8080, &services, &jobs, &slices);
        assert_eq!(views.len(), 3);

        let by_name = |n: &str| views.iter().find(|v| v.name.as_str() == n).unwrap();
        assert_eq!(by_name("decl").state(), crate::view::ViewState::Absent);
        assert_eq!(by_name("prov").state(), crate::view::ViewState::Provisioning);
        let live = by_name("live");
        assert_eq!(live.state(), crate::view::ViewState::Ready);
        assert_eq!(live.subset.cluster, "prod");
        assert_eq!(live.subset.namespace, None);
        assert_eq!(live.endpoints, vec![Endpoint::new("10.0.0.9", 8080)]);
    }

    #[test]
    fn test_assemble_views_job_without_service() {
        let jobs = vec![object("view-orphan", Some("orphan"), "dev")];
        let views = assemble_views(&k8s(), 8080, &[], &jobs, &[]);
        assert_eq!(views.len(), 1);
        assert!(views[0].has_job);
        assert_eq!(views[0].subset.cluster, "dev");
    }

    #[test]
    fn test_assemble_views_finished_job_is_not_running() {
        let services = vec![object("view-done", Some("done"), "dev")];
        let jobs = vec![ObjectRecord {
            finished: true,
            ..object("view-done", Some("done"), "dev")
        }];
        let views = assemble_views(&k8s(), 8080, &services, &jobs, &[]);
        assert_eq!(views.len(), 1);
        assert!(!views[0].has_job);
        assert_eq!(views[0].state(), crate::view::ViewState::Absent);

        // A finished Job alone still names a view
        let views = assemble_views(&k8s(), 8080, &[], &jobs, &[]);
        assert_eq!(views.len(), 1);
        assert!(!views[0].has_job);
    }

    #[cfg(feature = "kube")]
    #[test]
    fn test_job_finished() {
        use k8s_openapi::api::batch::v1::Job;

        let job = |status: serde_json::Value| -> Job {
            serde_json::from_value(json!({
                "metadata": { "name": "view-test01" },
                "spec": {
                    "backoffLimit": 0,
                    "template": { "spec": { "containers": [] } },
                },
                "status": status,
            }))
            .unwrap()
        };

        assert!(!client::job_finished(&job(json!({}))));
        assert!(!client::job_finished(&job(json!({ "active": 1 }))));
        assert!(client::job_finished(&job(json!({ "succeeded": 1 }))));
        assert!(client::job_finished(&job(json!({ "failed": 1 }))));
        assert!(client::job_finished(&job(json!({
            "conditions": [{ "type": "Failed", "status": "True", "reason": "DeadlineExceeded" }],
        }))));
        assert!(!client::job_finished(&job(json!({
            "active": 1,
            "conditions": [{ "type": "Complete", "status": "False" }],
        }))));
    }

    #[test]
    fn test_assemble_views_name_from_object_name() {
        let services = vec![object("view-byname", None, "dev")];
        let views = assemble_views(&k8s(), 8080, &services, &[], &[]);
        assert_eq!(views[0].name.as_str(), "byname");
    }

    #[test]
    fn test_assemble_views_skips_invalid_names() {
        let services = vec![
            object("view-x", Some("x"), "dev"),
            object("unrelated", None, "dev"),
        ];
        assert!(assemble_views(&k8s(), 8080, &services, &[], &[]).is_empty());
    }
}
