//! Kubernetes configuration: object naming, tenancy labels, workload template

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// Naming and labelling of the objects that back a view
///
/// # Example
///
/// ```hcl
/// kubernetes {
///   namespace   = "ui"
///   app_label   = "lakeview"
///   view_label  = "lakeview.yolean.se/view-name"
///   name_prefix = "view-"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// Namespace holding all view Jobs and Services
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Value of the `app` label marking objects as managed by this gateway
    #[serde(default = "default_app_label")]
    pub app_label: String,

    /// Tenancy label key; its value is the view name
    #[serde(default = "default_view_label")]
    pub view_label: String,

    /// Annotation carrying `subset.cluster`
    #[serde(default = "default_cluster_annotation")]
    pub cluster_annotation: String,

    /// Annotation carrying `subset.namespace`
    #[serde(default = "default_namespace_annotation")]
    pub namespace_annotation: String,

    /// Prefix of Job and Service names (`<prefix><view>`)
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

fn default_namespace() -> String {
    "ui".to_string()
}

fn default_app_label() -> String {
    "lakeview".to_string()
}

fn default_view_label() -> String {
    "lakeview.yolean.se/view-name".to_string()
}

fn default_cluster_annotation() -> String {
    "lakeview.yolean.se/cluster".to_string()
}

fn default_namespace_annotation() -> String {
    "lakeview.yolean.se/namespace".to_string()
}

fn default_name_prefix() -> String {
    "view-".to_string()
}

impl KubernetesConfig {
    /// Object name for a view's Job and Service
    pub fn object_name(&self, view: &str) -> String {
        format!("{}{}", self.name_prefix, view)
    }

    /// Inverse of [`object_name`](Self::object_name)
    pub fn view_from_object_name<'a>(&self, object: &'a str) -> Option<&'a str> {
        object
            .strip_prefix(&self.name_prefix)
            .filter(|rest| !rest.is_empty())
    }

    /// Selector matching every object this gateway manages
    pub fn app_selector(&self) -> String {
        format!("app={}", self.app_label)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("kubernetes.namespace", &self.namespace),
            ("kubernetes.app_label", &self.app_label),
            ("kubernetes.view_label", &self.view_label),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::Config(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            app_label: default_app_label(),
            view_label: default_view_label(),
            cluster_annotation: default_cluster_annotation(),
            namespace_annotation: default_namespace_annotation(),
            name_prefix: default_name_prefix(),
        }
    }
}

/// Pod template for the one-shot Job backing a view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Port the Service exposes and the gateway forwards to
    #[serde(default = "default_workload_port")]
    pub port: u16,

    /// Hard lifetime of a view workload
    #[serde(default = "default_active_deadline")]
    pub active_deadline_secs: i64,

    /// Job retries before it is marked failed
    #[serde(default)]
    pub backoff_limit: i32,

    #[serde(default = "default_containers")]
    pub containers: Vec<ContainerConfig>,

    #[serde(default = "default_volumes")]
    pub volumes: Vec<VolumeConfig>,
}

/// One container of the workload pod
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub pull_policy: Option<String>,
    /// Container port named `http`
    #[serde(default)]
    pub port: Option<u16>,
    /// HTTP readiness probe path (requires `port`)
    #[serde(default)]
    pub readiness_path: Option<String>,
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMountConfig>,
}

/// Volume mount inside a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMountConfig {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

/// ConfigMap-backed pod volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,
    pub config_map: String,
}

fn default_workload_port() -> u16 {
    8080
}

fn default_active_deadline() -> i64 {
    3600
}

fn default_containers() -> Vec<ContainerConfig> {
    vec![
        ContainerConfig {
            name: "duckdb".to_string(),
            image: "yolean/duckdb-ui:latest".to_string(),
            pull_policy: Some("Never".to_string()),
            port: None,
            readiness_path: None,
            volume_mounts: vec![],
        },
        ContainerConfig {
            name: "envoy".to_string(),
            image: "ghcr.io/yolean/envoy:distroless-v1.37.0".to_string(),
            pull_policy: None,
            port: Some(default_workload_port()),
            readiness_path: Some("/".to_string()),
            volume_mounts: vec![VolumeMountConfig {
                name: "envoy-config".to_string(),
                mount_path: "/etc/envoy".to_string(),
                read_only: true,
            }],
        },
    ]
}

fn default_volumes() -> Vec<VolumeConfig> {
    vec![VolumeConfig {
        name: "envoy-config".to_string(),
        config_map: "duckdb-envoy".to_string(),
    }]
}

impl WorkloadConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(GatewayError::Config("workload.port must be > 0".to_string()));
        }
        if self.containers.is_empty() {
            return Err(GatewayError::Config(
                "workload must define at least one container".to_string(),
            ));
        }
        for container in &self.containers {
            if container.name.is_empty() || container.image.is_empty() {
                return Err(GatewayError::Config(
                    "workload containers need a name and an image".to_string(),
                ));
            }
            if container.readiness_path.is_some() && container.port.is_none() {
                return Err(GatewayError::Config(format!(
                    "container '{}' has a readiness_path but no port",
                    container.name
                )));
            }
            for mount in &container.volume_mounts {
                if !self.volumes.iter().any(|v| v.name == mount.name) {
                    return Err(GatewayError::Config(format!(
                        "container '{}' mounts unknown volume '{}'",
                        container.name, mount.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            port: default_workload_port(),
            active_deadline_secs: default_active_deadline(),
            backoff_limit: 0,
            containers: default_containers(),
            volumes: default_volumes(),
        }
    }
}
