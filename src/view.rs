//! View data model: names, placement subsets, lifecycle states, endpoints

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum view name length
pub const NAME_MIN_LEN: usize = 3;
/// Maximum view name length (downstream object names carry a prefix)
pub const NAME_MAX_LEN: usize = 8;

/// A validated view name: lowercase alphanumerics with internal hyphens, 3–8 chars
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ViewName(String);

impl ViewName {
    /// Validate and wrap a raw name
    pub fn parse(raw: &str) -> Result<Self> {
        let len = raw.len();
        if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
            return Err(GatewayError::Validation(format!(
                "name must be {}-{} characters, got {}",
                NAME_MIN_LEN, NAME_MAX_LEN, len
            )));
        }

        let bytes = raw.as_bytes();
        let first_ok = bytes[0].is_ascii_lowercase();
        let last_ok = bytes[len - 1].is_ascii_lowercase() || bytes[len - 1].is_ascii_digit();
        let body_ok = bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');

        if !(first_ok && last_ok && body_ok) {
            return Err(GatewayError::Validation(format!(
                "name '{}' must start with a lowercase letter, end with a letter or digit, \
                 and contain only lowercase letters, digits and hyphens",
                raw
            )));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ViewName {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        ViewName::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Placement descriptor: where the view's workload should be scheduled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subset {
    /// Target cluster (required)
    pub cluster: String,
    /// Target namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Pod refinement (declared, not yet supported)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    /// Container refinement (declared, not yet supported)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Time range refinement (declared, not yet supported)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
}

impl Subset {
    /// Subset for a cluster with no further refinement
    pub fn cluster(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Check required fields and reject refinements the gateway cannot place yet
    pub fn validate(&self) -> Result<()> {
        if self.cluster.trim().is_empty() {
            return Err(GatewayError::Validation(
                "subset.cluster is required".to_string(),
            ));
        }
        if matches!(&self.namespace, Some(ns) if ns.trim().is_empty()) {
            return Err(GatewayError::Validation(
                "subset.namespace must not be empty when set".to_string(),
            ));
        }
        for (field, value) in [
            ("pod", &self.pod),
            ("container", &self.container),
            ("range", &self.range),
        ] {
            if value.is_some() {
                return Err(GatewayError::Validation(format!(
                    "subset.{} is not supported",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle state of a view's backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ViewState {
    /// Declared, no workload
    #[default]
    Absent,
    /// Workload requested, waiting for a ready endpoint
    Provisioning,
    /// At least one healthy endpoint
    Ready,
    /// Teardown in progress
    Deleting,
}

impl ViewState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `absent → provisioning → ready → deleting → absent`; any live state may
    /// enter `deleting`, and `provisioning` may be re-entered for a retry.
    pub fn can_transition_to(self, next: ViewState) -> bool {
        use ViewState::*;
        matches!(
            (self, next),
            (Absent, Provisioning)
                | (Provisioning, Provisioning)
                | (Provisioning, Ready)
                | (Absent, Deleting)
                | (Provisioning, Deleting)
                | (Ready, Deleting)
                | (Deleting, Absent)
        )
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Ready => write!(f, "ready"),
            Self::Deleting => write!(f, "deleting"),
        }
    }
}

/// Network address of a ready workload member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn authority(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// Base URL for forwarding
    pub fn url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// A view: the unit of tenancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    pub name: ViewName,
    pub subset: Subset,
    pub state: ViewState,
    /// Resolved backend when `state == Ready`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
}

impl View {
    /// A declared view with no backend
    pub fn declared(name: ViewName, subset: Subset) -> Self {
        Self {
            name,
            subset,
            state: ViewState::Absent,
            endpoint: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ViewState::Ready && self.endpoint.is_some()
    }
}

/// Body of `POST /_api/views`
#[derive(Debug, Clone, Deserialize)]
pub struct ViewRequest {
    pub name: String,
    pub subset: Subset,
}

impl ViewRequest {
    /// Validate into a declared view
    pub fn into_view(self) -> Result<View> {
        let name = ViewName::parse(&self.name)?;
        self.subset.validate()?;
        Ok(View::declared(name, self.subset))
    }
}
