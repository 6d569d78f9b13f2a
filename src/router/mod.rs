//! Router: maps a request host to a view's backend endpoint
//!
//! Routing is a pure read of the view registry. It never provisions; that is
//! the admission controller's job.

mod host;

pub use host::parse_view_name;

use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::registry::ViewRegistry;
use crate::view::{Endpoint, View, ViewState};

/// Result of looking a view up in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteLookup {
    /// The view has a ready endpoint
    Ready(Endpoint),
    /// The view exists but has no ready endpoint
    NotReady(View),
    /// No such view (or it is being deleted)
    Unknown,
}

/// Host-based router over the view registry
pub struct Router {
    hostname: String,
    registry: Arc<ViewRegistry>,
}

impl Router {
    pub fn new(hostname: impl Into<String>, registry: Arc<ViewRegistry>) -> Self {
        Self {
            hostname: hostname.into(),
            registry,
        }
    }

    /// Gateway domain
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// View addressed by a `Host` header value
    pub fn view_for_host(&self, host: &str) -> Option<String> {
        parse_view_name(&self.hostname, host)
    }

    pub fn lookup(&self, name: &str) -> RouteLookup {
        match self.registry.get(name) {
            None => RouteLookup::Unknown,
            Some(view) if view.state == ViewState::Deleting => RouteLookup::Unknown,
            Some(view) => match (&view.state, &view.endpoint) {
                (ViewState::Ready, Some(endpoint)) => RouteLookup::Ready(endpoint.clone()),
                _ => RouteLookup::NotReady(view),
            },
        }
    }

    /// Resolve a `Host` header to the endpoint serving it
    pub fn resolve(&self, host: &str) -> Result<Endpoint> {
        let name = self
            .view_for_host(host)
            .ok_or_else(|| GatewayError::NoRoute(host.to_string()))?;
        match self.lookup(&name) {
            RouteLookup::Ready(endpoint) => Ok(endpoint),
            RouteLookup::NotReady(view) => Err(GatewayError::Upstream(format!(
                "view '{}' is {}",
                view.name, view.state
            ))),
            RouteLookup::Unknown => Err(GatewayError::NoRoute(name)),
        }
    }
}
