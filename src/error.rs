//! Centralized error types for the view gateway

use thiserror::Error;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed view name or subset
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request names a view the registry does not know
    #[error("No route for view '{0}'")]
    NoRoute(String),

    /// Workload did not report a ready endpoint within the bound
    #[error("View '{view}' not ready after {waited_ms}ms")]
    ProvisioningTimeout { view: String, waited_ms: u64 },

    /// Control-plane call failed (network partition, credentials, server error)
    #[error("Orchestration unavailable: {0}")]
    OrchestrationUnavailable(String),

    /// Registry has not completed its first reconciliation
    #[error("View registry not yet reconciled")]
    NotReconciled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream workload could not be reached or answered badly
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl GatewayError {
    /// HTTP status code this error is surfaced as
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NoRoute(_) => 404,
            Self::ProvisioningTimeout { .. }
            | Self::OrchestrationUnavailable(_)
            | Self::NotReconciled => 503,
            Self::Upstream(_) | Self::Http(_) => 502,
            _ => 500,
        }
    }

    /// Whether the operation that produced this error may be retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::OrchestrationUnavailable(_))
    }

    /// JSON error body `{"error": "..."}`
    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::Validation("x".into()).status_code(), 400);
        assert_eq!(GatewayError::NoRoute("x".into()).status_code(), 404);
        assert_eq!(
            GatewayError::ProvisioningTimeout {
                view: "x".into(),
                waited_ms: 10
            }
            .status_code(),
            503
        );
        assert_eq!(
            GatewayError::OrchestrationUnavailable("down".into()).status_code(),
            503
        );
        assert_eq!(GatewayError::NotReconciled.status_code(), 503);
        assert_eq!(GatewayError::Upstream("x".into()).status_code(), 502);
        assert_eq!(GatewayError::Other("x".into()).status_code(), 500);
    }

    #[test]
    fn test_only_orchestration_errors_are_transient() {
        assert!(GatewayError::OrchestrationUnavailable("x".into()).is_transient());
        assert!(!GatewayError::Validation("x".into()).is_transient());
        assert!(!GatewayError::NoRoute("x".into()).is_transient());
        assert!(!GatewayError::NotReconciled.is_transient());
    }

    #[test]
    fn test_json_body() {
        let body = GatewayError::NoRoute("test01".into()).to_json();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["error"], "No route for view 'test01'");
    }
}
