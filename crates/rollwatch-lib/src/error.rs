//! Error taxonomy shared by every module of the library

use std::time::Duration;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by gateway calls, probes and rollouts
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local kubeconfig or context loading failed
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested workload or pod does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Transport or API failure other than "not found"
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Workload kind outside of deployment/statefulset
    #[error("invalid resource type: {0}")]
    InvalidResourceType(String),

    /// Rollout did not converge within the allotted window
    #[error(
        "timed out after {}s waiting for rollout (replicas={replicas}, updated={updated}, ready={ready})",
        waited.as_secs()
    )]
    Timeout {
        waited: Duration,
        replicas: i32,
        updated: i32,
        ready: i32,
    },

    /// The caller asked to stop waiting
    #[error("rollout wait cancelled")]
    Cancelled,

    /// No usable timestamp could be extracted
    #[error("parse error: {0}")]
    Parse(String),

    /// The monitored container index is absent from the pod template
    #[error("{kind} {name} has no container at index {index}")]
    MissingContainer {
        kind: String,
        name: String,
        index: usize,
    },

    /// The dry-run snapshot could not be rendered
    #[error("failed to serialize workload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// Classify a kube error, mapping HTTP 404 to [`Error::NotFound`]
    pub fn from_kube(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => Error::NotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => Error::Gateway(other.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn test_404_maps_to_not_found() {
        let err = Error::from_kube(api_error(404), "pod", "default", "web-0");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "pod default/web-0 not found");
    }

    #[test]
    fn test_other_api_errors_stay_gateway() {
        let err = Error::from_kube(api_error(500), "pod", "default", "web-0");
        assert!(matches!(err, Error::Gateway(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_timeout_is_distinct_from_gateway() {
        let err = Error::Timeout {
            waited: Duration::from_secs(60),
            replicas: 3,
            updated: 1,
            ready: 1,
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("60s"));
    }
}
