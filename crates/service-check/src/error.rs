//! Error types for the service checker.

use thiserror::Error;

/// Errors surfaced by config loading, remediation and bootstrap.
///
/// Probe failures are not errors: they are reported as
/// [`ProbeResult`](crate::probe::ProbeResult) values and trigger remediation.
#[derive(Debug, Error)]
pub enum Error {
    /// Credential or connection failure while building the cluster client
    #[error("Kubernetes bootstrap failed: {0}")]
    Bootstrap(String),

    /// The config ConfigMap is missing or the API server is unreachable
    #[error("failed to get ConfigMap {namespace}/{name}: {source}")]
    ConfigFetch {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// The `services.yaml` key is absent or its payload is malformed
    #[error("invalid service check config: {0}")]
    ConfigFormat(String),

    /// Deleting a Service after a failed probe did not succeed
    #[error("failed to delete Service {namespace}/{endpoint}: {source}")]
    Remediation {
        namespace: String,
        endpoint: String,
        #[source]
        source: kube::Error,
    },

    /// Runtime settings rejected at startup
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error came out of the per-tick config load.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigFetch { .. } | Self::ConfigFormat(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
