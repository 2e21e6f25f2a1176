//! Check executor: one probe per service, remediation on failure.

use tracing::{info, warn};

use crate::probe::{ProbeResult, Prober};
use crate::remediate::{remediate, ExposureRemover};
use crate::services::ServiceCheck;

/// What happened to one service during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Healthy,
    /// Probe failed and the Service was deleted
    Remediated,
    /// Probe failed and the delete call errored as well
    RemediationFailed,
}

/// Probe `service` once and hand failures to the remediator.
pub async fn check_service(
    prober: &dyn Prober,
    remover: &dyn ExposureRemover,
    service: &ServiceCheck,
) -> CheckOutcome {
    match prober.probe(service).await {
        ProbeResult::Healthy => {
            info!(
                service = %service.name,
                endpoint = %service.endpoint,
                namespace = %service.namespace,
                "Service {} is healthy", service
            );
            CheckOutcome::Healthy
        }
        ProbeResult::Failed { exit_code } => {
            warn!(
                service = %service.name,
                endpoint = %service.endpoint,
                namespace = %service.namespace,
                exit_code = ?exit_code,
                "Command failed for {}, attempting to cleanup", service
            );
            remediate(remover, service).await
        }
        ProbeResult::Error { message } => {
            warn!(
                service = %service.name,
                endpoint = %service.endpoint,
                namespace = %service.namespace,
                error = %message,
                "Command could not run for {}, attempting to cleanup", service
            );
            remediate(remover, service).await
        }
    }
}
