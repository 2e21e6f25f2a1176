//! Remediation: delete the Service of an unhealthy check so the owning
//! reconciler (Helm, Argo CD, an operator) recreates it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::DeleteParams;
use kube::{Api, Client};
use tracing::{error, info};

use crate::check::CheckOutcome;
use crate::error::{Error, Result};
use crate::services::ServiceCheck;

/// Removes the network-exposure resource addressed by `(namespace, endpoint)`.
#[async_trait]
pub trait ExposureRemover: Send + Sync {
    async fn remove(&self, namespace: &str, endpoint: &str) -> Result<()>;
}

/// Deletes core/v1 Services through the Kubernetes API.
#[derive(Clone)]
pub struct ServiceRemover {
    client: Client,
}

impl ServiceRemover {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExposureRemover for ServiceRemover {
    async fn remove(&self, namespace: &str, endpoint: &str) -> Result<()> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        services
            .delete(endpoint, &DeleteParams::default())
            .await
            .map_err(|source| Error::Remediation {
                namespace: namespace.to_string(),
                endpoint: endpoint.to_string(),
                source,
            })?;
        Ok(())
    }
}

/// Delete the Service behind a failed check. Errors are logged, never retried.
pub async fn remediate(remover: &dyn ExposureRemover, service: &ServiceCheck) -> CheckOutcome {
    // The Service is addressed by endpoint; `name` is display-only.
    match remover.remove(&service.namespace, &service.endpoint).await {
        Ok(()) => {
            info!(
                service = %service.name,
                endpoint = %service.endpoint,
                namespace = %service.namespace,
                "Cleaned up {}", service
            );
            CheckOutcome::Remediated
        }
        Err(e) => {
            error!(
                service = %service.name,
                endpoint = %service.endpoint,
                namespace = %service.namespace,
                error = %e,
                "Failed to delete {}", service
            );
            CheckOutcome::RemediationFailed
        }
    }
}
