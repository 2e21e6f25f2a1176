//! Cluster client bootstrap.

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::info;

use crate::config::CredentialSource;
use crate::error::{Error, Result};

/// Build a client from an explicit kubeconfig or the in-cluster identity.
pub async fn connect(credentials: &CredentialSource) -> Result<Client> {
    let config = match credentials {
        CredentialSource::Kubeconfig(path) => {
            info!(path = %path.display(), "Reading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::Bootstrap(format!(
                    "error reading kubeconfig {}: {e}",
                    path.display()
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::Bootstrap(format!("error building kubeconfig: {e}")))?
        }
        CredentialSource::InCluster => {
            info!("Using in-cluster credentials");
            Config::incluster()
                .map_err(|e| Error::Bootstrap(format!("error loading in-cluster config: {e}")))?
        }
    };

    Client::try_from(config)
        .map_err(|e| Error::Bootstrap(format!("error creating Kubernetes client: {e}")))
}
