//! Service check definitions and the per-tick config loader.
//!
//! The config lives in a ConfigMap under the `services.yaml` key:
//!
//! ```yaml
//! services:
//!   - name: api
//!     namespace: shop
//!     endpoint: api-svc
//!     port: 8080
//!     path: healthz
//!     headers:
//!       Host: api.example.com
//! ```
//!
//! It is re-read on every tick; nothing is cached between passes.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// ConfigMap data key holding the service list.
pub const SERVICES_KEY: &str = "services.yaml";

pub const DEFAULT_PORT: i64 = 80;
pub const DEFAULT_ENDPOINT: &str = "localhost";
pub const DEFAULT_NAMESPACE: &str = "default";

/// One service's health-check definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    /// Display name, never used to address cluster resources
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub namespace: String,

    /// Probe host and the name of the Service deleted on failure
    #[serde(default, deserialize_with = "null_as_default")]
    pub endpoint: String,

    /// 0 means unset. Kept signed so odd values reach the probe instead of
    /// failing the whole load.
    #[serde(default, deserialize_with = "null_as_default")]
    pub port: i64,

    /// Explicit probe command; derived from the other fields when empty
    #[serde(default, deserialize_with = "null_as_default")]
    pub command: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,

    /// Request headers, only used when deriving the command
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
}

/// YAML `null`/`~` reads as the field's empty value, so it gets defaulted
/// like an omitted key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl fmt::Display for ServiceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}.{}' ({})", self.endpoint, self.namespace, self.name)
    }
}

/// Top-level shape of the `services.yaml` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub services: Option<Vec<ServiceCheck>>,
}

/// Fill unset fields of a freshly parsed check.
///
/// Only empty fields are touched, so an explicit `command` survives as-is.
pub fn apply_defaults(service: &mut ServiceCheck) {
    if service.port == 0 {
        service.port = DEFAULT_PORT;
    }
    if service.endpoint.is_empty() {
        service.endpoint = DEFAULT_ENDPOINT.to_string();
    }
    if service.namespace.is_empty() {
        service.namespace = DEFAULT_NAMESPACE.to_string();
    }
    if service.command.is_empty() {
        service.command = derive_command(service);
    }
}

/// Build the curl probe for a check whose other fields are already defaulted.
///
/// Produces `curl -H 'K: V' ... http://{endpoint}.{namespace}:{port}/{path}`
/// with one `-H` flag per header, in key order.
pub fn derive_command(service: &ServiceCheck) -> String {
    let header_args: String = service
        .headers
        .iter()
        .map(|(key, value)| format!("-H '{key}: {value}' "))
        .collect();

    format!(
        "curl {}http://{}.{}:{}/{}",
        header_args, service.endpoint, service.namespace, service.port, service.path
    )
}

/// Parse a `services.yaml` payload and apply defaults to every entry.
pub fn parse_services(yaml: &str) -> Result<Vec<ServiceCheck>> {
    let config: ServicesConfig = serde_yaml::from_str(yaml).map_err(|e| {
        debug!(payload = %yaml, "Unparseable services payload");
        Error::ConfigFormat(format!("failed to unmarshal services YAML: {e}"))
    })?;

    let mut services = config.services.unwrap_or_default();
    for service in &mut services {
        apply_defaults(service);
    }
    Ok(services)
}

/// Where the raw config data comes from.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch the data map of the named config resource.
    async fn fetch(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;
}

/// Reads config from a ConfigMap through the Kubernetes API.
#[derive(Clone)]
pub struct ConfigMapSource {
    client: Client,
}

impl ConfigMapSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigSource for ConfigMapSource {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let configmaps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = configmaps
            .get(name)
            .await
            .map_err(|source| Error::ConfigFetch {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?;
        Ok(cm.data.unwrap_or_default())
    }
}

/// Fetch, parse and default the service list for one tick.
pub async fn load_service_checks(
    source: &dyn ConfigSource,
    namespace: &str,
    name: &str,
) -> Result<Vec<ServiceCheck>> {
    debug!(configmap = %name, namespace = %namespace, "Loading service checks");

    let data = source.fetch(namespace, name).await?;
    let yaml = data.get(SERVICES_KEY).ok_or_else(|| {
        Error::ConfigFormat(format!("ConfigMap does not contain key '{SERVICES_KEY}'"))
    })?;

    let services = parse_services(yaml)?;
    info!(count = services.len(), "Loaded service checks");
    Ok(services)
}
