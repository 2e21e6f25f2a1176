//! Runtime settings, sourced from flags with environment fallbacks.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scheduler::SchedulerConfig;

/// What the poll loop does when the config cannot be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LoadFailurePolicy {
    /// Stop polling and exit with an error
    #[default]
    Abort,
    /// Log the error and try again on the next tick
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How to authenticate against the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Explicit kubeconfig file
    Kubeconfig(PathBuf),
    /// Mounted service account token
    InCluster,
}

/// Poll declared services and delete the Service of any that fail their check
#[derive(Debug, Clone, Parser)]
#[command(name = "service-check")]
#[command(version)]
pub struct Cli {
    /// Kubeconfig file; in-cluster credentials are used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// ConfigMap holding `services.yaml`
    #[arg(long, env = "CONFIGMAP_NAME", default_value = "service-check-config")]
    pub configmap_name: String,

    /// Namespace of the ConfigMap
    #[arg(long, env = "CONFIGMAP_NAMESPACE", default_value = "default")]
    pub configmap_namespace: String,

    /// Seconds between passes
    #[arg(long, env = "CHECK_INTERVAL_SECS", default_value = "15")]
    pub interval_secs: u64,

    /// Behaviour when the ConfigMap cannot be loaded
    #[arg(long, env = "LOAD_FAILURE_POLICY", value_enum, default_value = "abort")]
    pub on_load_failure: LoadFailurePolicy,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Run a single pass immediately and exit
    #[arg(long, default_value = "false")]
    pub once: bool,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub credentials: CredentialSource,
    pub scheduler: SchedulerConfig,
    pub log_format: LogFormat,
    pub once: bool,
}

impl RuntimeConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if cli.interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "check interval must be at least one second".to_string(),
            ));
        }
        if cli.configmap_name.trim().is_empty() {
            return Err(Error::InvalidConfig("ConfigMap name is empty".to_string()));
        }

        let credentials = match cli.kubeconfig {
            Some(path) if !path.trim().is_empty() => CredentialSource::Kubeconfig(PathBuf::from(path)),
            _ => CredentialSource::InCluster,
        };

        let configmap_namespace = if cli.configmap_namespace.trim().is_empty() {
            "default".to_string()
        } else {
            cli.configmap_namespace
        };

        Ok(Self {
            credentials,
            scheduler: SchedulerConfig {
                configmap_namespace,
                configmap_name: cli.configmap_name,
                interval: Duration::from_secs(cli.interval_secs),
                on_load_failure: cli.on_load_failure,
            },
            log_format: cli.log_format,
            once: cli.once,
        })
    }
}
