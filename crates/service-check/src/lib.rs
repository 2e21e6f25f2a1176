//! Service reachability checker with Service-deletion remediation.
//!
//! On every tick the checker reads a list of service checks from a ConfigMap,
//! probes each service concurrently and deletes the core/v1 Service of any
//! whose probe fails, leaving recreation to whatever reconciler owns it.
//!
//! # Architecture
//!
//! - [`services`] loads and defaults the check list through a [`ConfigSource`]
//! - [`probe`] runs one probe per service through a [`Prober`]
//! - [`remediate`] deletes Services through an [`ExposureRemover`]
//! - [`scheduler`] drives passes on a fixed interval with an injectable [`Clock`]
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use service_check::{
//!     kube_client, ConfigMapSource, CredentialSource, Scheduler, SchedulerConfig, ServiceRemover,
//!     ShellProber,
//! };
//!
//! # async fn run() -> service_check::Result<()> {
//! let client = kube_client::connect(&CredentialSource::InCluster).await?;
//! let scheduler = Scheduler::new(
//!     SchedulerConfig::default(),
//!     Arc::new(ConfigMapSource::new(client.clone())),
//!     Arc::new(ShellProber::new()),
//!     Arc::new(ServiceRemover::new(client)),
//! );
//! scheduler.run().await
//! # }
//! ```

pub mod check;
pub mod config;
pub mod error;
pub mod kube_client;
pub mod probe;
pub mod remediate;
pub mod scheduler;
pub mod services;

pub use check::{check_service, CheckOutcome};
pub use config::{Cli, CredentialSource, LoadFailurePolicy, LogFormat, RuntimeConfig};
pub use error::{Error, Result};
pub use probe::{ProbeResult, Prober, ShellProber};
pub use remediate::{remediate, ExposureRemover, ServiceRemover};
pub use scheduler::{Clock, PassReport, Scheduler, SchedulerConfig, TaskGroup, TokioClock};
pub use services::{
    apply_defaults, derive_command, load_service_checks, parse_services, ConfigMapSource,
    ConfigSource, ServiceCheck,
};
