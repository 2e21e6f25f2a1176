//! Health probes.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::services::ServiceCheck;

/// Outcome of a single probe run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Probe exited with status 0
    Healthy,
    /// Probe ran but exited non-zero; `None` when killed by a signal
    Failed { exit_code: Option<i32> },
    /// Probe could not be executed at all
    Error { message: String },
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Runs the health probe for one service.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, service: &ServiceCheck) -> ProbeResult;
}

/// Runs the resolved command through `/bin/sh -c` with all stdio closed.
///
/// No timeout is applied; a hung command holds up the whole pass.
#[derive(Debug, Clone)]
pub struct ShellProber {
    shell: String,
}

impl ShellProber {
    pub fn new() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for ShellProber {
    async fn probe(&self, service: &ServiceCheck) -> ProbeResult {
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(&service.command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => ProbeResult::Healthy,
            Ok(status) => ProbeResult::Failed {
                exit_code: status.code(),
            },
            Err(e) => ProbeResult::Error {
                message: e.to_string(),
            },
        }
    }
}
