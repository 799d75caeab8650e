//! Build execution layer
//!
//! Runs one package build for one target on one provisioned machine. The
//! worker calls [`BuildExecutor::build`] once per target and never retries;
//! retries and the timeout belong to the backend.

mod mockremote;

pub use mockremote::MockRemoteExecutor;

use async_trait::async_trait;
use kiln_core::domain::machine::MachineAddress;
use std::path::PathBuf;
use thiserror::Error;

/// Everything a backend needs to build a job's packages for one target
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub address: MachineAddress,
    pub target: String,
    pub packages: Vec<String>,
    pub repositories: Vec<String>,
    /// Seconds; 0 disables the limit
    pub timeout_seconds: u64,
    /// Job results root; the backend writes into `<destination_dir>/<target>`
    pub destination_dir: PathBuf,
    /// Where the backend's own output for this target goes
    pub log_path: PathBuf,
}

/// Result reported by the backend for a build it ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed { reason: String },
}

/// Errors that prevented the backend from producing an outcome
#[derive(Debug, Error)]
pub enum BuildError {
    /// The build tool could not be started
    #[error("Failed to start build tool {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Local I/O around the build failed (log file, waiting on the child)
    #[error("Build I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The build did not finish within the job's timeout
    #[error("Build timed out after {seconds} seconds")]
    TimedOut { seconds: u64 },
}

/// Capability to build packages on a remote machine
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError>;
}
