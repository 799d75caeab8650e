//! Provisioning layer
//!
//! Obtains and releases the build machine a job runs on. The worker only
//! sees the [`Provisioner`] trait; how machines come to exist (playbooks,
//! a pinned host) stays behind it.

mod lease;
mod pinned;
mod playbook;

pub use lease::MachineLease;
pub use pinned::PinnedProvisioner;
pub use playbook::PlaybookProvisioner;

use async_trait::async_trait;
use kiln_core::domain::machine::{MachineAddress, ProvisionMode};
use thiserror::Error;

/// Hints passed to the provisioning backend
#[derive(Debug, Clone)]
pub struct ProvisionSpec {
    pub build_id: String,
    pub targets: Vec<String>,
    pub memory_requirement: u64,
    pub timeout_seconds: u64,
}

/// Errors raised while obtaining or releasing a machine
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The provisioning command failed
    ///
    /// `partial` is set when a machine identity was reported before the
    /// failure; that machine may exist and must still be torn down.
    #[error("Provisioning command failed: {reason}")]
    Command {
        reason: String,
        partial: Option<MachineAddress>,
    },

    /// The backend finished without reporting a usable address
    #[error("No address found from creating instance")]
    NoAddress { output: String },

    /// The provisioning tool could not be run at all
    #[error("Failed to run provisioning tool: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Machine identity obtained before the failure, if any
    pub fn partial(&self) -> Option<&MachineAddress> {
        match self {
            ProvisionError::Command { partial, .. } => partial.as_ref(),
            _ => None,
        }
    }
}

/// Capability to create and destroy build machines
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Obtains one machine for a job
    ///
    /// A single call yields at most one machine; retrying is up to the caller.
    async fn provision(&self, spec: &ProvisionSpec) -> Result<MachineAddress, ProvisionError>;

    /// Releases a machine obtained from [`Provisioner::provision`]
    async fn deprovision(&self, address: &MachineAddress) -> Result<(), ProvisionError>;

    fn mode(&self) -> ProvisionMode;
}
