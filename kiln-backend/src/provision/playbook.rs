//! Playbook-driven build machines
//!
//! Spawns a fresh machine per job by running the spawn playbook and
//! terminates it with the terminate playbook. The spawn playbook reports
//! the new machine by printing a `builder_address=<addr>` marker, usually
//! from a `debug` task.

use async_trait::async_trait;
use kiln_core::domain::machine::{MachineAddress, ProvisionMode};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{ProvisionError, ProvisionSpec, Provisioner};

const ADDRESS_MARKER: &str = "builder_address=";

/// Provisioner backed by ansible playbooks
pub struct PlaybookProvisioner {
    program: String,
    spawn_playbook: PathBuf,
    terminate_playbook: PathBuf,
}

impl PlaybookProvisioner {
    pub fn new(spawn_playbook: PathBuf, terminate_playbook: PathBuf) -> Self {
        Self {
            program: "ansible-playbook".to_string(),
            spawn_playbook,
            terminate_playbook,
        }
    }

    /// Overrides the playbook runner executable
    #[cfg(test)]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Provisioner for PlaybookProvisioner {
    async fn provision(&self, spec: &ProvisionSpec) -> Result<MachineAddress, ProvisionError> {
        info!(
            "Spawning builder for build {} with {}",
            spec.build_id,
            self.spawn_playbook.display()
        );

        let output = Command::new(&self.program)
            .arg(&self.spawn_playbook)
            .arg("-u")
            .arg("root")
            .arg("-e")
            .arg(format!("build_id={}", spec.build_id))
            .arg("-e")
            .arg(format!("memory_reqs={}", spec.memory_requirement))
            .arg("-e")
            .arg(format!("timeout={}", spec.timeout_seconds))
            .arg("-e")
            .arg(format!("chroots={}", spec.targets.join(",")))
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stderr.trim().is_empty() {
            debug!("spawn playbook stderr: {}", stderr.trim());
        }

        let address = parse_address(&stdout);

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            let reason = format!(
                "spawn playbook exited with {}: stderr='{}'",
                exit_code,
                stderr.trim()
            );
            error!("{}", reason);
            return Err(ProvisionError::Command {
                reason,
                partial: address,
            });
        }

        address.ok_or_else(|| ProvisionError::NoAddress {
            output: stdout.to_string(),
        })
    }

    async fn deprovision(&self, address: &MachineAddress) -> Result<(), ProvisionError> {
        info!(
            "Terminating builder {} with {}",
            address,
            self.terminate_playbook.display()
        );

        let output = Command::new(&self.program)
            .arg(&self.terminate_playbook)
            .arg("-u")
            .arg("root")
            .arg("-i")
            .arg(format!("{},", address))
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::Command {
                reason: format!(
                    "terminate playbook exited with {}: stderr='{}'",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
                partial: None,
            });
        }

        Ok(())
    }

    fn mode(&self) -> ProvisionMode {
        ProvisionMode::Ephemeral
    }
}

/// Finds the first address marker in the playbook output
fn parse_address(output: &str) -> Option<MachineAddress> {
    output.match_indices(ADDRESS_MARKER).find_map(|(idx, _)| {
        let rest = &output[idx + ADDRESS_MARKER.len()..];
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '}'))
            .unwrap_or(rest.len());
        MachineAddress::parse(&rest[..end])
    })
}
