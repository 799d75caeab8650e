//! Pinned build machine

use async_trait::async_trait;
use kiln_core::domain::machine::{MachineAddress, ProvisionMode};
use tracing::debug;

use super::{ProvisionError, ProvisionSpec, Provisioner};

/// Hands out a fixed, pre-existing machine
///
/// Teardown leaves the machine running.
pub struct PinnedProvisioner {
    address: MachineAddress,
}

impl PinnedProvisioner {
    pub fn new(address: MachineAddress) -> Self {
        Self { address }
    }
}

#[async_trait]
impl Provisioner for PinnedProvisioner {
    async fn provision(&self, spec: &ProvisionSpec) -> Result<MachineAddress, ProvisionError> {
        debug!(
            "Using pinned builder {} for build {}",
            self.address, spec.build_id
        );
        Ok(self.address.clone())
    }

    async fn deprovision(&self, address: &MachineAddress) -> Result<(), ProvisionError> {
        debug!("Pinned builder {} left running", address);
        Ok(())
    }

    fn mode(&self) -> ProvisionMode {
        ProvisionMode::Pinned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pinned_always_returns_same_address() {
        let address = MachineAddress::parse("10.0.0.9").unwrap();
        let provisioner = PinnedProvisioner::new(address.clone());
        let spec = ProvisionSpec {
            build_id: "1".to_string(),
            targets: vec!["fedora-rawhide-x86_64".to_string()],
            memory_requirement: 0,
            timeout_seconds: 60,
        };

        assert_eq!(provisioner.provision(&spec).await.unwrap(), address);
        assert_eq!(provisioner.provision(&spec).await.unwrap(), address);
        assert!(provisioner.deprovision(&address).await.is_ok());
        assert_eq!(provisioner.mode(), ProvisionMode::Pinned);
    }
}
