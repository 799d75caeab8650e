//! Scoped ownership of a provisioned machine

use kiln_core::domain::machine::MachineAddress;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::Provisioner;
use crate::event_log::EventLog;

/// A build machine held by one worker for the duration of one job
///
/// The machine is released exactly once. The normal path calls
/// [`MachineLease::release`]; if the lease is dropped instead (the job task
/// panicked or was cancelled), the drop schedules the teardown on the
/// current runtime.
pub struct MachineLease {
    address: MachineAddress,
    provisioner: Arc<dyn Provisioner>,
    log: Arc<dyn EventLog>,
    released: bool,
}

impl MachineLease {
    pub fn new(
        address: MachineAddress,
        provisioner: Arc<dyn Provisioner>,
        log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            address,
            provisioner,
            log,
            released: false,
        }
    }

    pub fn address(&self) -> &MachineAddress {
        &self.address
    }

    /// Deprovisions the machine
    ///
    /// Failures are logged, never returned. Returns whether the teardown succeeded.
    pub async fn release(mut self) -> bool {
        self.released = true;
        teardown(self.provisioner.as_ref(), &self.address, self.log.as_ref()).await
    }
}

impl Drop for MachineLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        warn!(
            "Lease on {} dropped without release, tearing down in background",
            self.address
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let address = self.address.clone();
                let provisioner = Arc::clone(&self.provisioner);
                let log = Arc::clone(&self.log);
                handle.spawn(async move {
                    teardown(provisioner.as_ref(), &address, log.as_ref()).await;
                });
            }
            Err(_) => {
                error!(
                    "No runtime available to tear down {}, machine may leak",
                    self.address
                );
                self.log
                    .log(&format!("could not terminate instance {}: no runtime", self.address));
            }
        }
    }
}

async fn teardown(
    provisioner: &dyn Provisioner,
    address: &MachineAddress,
    log: &dyn EventLog,
) -> bool {
    log.log(&format!("terminate instance begin: {}", address));

    match provisioner.deprovision(address).await {
        Ok(()) => {
            log.log(&format!("terminate instance end: {}", address));
            info!("Released builder {}", address);
            true
        }
        Err(e) => {
            log.log(&format!("failure to terminate instance {}: {}", address, e));
            warn!("Failed to release builder {}: {}", address, e);
            false
        }
    }
}
