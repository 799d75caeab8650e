//! Kiln Backend
//!
//! Dispatches package build jobs onto freshly provisioned build machines.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Queue: Spool directory scanner feeding a shared job queue
//! - Provisioning / Build: Pluggable ports for machines and remote builds
//! - Scheduler: Worker pool driving each job from dequeue to teardown
//!
//! The frontend drops one job file per build into the spool directory.
//! Each worker takes one, spawns a machine, builds every chroot on it,
//! moves the job file next to the results and tears the machine down.

mod build;
mod config;
mod event_log;
mod finalize;
mod provision;
mod queue;
mod scheduler;
mod shutdown;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use kiln_client::FrontendClient;
use kiln_core::domain::machine::MachineAddress;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::build::{BuildExecutor, MockRemoteExecutor};
use crate::config::Config;
use crate::finalize::{FrontendReporter, NoopReporter, ResultFinalizer, StatusReporter};
use crate::provision::{PinnedProvisioner, PlaybookProvisioner, Provisioner};
use crate::queue::{ChannelQueue, Spool};
use crate::scheduler::{Ports, WorkerPool};
use crate::shutdown::ShutdownController;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiln_backend=info,kiln_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kiln backend");

    let mut config = load_config()?;
    if config.pinned_address.is_some() && config.worker_count > 1 {
        warn!(
            "A pinned builder is shared by all workers, using 1 worker instead of {}",
            config.worker_count
        );
        config.worker_count = 1;
    }
    info!(
        "Loaded configuration: backend_id={}, workers={}, jobs_dir={}, destdir={}",
        config.backend_id,
        config.worker_count,
        config.jobs_dir.display(),
        config.destdir.display()
    );

    prepare_directories(&config)?;
    let config = Arc::new(config);

    let provisioner = build_provisioner(&config)?;
    info!("Provisioning mode: {}", provisioner.mode());

    let executor: Arc<dyn BuildExecutor> =
        Arc::new(MockRemoteExecutor::new(config.build_command.clone()));
    let finalizer = Arc::new(ResultFinalizer::new(build_reporter(&config).await));

    let (producer, queue) = ChannelQueue::new(config.queue_capacity);
    let controller = Arc::new(ShutdownController::new());

    let spool = Spool::new(config.jobs_dir.clone(), config.spool_interval, producer);
    let spool_handle = tokio::spawn(spool.run(controller.listener()));

    let signals = {
        let controller = Arc::clone(&controller);
        let grace = config.shutdown_grace;
        tokio::spawn(async move { shutdown::listen_for_signals(&controller, grace).await })
    };

    let ports = Ports {
        queue: Arc::new(queue),
        provisioner,
        executor,
        finalizer,
    };

    info!("Backend initialized successfully");
    WorkerPool::new(Arc::clone(&config), ports, controller.listener())
        .run()
        .await;
    info!("Workers stopped (shutdown state: {:?})", controller.state());

    signals.abort();
    controller.request_graceful();
    if let Err(e) = spool_handle.await {
        warn!("Spool task failed: {}", e);
    }

    info!("Kiln backend stopped");
    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            warn!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Creates the spool, results and log directories
fn prepare_directories(config: &Config) -> Result<()> {
    for dir in [&config.jobs_dir, &config.destdir, &config.worker_logdir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(())
}

fn build_provisioner(config: &Config) -> Result<Arc<dyn Provisioner>> {
    match &config.pinned_address {
        Some(raw) => {
            let address = MachineAddress::parse(raw)
                .with_context(|| format!("Invalid pinned builder address '{}'", raw))?;
            info!("Creating workers for pinned builder {}", address);
            Ok(Arc::new(PinnedProvisioner::new(address)))
        }
        None => {
            info!("Creating workers with dynamic builders");
            Ok(Arc::new(PlaybookProvisioner::new(
                config.spawn_playbook.clone(),
                config.terminate_playbook.clone(),
            )))
        }
    }
}

/// Picks the status reporter
///
/// An unreachable frontend is not fatal: builds still run and every
/// failed report is logged.
async fn build_reporter(config: &Config) -> Arc<dyn StatusReporter> {
    let Some(url) = &config.frontend_url else {
        info!("No frontend configured, build results are not reported");
        return Arc::new(NoopReporter);
    };

    let client = FrontendClient::new(url.clone());
    match client.health().await {
        Ok(()) => info!("Frontend at {} is reachable", client.base_url()),
        Err(e) => warn!("Frontend at {} is not reachable yet: {}", client.base_url(), e),
    }
    Arc::new(FrontendReporter::new(client))
}
