//! Worker pool

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::{JobReport, Ports, Worker};
use crate::config::Config;
use crate::event_log::{EventLog, FileEventLog};
use crate::shutdown::ShutdownListener;

/// Fixed-size set of workers sharing one queue
pub struct WorkerPool {
    config: Arc<Config>,
    ports: Ports,
    shutdown: ShutdownListener,
    reports: Option<mpsc::UnboundedSender<JobReport>>,
}

impl WorkerPool {
    pub fn new(config: Arc<Config>, ports: Ports, shutdown: ShutdownListener) -> Self {
        Self {
            config,
            ports,
            shutdown,
            reports: None,
        }
    }

    #[allow(dead_code)]
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<JobReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Runs `worker_count` workers until all of them have stopped
    pub async fn run(self) {
        let mut workers = JoinSet::new();

        for id in 0..self.config.worker_count {
            let log = Arc::new(FileEventLog::new(id, self.config.worker_log_path(id)));
            match &self.config.pinned_address {
                Some(address) => log.log(&format!("creating worker: {}", address)),
                None => log.log("creating worker: with dynamic ip"),
            }
            let mut worker = Worker::new(
                id,
                Arc::clone(&self.config),
                self.ports.clone(),
                log,
                self.shutdown.clone(),
            );
            if let Some(reports) = &self.reports {
                worker = worker.with_reports(reports.clone());
            }
            workers.spawn(worker.run());
        }

        info!("Started {} worker(s)", self.config.worker_count);

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }

        info!("All workers stopped");
    }
}
