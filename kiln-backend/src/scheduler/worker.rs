//! Job worker
//!
//! A worker loops over the shared queue and processes one job at a time.
//! Every job attempt runs in its own task so that a panic in one job is
//! contained: the worker logs it and moves on to the next job file.

use chrono::Utc;
use kiln_core::domain::job::JobDescriptor;
use kiln_core::domain::machine::MachineAddress;
use kiln_core::domain::outcome::{BuildStatus, TargetOutcome};
use kiln_core::dto::status::BuildStatusEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::Ports;
use crate::build::{BuildOutcome, BuildRequest};
use crate::config::Config;
use crate::event_log::EventLog;
use crate::finalize::{FinalizeReport, move_job_file};
use crate::provision::{MachineLease, ProvisionSpec};
use crate::shutdown::ShutdownListener;

/// Recorded for targets skipped or cut short by an immediate shutdown
pub const ABANDONED_ON_SHUTDOWN: &str = "abandoned on shutdown";

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// How a dequeued job file ended up
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The target loop ran, the job was finalized and its machine released
    Completed {
        status: BuildStatus,
        targets: Vec<TargetOutcome>,
        finalize: FinalizeReport,
    },
    /// The job file could not be turned into a job
    ParseFailed { reason: String },
    /// No machine could be obtained
    ProvisionFailed { reason: String },
    /// The job task panicked
    Crashed { reason: String },
}

/// Summary of one processed job file
#[derive(Debug, Clone)]
pub struct JobReport {
    pub worker: usize,
    pub job_file: PathBuf,
    pub build_id: Option<String>,
    pub address: Option<MachineAddress>,
    pub outcome: JobOutcome,
}

impl JobReport {
    /// Build status, for jobs that completed
    #[cfg(test)]
    pub fn status(&self) -> Option<BuildStatus> {
        match &self.outcome {
            JobOutcome::Completed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let job = match &self.build_id {
            Some(build_id) => format!("build {}", build_id),
            None => format!("job file {}", self.job_file.display()),
        };

        match &self.outcome {
            JobOutcome::Completed {
                status,
                targets,
                finalize,
            } => {
                write!(f, "{} {} ({} target(s)", job, status, targets.len())?;
                if let Some(address) = &self.address {
                    write!(f, " on {}", address)?;
                }
                write!(f, ")")?;
                if finalize.moved_to.is_none() {
                    write!(f, ", job file not moved")?;
                }
                if !finalize.reported {
                    write!(f, ", not reported")?;
                }
                Ok(())
            }
            JobOutcome::ParseFailed { reason } => write!(f, "{} rejected: {}", job, reason),
            JobOutcome::ProvisionFailed { reason } => write!(f, "{} abandoned: {}", job, reason),
            JobOutcome::Crashed { reason } => write!(f, "{} crashed: {}", job, reason),
        }
    }
}

/// One member of the worker pool
pub struct Worker {
    id: usize,
    config: Arc<Config>,
    ports: Ports,
    log: Arc<dyn EventLog>,
    shutdown: ShutdownListener,
    reports: Option<mpsc::UnboundedSender<JobReport>>,
    retry_delay: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        config: Arc<Config>,
        ports: Ports,
        log: Arc<dyn EventLog>,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            id,
            config,
            ports,
            log,
            shutdown,
            reports: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sends a [`JobReport`] for every processed job file
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<JobReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Initial delay before retrying a failed dequeue
    #[allow(dead_code)]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Processes jobs until the queue closes or shutdown is requested
    pub async fn run(mut self) {
        info!(worker = self.id, "Worker started");
        let mut retry_delay = self.retry_delay;

        loop {
            if self.shutdown.is_stopping() {
                info!(worker = self.id, "Shutdown requested, not taking new jobs");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.shutdown.stopping() => break,
                next = self.ports.queue.dequeue() => next,
            };

            let job_file = match next {
                Ok(Some(job_file)) => {
                    retry_delay = self.retry_delay;
                    job_file
                }
                Ok(None) => {
                    info!(worker = self.id, "Job queue closed");
                    break;
                }
                Err(e) => {
                    warn!(worker = self.id, "Dequeue failed, retrying in {:?}: {}", retry_delay, e);
                    self.log.log(&format!("failed to take job from queue: {}", e));
                    tokio::select! {
                        biased;
                        _ = self.shutdown.stopping() => break,
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                    continue;
                }
            };

            let report = self.process(job_file).await;
            info!(worker = report.worker, "{}", report);

            if let Some(reports) = &self.reports {
                let _ = reports.send(report);
            }
        }

        info!(worker = self.id, "Worker stopped");
    }

    /// Runs one job attempt in its own task
    async fn process(&self, job_file: PathBuf) -> JobReport {
        let attempt = JobAttempt {
            worker: self.id,
            destdir: self.config.destdir.clone(),
            failed_dir: self.config.failed_jobs_dir(),
            ports: self.ports.clone(),
            log: Arc::clone(&self.log),
            shutdown: self.shutdown.clone(),
        };

        let handle = tokio::spawn(attempt.run(job_file.clone()));

        match handle.await {
            Ok(report) => report,
            Err(e) => {
                error!(
                    worker = self.id,
                    "Job task for {} panicked: {}",
                    job_file.display(),
                    e
                );
                self.log
                    .log(&format!("job {} crashed: {}", job_file.display(), e));
                if job_file.exists() {
                    set_aside(
                        self.id,
                        &job_file,
                        &self.config.failed_jobs_dir(),
                        self.log.as_ref(),
                    );
                }
                JobReport {
                    worker: self.id,
                    job_file,
                    build_id: None,
                    address: None,
                    outcome: JobOutcome::Crashed {
                        reason: e.to_string(),
                    },
                }
            }
        }
    }
}

/// State owned by a single job attempt
struct JobAttempt {
    worker: usize,
    destdir: PathBuf,
    failed_dir: PathBuf,
    ports: Ports,
    log: Arc<dyn EventLog>,
    shutdown: ShutdownListener,
}

impl JobAttempt {
    async fn run(mut self, job_file: PathBuf) -> JobReport {
        let mut job = match JobDescriptor::from_job_file(&job_file, &self.destdir) {
            Ok(job) => job,
            Err(e) => {
                let reason = e.to_string();
                error!(
                    worker = self.worker,
                    "Failed to parse job file {}: {}",
                    job_file.display(),
                    reason
                );
                self.log
                    .log(&format!("failed to parse job file {}: {}", job_file.display(), reason));
                set_aside(self.worker, &job_file, &self.failed_dir, self.log.as_ref());
                return self.report(job_file, None, None, JobOutcome::ParseFailed { reason });
            }
        };

        info!(
            worker = self.worker,
            "Processing build {} (attempt {})", job.build_id, job.attempt_id
        );

        let lease = match self.provision(&job).await {
            Ok(lease) => lease,
            Err(reason) => {
                set_aside(self.worker, &job_file, &self.failed_dir, self.log.as_ref());
                let build_id = Some(job.build_id.clone());
                return self.report(job_file, build_id, None, JobOutcome::ProvisionFailed { reason });
            }
        };
        let address = lease.address().clone();

        job.mark_started();
        let targets = self.build_targets(&job, &address).await;
        let status = job.mark_finished(&targets);

        let event = BuildStatusEvent::from_job(&job, &targets, self.worker);
        let finalize = self
            .ports
            .finalizer
            .finalize(&event, &job, self.log.as_ref())
            .await;

        self.log.log(&format!("worker finished build: {}", address));
        lease.release().await;

        let build_id = Some(job.build_id);
        self.report(
            job_file,
            build_id,
            Some(address),
            JobOutcome::Completed {
                status,
                targets,
                finalize,
            },
        )
    }

    /// Obtains the job's machine
    ///
    /// On failure a partially created machine is released right away.
    async fn provision(&self, job: &JobDescriptor) -> Result<MachineLease, String> {
        let spec = ProvisionSpec {
            build_id: job.build_id.clone(),
            targets: job.targets.clone(),
            memory_requirement: job.memory_requirement,
            timeout_seconds: job.timeout_seconds,
        };

        self.log.log("spawning instance begin");

        match self.ports.provisioner.provision(&spec).await {
            Ok(address) => {
                self.log.log(&format!("spawning instance end: {}", address));
                Ok(MachineLease::new(
                    address,
                    Arc::clone(&self.ports.provisioner),
                    Arc::clone(&self.log),
                ))
            }
            Err(e) => {
                error!(
                    worker = self.worker,
                    "Failed to provision builder for build {}: {}", job.build_id, e
                );
                self.log.log(&format!("failure to setup instance: {}", e));

                if let Some(partial) = e.partial() {
                    warn!(
                        worker = self.worker,
                        "Releasing partially provisioned builder {}", partial
                    );
                    MachineLease::new(
                        partial.clone(),
                        Arc::clone(&self.ports.provisioner),
                        Arc::clone(&self.log),
                    )
                    .release()
                    .await;
                }

                Err(e.to_string())
            }
        }
    }

    /// Builds every target in order on `address`
    async fn build_targets(
        &mut self,
        job: &JobDescriptor,
        address: &MachineAddress,
    ) -> Vec<TargetOutcome> {
        let mut outcomes = Vec::with_capacity(job.targets.len());
        let mut abandoning = false;

        for target in &job.targets {
            let started_at = Utc::now();

            if abandoning {
                outcomes.push(TargetOutcome::failed(target, started_at, ABANDONED_ON_SHUTDOWN));
                continue;
            }

            let destination = job.target_destination(target);
            if let Err(e) = std::fs::create_dir_all(&destination) {
                let msg = format!(
                    "Could not make results dir for job: {} - {}",
                    destination.display(),
                    e
                );
                warn!(worker = self.worker, "{}", msg);
                self.log.log(&msg);
                outcomes.push(TargetOutcome::failed(target, started_at, msg));
                continue;
            }

            self.log.log(&format!(
                "mockremote {} {} {} {} {:?}",
                address,
                job.timeout_seconds,
                job.destination_dir.display(),
                target,
                job.repositories
            ));

            let request = BuildRequest {
                address: address.clone(),
                target: target.clone(),
                packages: job.packages.clone(),
                repositories: job.repositories.clone(),
                timeout_seconds: job.timeout_seconds,
                destination_dir: job.destination_dir.clone(),
                log_path: destination.join("mockremote.log"),
            };

            let result = tokio::select! {
                biased;
                _ = self.shutdown.immediate() => None,
                result = self.ports.executor.build(&request) => Some(result),
            };

            let outcome = match result {
                None => {
                    warn!(
                        worker = self.worker,
                        "Abandoning build {} on {} for shutdown", job.build_id, address
                    );
                    self.log
                        .log(&format!("{} - {}: {}", address, target, ABANDONED_ON_SHUTDOWN));
                    abandoning = true;
                    TargetOutcome::failed(target, started_at, ABANDONED_ON_SHUTDOWN)
                }
                Some(Ok(BuildOutcome::Succeeded)) => TargetOutcome::succeeded(target, started_at),
                Some(Ok(BuildOutcome::Failed { reason })) => {
                    self.log.log(&format!("{} - {}", address, reason));
                    TargetOutcome::failed(target, started_at, reason)
                }
                Some(Err(e)) => {
                    error!(
                        worker = self.worker,
                        "Build of {} on {} failed: {}", target, address, e
                    );
                    self.log.log(&format!("{} - {}: {}", address, target, e));
                    TargetOutcome::failed(target, started_at, e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    fn report(
        &self,
        job_file: PathBuf,
        build_id: Option<String>,
        address: Option<MachineAddress>,
        outcome: JobOutcome,
    ) -> JobReport {
        JobReport {
            worker: self.worker,
            job_file,
            build_id,
            address,
            outcome,
        }
    }
}

/// Moves a job file that will not be built out of the spool
///
/// The spool never hands out the same file twice, not even after a restart.
fn set_aside(worker: usize, job_file: &Path, failed_dir: &Path, log: &dyn EventLog) {
    match move_job_file(job_file, failed_dir) {
        Ok(target) => {
            warn!(worker, "Set aside job file {}", target.display());
            log.log(&format!("job file moved to {}", target.display()));
        }
        Err(e) => {
            let msg = format!(
                "failed to move job file {} to {}: {:#}",
                job_file.display(),
                failed_dir.display(),
                e
            );
            error!(worker, "{}", msg);
            log.log(&msg);
        }
    }
}
