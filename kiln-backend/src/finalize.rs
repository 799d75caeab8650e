//! Result finalization
//!
//! Once a job's target loop is over, its job file is moved out of the
//! spool into the job's destination directory and one status event is
//! emitted. Neither step can change the job's build status: a failed move is
//! a finalization problem, not a build failure.

use anyhow::Context;
use async_trait::async_trait;
use kiln_client::FrontendClient;
use kiln_core::domain::job::JobDescriptor;
use kiln_core::dto::status::BuildStatusEvent;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::event_log::EventLog;

/// Receives the status event of every completed job
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, event: &BuildStatusEvent) -> anyhow::Result<()>;
}

/// Reports build results to the frontend over HTTP
pub struct FrontendReporter {
    client: FrontendClient,
}

impl FrontendReporter {
    pub fn new(client: FrontendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusReporter for FrontendReporter {
    async fn report(&self, event: &BuildStatusEvent) -> anyhow::Result<()> {
        self.client
            .update_build(event)
            .await
            .with_context(|| format!("Failed to report build {}", event.build_id))
    }
}

/// Used when no frontend is configured
pub struct NoopReporter;

#[async_trait]
impl StatusReporter for NoopReporter {
    async fn report(&self, event: &BuildStatusEvent) -> anyhow::Result<()> {
        debug!("No frontend configured, build {} not reported", event.build_id);
        Ok(())
    }
}

/// What finalization achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    /// New location of the job file, if the move succeeded
    pub moved_to: Option<PathBuf>,
    /// Whether the status event was accepted
    pub reported: bool,
}

/// Moves job files into place and emits status events
pub struct ResultFinalizer {
    reporter: Arc<dyn StatusReporter>,
}

impl ResultFinalizer {
    pub fn new(reporter: Arc<dyn StatusReporter>) -> Self {
        Self { reporter }
    }

    /// Finalizes a job whose status has been computed
    pub async fn finalize(&self, event: &BuildStatusEvent, job: &JobDescriptor, log: &dyn EventLog) -> FinalizeReport {
        let elapsed = job
            .elapsed()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default();
        log.log(&format!(
            "{} status {}. Took {} seconds",
            job.build_id, event.status, elapsed
        ));

        let moved_to = match move_job_file(&job.job_file, &job.destination_dir) {
            Ok(target) => {
                debug!("Moved job file to {}", target.display());
                Some(target)
            }
            Err(e) => {
                let msg = format!(
                    "failed to move job file {} to {}: {:#}",
                    job.job_file.display(),
                    job.destination_dir.display(),
                    e
                );
                error!("{}", msg);
                log.log(&msg);
                None
            }
        };

        let reported = match self.reporter.report(event).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{:#}", e);
                log.log(&format!("failed to report build {}: {:#}", job.build_id, e));
                false
            }
        };

        FinalizeReport { moved_to, reported }
    }
}

/// Moves a file into `dir` under its original base name
///
/// Falls back to copy and remove when a rename is not possible, for
/// instance across filesystems.
pub fn move_job_file(job_file: &Path, dir: &Path) -> anyhow::Result<PathBuf> {
    let name = job_file
        .file_name()
        .with_context(|| format!("{} has no file name", job_file.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let target = dir.join(name);
    if let Err(rename_err) = std::fs::rename(job_file, &target) {
        debug!("rename failed ({}), copying instead", rename_err);
        std::fs::copy(job_file, &target)
            .with_context(|| format!("Failed to copy job file: rename error was {}", rename_err))?;
        std::fs::remove_file(job_file).context("Failed to remove job file after copy")?;
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::MemoryEventLog;
    use crate::testing::{RecordingReporter, sample_job};
    use kiln_core::domain::outcome::TargetOutcome;

    #[test]
    fn test_move_preserves_name_and_bytes() {
        let spool = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let job_file = spool.path().join("1001.json");
        std::fs::write(&job_file, b"{\"builds\": []}").unwrap();

        let dest = results.path().join("alice").join("tools");
        let moved = move_job_file(&job_file, &dest).unwrap();

        assert_eq!(moved, dest.join("1001.json"));
        assert!(!job_file.exists());
        assert_eq!(std::fs::read(&moved).unwrap(), b"{\"builds\": []}");
    }

    #[test]
    fn test_move_missing_file_fails() {
        let results = tempfile::TempDir::new().unwrap();
        assert!(move_job_file(Path::new("/nonexistent/kiln/1.json"), results.path()).is_err());
    }

    #[tokio::test]
    async fn test_finalize_moves_and_reports() {
        let spool = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let mut job = sample_job(spool.path(), results.path(), &["fedora-rawhide-x86_64"]);
        job.mark_started();
        let outcomes = vec![TargetOutcome::succeeded("fedora-rawhide-x86_64", job.started_at.unwrap())];
        job.mark_finished(&outcomes);

        let reporter = Arc::new(RecordingReporter::default());
        let finalizer = ResultFinalizer::new(reporter.clone());
        let log = MemoryEventLog::new();
        let event = BuildStatusEvent::from_job(&job, &outcomes, 0);

        let report = finalizer.finalize(&event, &job, &log).await;

        assert_eq!(report.moved_to, Some(job.destination_dir.join("1001.json")));
        assert!(report.reported);
        assert_eq!(reporter.events().len(), 1);
        assert!(log.contains("1001 status succeeded. Took"));
    }

    #[tokio::test]
    async fn test_move_failure_does_not_change_status() {
        let spool = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let mut job = sample_job(spool.path(), results.path(), &["fedora-rawhide-x86_64"]);
        std::fs::remove_file(&job.job_file).unwrap();
        job.mark_started();
        job.mark_finished(&[]);

        let reporter = Arc::new(RecordingReporter::default());
        let finalizer = ResultFinalizer::new(reporter.clone());
        let log = MemoryEventLog::new();
        let event = BuildStatusEvent::from_job(&job, &[], 0);

        let report = finalizer.finalize(&event, &job, &log).await;

        assert!(report.moved_to.is_none());
        assert!(report.reported);
        assert!(log.contains("failed to move job file"));
        let events = reporter.events();
        assert_eq!(events[0].status, kiln_core::domain::outcome::BuildStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_report_failure_is_logged() {
        let spool = tempfile::TempDir::new().unwrap();
        let results = tempfile::TempDir::new().unwrap();
        let mut job = sample_job(spool.path(), results.path(), &["fedora-rawhide-x86_64"]);
        job.mark_started();
        job.mark_finished(&[]);

        let reporter = Arc::new(RecordingReporter::failing());
        let finalizer = ResultFinalizer::new(reporter);
        let log = MemoryEventLog::new();
        let event = BuildStatusEvent::from_job(&job, &[], 0);

        let report = finalizer.finalize(&event, &job, &log).await;

        assert!(report.moved_to.is_some());
        assert!(!report.reported);
        assert!(log.contains("failed to report build 1001"));
    }
}
