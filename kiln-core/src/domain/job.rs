//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::domain::outcome::{BuildStatus, TargetOutcome};
use crate::dto::job_file::{BuildEntry, JobFile, JobFileError, split_list};

/// One build request, parsed from a job file
///
/// Owned by exactly one worker from dequeue to finalization. Everything except
/// `started_at`, `ended_at` and `status` is fixed once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub build_id: String,
    pub copr_id: String,
    pub user_id: String,

    /// Package names, in build order
    pub packages: Vec<String>,
    /// Extra repositories made available to the build
    pub repositories: Vec<String>,
    /// Target environments (chroots), visited in this order
    pub targets: Vec<String>,

    /// Memory hint for the provisioning backend
    pub memory_requirement: u64,
    /// Per-target build timeout, enforced by the build backend
    pub timeout_seconds: u64,

    /// `<destdir>/<owner>/<project>`
    pub destination_dir: PathBuf,
    /// Job file in the spool; moved into `destination_dir` on completion
    pub job_file: PathBuf,

    /// Identifies this processing attempt in logs and status events
    pub attempt_id: Uuid,

    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: Option<BuildStatus>,
}

impl JobDescriptor {
    /// Reads and parses a job file
    ///
    /// # Arguments
    /// * `path` - Job file in the spool directory
    /// * `destdir_root` - Configured results root
    pub fn from_job_file(path: &Path, destdir_root: &Path) -> Result<Self, JobFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| JobFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = JobFile::from_json(&text)?;
        Self::from_build(file.first_build()?, path, destdir_root)
    }

    /// Builds a descriptor from an already decoded build entry
    pub fn from_build(
        build: &BuildEntry,
        job_file: &Path,
        destdir_root: &Path,
    ) -> Result<Self, JobFileError> {
        let build_id = required(build.id.clone(), "id")?;
        let user_id = required(build.user_id.clone(), "user_id")?;

        let packages = split_list(&required(build.pkgs.clone(), "pkgs")?);
        if packages.is_empty() {
            return Err(JobFileError::InvalidField {
                field: "pkgs",
                reason: "no packages listed".to_string(),
            });
        }

        let repositories = split_list(&required(build.repos.clone(), "repos")?);

        let targets = split_list(&required(build.chroots.clone(), "chroots")?);
        if targets.is_empty() {
            return Err(JobFileError::InvalidField {
                field: "chroots",
                reason: "no chroots listed".to_string(),
            });
        }
        for target in &targets {
            check_path_component(target, "chroots")?;
        }

        let memory_requirement = required(build.memory_reqs, "memory_reqs")?;
        let timeout_seconds = required(build.timeout, "timeout")?;

        let project = build.copr.as_ref().ok_or(JobFileError::MissingField("copr"))?;
        let copr_id = required(project.id.clone(), "copr.id")?;
        let project_name = required(project.name.clone(), "copr.name")?;
        let owner_name = required(
            project.owner.as_ref().and_then(|o| o.name.clone()),
            "copr.owner.name",
        )?;

        check_path_component(&owner_name, "copr.owner.name")?;
        check_path_component(&project_name, "copr.name")?;

        Ok(Self {
            build_id,
            copr_id,
            user_id,
            packages,
            repositories,
            targets,
            memory_requirement,
            timeout_seconds,
            destination_dir: destdir_root.join(owner_name).join(project_name),
            job_file: job_file.to_path_buf(),
            attempt_id: Uuid::new_v4(),
            started_at: None,
            ended_at: None,
            status: None,
        })
    }

    /// Results directory for one target
    pub fn target_destination(&self, target: &str) -> PathBuf {
        self.destination_dir.join(target)
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    /// Records the end of the target loop and aggregates the job status
    pub fn mark_finished(&mut self, outcomes: &[TargetOutcome]) -> BuildStatus {
        let status = BuildStatus::aggregate(outcomes);
        self.ended_at = Some(Utc::now());
        self.status = Some(status);
        status
    }

    /// Wall-clock time between start and end, once both are known
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, JobFileError> {
    value.ok_or(JobFileError::MissingField(field))
}

/// Owner, project and chroot names become directory names under the results root
fn check_path_component(name: &str, field: &'static str) -> Result<(), JobFileError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(JobFileError::InvalidField {
            field,
            reason: format!("'{}' is not a single path component", name),
        }),
    }
}
