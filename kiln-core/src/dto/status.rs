//! Status event DTOs reported to the frontend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::job::JobDescriptor;
use crate::domain::outcome::{BuildStatus, TargetOutcome};

/// The single status event emitted for a completed job
///
/// `status` is the authoritative job result. `targets` is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStatusEvent {
    pub build_id: String,
    pub copr_id: String,
    pub user_id: String,
    pub attempt_id: Uuid,
    pub worker: usize,
    pub status: BuildStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub destination_dir: PathBuf,
    pub targets: Vec<TargetStatus>,
}

/// Per-target entry of a status event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub name: String,
    pub status: BuildStatus,
}

impl BuildStatusEvent {
    /// Builds the event for a job whose target loop has finished
    pub fn from_job(job: &JobDescriptor, outcomes: &[TargetOutcome], worker: usize) -> Self {
        Self {
            build_id: job.build_id.clone(),
            copr_id: job.copr_id.clone(),
            user_id: job.user_id.clone(),
            attempt_id: job.attempt_id,
            worker,
            status: job
                .status
                .unwrap_or_else(|| BuildStatus::aggregate(outcomes)),
            started_at: job.started_at,
            ended_at: job.ended_at,
            destination_dir: job.destination_dir.clone(),
            targets: outcomes
                .iter()
                .map(|o| TargetStatus {
                    name: o.target.clone(),
                    status: o.status,
                })
                .collect(),
        }
    }
}
