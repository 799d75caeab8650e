//! Build outcome domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final status of a job or of a single target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Succeeded,
    Failed,
}

impl BuildStatus {
    /// Aggregates per-target outcomes into a job status
    ///
    /// The job failed if any target failed. No outcomes means nothing failed.
    pub fn aggregate<'a>(outcomes: impl IntoIterator<Item = &'a TargetOutcome>) -> Self {
        if outcomes.into_iter().any(|o| o.status == BuildStatus::Failed) {
            BuildStatus::Failed
        } else {
            BuildStatus::Succeeded
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Succeeded => write!(f, "succeeded"),
            BuildStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of building a job's packages against one target (chroot)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: String,
    pub status: BuildStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Why the target failed, if it did
    pub error: Option<String>,
}

impl TargetOutcome {
    pub fn succeeded(target: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            target: target.into(),
            status: BuildStatus::Succeeded,
            started_at,
            ended_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(
        target: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            status: BuildStatus::Failed,
            started_at,
            ended_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(target: &str, status: BuildStatus) -> TargetOutcome {
        let now = Utc::now();
        TargetOutcome {
            target: target.to_string(),
            status,
            started_at: now,
            ended_at: now,
            error: None,
        }
    }

    #[test]
    fn test_aggregate_all_succeeded() {
        let outcomes = vec![
            outcome("fedora-rawhide-x86_64", BuildStatus::Succeeded),
            outcome("epel-9-x86_64", BuildStatus::Succeeded),
        ];
        assert_eq!(BuildStatus::aggregate(&outcomes), BuildStatus::Succeeded);
    }

    #[test]
    fn test_aggregate_any_failure_fails_job() {
        for failing in 0..3 {
            let outcomes: Vec<_> = (0..3)
                .map(|i| {
                    let status = if i == failing {
                        BuildStatus::Failed
                    } else {
                        BuildStatus::Succeeded
                    };
                    outcome(&format!("target-{}", i), status)
                })
                .collect();
            assert_eq!(BuildStatus::aggregate(&outcomes), BuildStatus::Failed);
        }
    }

    #[test]
    fn test_aggregate_empty_is_success() {
        assert_eq!(BuildStatus::aggregate(&Vec::<TargetOutcome>::new()), BuildStatus::Succeeded);
    }

    #[test]
    fn test_failed_outcome_keeps_reason() {
        let o = TargetOutcome::failed("epel-9-x86_64", Utc::now(), "mock exited with 1");
        assert_eq!(o.status, BuildStatus::Failed);
        assert_eq!(o.error.as_deref(), Some("mock exited with 1"));
        assert!(o.duration() >= chrono::Duration::zero());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&BuildStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }
}
