//! Remote mock builds
//!
//! Drives the `mockremote` tool, which copies the sources to the builder,
//! runs mock there for a single chroot and pulls the results back into the
//! job's destination directory.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{BuildError, BuildExecutor, BuildOutcome, BuildRequest};

/// Build executor invoking a mockremote-compatible command
pub struct MockRemoteExecutor {
    program: String,
}

impl MockRemoteExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, request: &BuildRequest) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-b")
            .arg(request.address.as_str())
            .arg("-r")
            .arg(&request.target)
            .arg("-d")
            .arg(&request.destination_dir)
            .arg("-t")
            .arg(request.timeout_seconds.to_string())
            .arg("--continue")
            .arg("--recurse");

        for repo in &request.repositories {
            command.arg("-a").arg(repo);
        }

        command.args(&request.packages);
        command
    }
}

#[async_trait]
impl BuildExecutor for MockRemoteExecutor {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
        info!(
            "Building {} package(s) for {} on {}",
            request.packages.len(),
            request.target,
            request.address
        );

        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)?;
        let stderr_file = log_file.try_clone()?;

        let mut child = self
            .command(request)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_file))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let status = if request.timeout_seconds == 0 {
            child.wait().await?
        } else {
            let limit = Duration::from_secs(request.timeout_seconds);
            match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        "Build for {} on {} exceeded {}s, killing it",
                        request.target, request.address, request.timeout_seconds
                    );
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill timed out build: {}", e);
                    }
                    return Err(BuildError::TimedOut {
                        seconds: request.timeout_seconds,
                    });
                }
            }
        };

        if status.success() {
            debug!("Build for {} on {} succeeded", request.target, request.address);
            Ok(BuildOutcome::Succeeded)
        } else {
            Ok(BuildOutcome::Failed {
                reason: format!(
                    "{} exited with {} (see {})",
                    self.program,
                    status.code().unwrap_or(-1),
                    request.log_path.display()
                ),
            })
        }
    }
}
