//! Spool directory producer
//!
//! The frontend writes one JSON job file per build into the spool
//! directory. The spool scans it periodically and enqueues every file it
//! has not handed out yet. Once a worker finalizes a job its file leaves the
//! directory and the spool forgets it.
//!
//! A file modified within the last scan interval may still be being
//! written, so it is left for a later scan.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time;
use tracing::{debug, error, info, warn};

use super::QueueProducer;
use crate::shutdown::ShutdownListener;

/// Periodic scanner feeding job files into the queue
pub struct Spool {
    jobs_dir: PathBuf,
    interval: Duration,
    producer: QueueProducer,
    /// Files already handed to the queue and still present in the directory
    seen: HashSet<PathBuf>,
}

impl Spool {
    pub fn new(jobs_dir: PathBuf, interval: Duration, producer: QueueProducer) -> Self {
        Self {
            jobs_dir,
            interval,
            producer,
            seen: HashSet::new(),
        }
    }

    /// Scans until shutdown is requested, then closes the queue
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        info!(
            "Starting spool on {} (interval: {:?})",
            self.jobs_dir.display(),
            self.interval
        );

        let mut interval = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.stopping() => break,
            }

            let pending = match self.collect_new() {
                Ok(pending) => pending,
                Err(e) => {
                    error!("Failed to scan spool {}: {}", self.jobs_dir.display(), e);
                    continue;
                }
            };

            if !pending.is_empty() {
                info!("Found {} new job file(s)", pending.len());
            }

            for job_file in pending {
                tokio::select! {
                    delivered = self.producer.enqueue(job_file.clone()) => {
                        if !delivered {
                            warn!("All workers are gone, stopping spool");
                            return;
                        }
                        self.seen.insert(job_file);
                    }
                    _ = shutdown.stopping() => {
                        info!("Spool stopped");
                        return;
                    }
                }
            }
        }

        // Dropping the producer closes the queue once it is drained
        info!("Spool stopped");
    }

    /// Lists job files that have not been enqueued yet, in name order
    ///
    /// Also forgets files that disappeared from the directory.
    pub fn collect_new(&mut self) -> std::io::Result<Vec<PathBuf>> {
        let present = list_job_files(&self.jobs_dir, self.interval)?;

        let before = self.seen.len();
        self.seen.retain(|path| present.contains(path));
        if self.seen.len() != before {
            debug!("Forgot {} finalized job file(s)", before - self.seen.len());
        }

        Ok(present
            .into_iter()
            .filter(|path| !self.seen.contains(path))
            .collect())
    }
}

/// Lists settled job files, skipping anything modified within `settle`
fn list_job_files(dir: &Path, settle: Duration) -> std::io::Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if !is_json || !entry.file_type()?.is_file() {
            continue;
        }

        // Future timestamps count as settled
        let modified = entry.metadata()?.modified()?;
        if now.duration_since(modified).is_ok_and(|age| age < settle) {
            debug!("Skipping {} until it settles", path.display());
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}
