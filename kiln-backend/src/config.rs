//! Backend configuration
//!
//! Defines all configurable parameters for the backend: pool size,
//! spool and results locations, provisioning playbooks, the build command
//! and the frontend connection.

use std::path::PathBuf;
use std::time::Duration;

/// Backend configuration
///
/// Built once at startup and shared read-only with every worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of this backend instance, carried in logs
    pub backend_id: String,

    /// Number of workers processing jobs in parallel
    pub worker_count: usize,

    /// Staging directory the frontend drops job files into
    pub jobs_dir: PathBuf,

    /// Root of the results tree (`<destdir>/<owner>/<project>/<chroot>`)
    pub destdir: PathBuf,

    /// Directory holding one event log per worker
    pub worker_logdir: PathBuf,

    /// How often the spool directory is scanned for new job files
    pub spool_interval: Duration,

    /// Maximum number of job files waiting in the queue
    pub queue_capacity: usize,

    /// Playbook that spawns a build machine
    pub spawn_playbook: PathBuf,

    /// Playbook that terminates a build machine
    pub terminate_playbook: PathBuf,

    /// Fixed build machine; when set no machines are spawned
    pub pinned_address: Option<String>,

    /// Program invoked to build packages on a remote machine
    pub build_command: String,

    /// Frontend base URL; status reporting is disabled when unset
    pub frontend_url: Option<String>,

    /// How long a graceful shutdown may take before in-flight builds are abandoned
    pub shutdown_grace: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(backend_id: String) -> Self {
        Self {
            backend_id,
            worker_count: 4,
            jobs_dir: PathBuf::from("/var/lib/kiln/jobs"),
            destdir: PathBuf::from("/var/lib/kiln/results"),
            worker_logdir: PathBuf::from("/var/log/kiln"),
            spool_interval: Duration::from_secs(10),
            queue_capacity: 64,
            spawn_playbook: PathBuf::from("/etc/kiln/provision.yml"),
            terminate_playbook: PathBuf::from("/etc/kiln/terminate.yml"),
            pinned_address: None,
            build_command: "mockremote".to_string(),
            frontend_url: None,
            shutdown_grace: Duration::from_secs(600),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional and falls back to the default:
    /// - KILN_BACKEND_ID (default: random UUID)
    /// - KILN_WORKERS (default: 4)
    /// - KILN_JOBS_DIR, KILN_DESTDIR, KILN_WORKER_LOGDIR
    /// - KILN_SPOOL_INTERVAL (seconds, default: 10)
    /// - KILN_QUEUE_CAPACITY (default: 64)
    /// - KILN_SPAWN_PLAYBOOK, KILN_TERMINATE_PLAYBOOK
    /// - KILN_BUILDER_ADDRESS (pins a single build machine)
    /// - KILN_BUILD_COMMAND (default: mockremote)
    /// - KILN_FRONTEND_URL
    /// - KILN_SHUTDOWN_GRACE (seconds, default: 600)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_id = lookup("KILN_BACKEND_ID").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut config = Self::new(backend_id);

        if let Some(workers) = lookup("KILN_WORKERS") {
            config.worker_count = workers
                .parse()
                .map_err(|_| anyhow::anyhow!("KILN_WORKERS must be a number, got '{}'", workers))?;
        }

        if let Some(dir) = lookup("KILN_JOBS_DIR") {
            config.jobs_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KILN_DESTDIR") {
            config.destdir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("KILN_WORKER_LOGDIR") {
            config.worker_logdir = PathBuf::from(dir);
        }

        config.spool_interval = lookup("KILN_SPOOL_INTERVAL")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.spool_interval);

        config.queue_capacity = lookup("KILN_QUEUE_CAPACITY")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.queue_capacity);

        if let Some(path) = lookup("KILN_SPAWN_PLAYBOOK") {
            config.spawn_playbook = PathBuf::from(path);
        }
        if let Some(path) = lookup("KILN_TERMINATE_PLAYBOOK") {
            config.terminate_playbook = PathBuf::from(path);
        }

        config.pinned_address = lookup("KILN_BUILDER_ADDRESS");

        if let Some(command) = lookup("KILN_BUILD_COMMAND") {
            config.build_command = command;
        }

        config.frontend_url = lookup("KILN_FRONTEND_URL");

        config.shutdown_grace = lookup("KILN_SHUTDOWN_GRACE")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.shutdown_grace);

        Ok(config)
    }

    /// Path of the event log for one worker
    pub fn worker_log_path(&self, worker: usize) -> PathBuf {
        self.worker_logdir.join(format!("worker-{}.log", worker))
    }

    /// Where job files that could not be built are set aside
    ///
    /// A subdirectory of the spool, skipped by its scans.
    pub fn failed_jobs_dir(&self) -> PathBuf {
        self.jobs_dir.join("failed")
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend_id.is_empty() {
            anyhow::bail!("backend_id cannot be empty");
        }

        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than 0");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.spool_interval.is_zero() {
            anyhow::bail!("spool_interval must be greater than 0");
        }

        for (name, path) in [
            ("jobs_dir", &self.jobs_dir),
            ("destdir", &self.destdir),
            ("worker_logdir", &self.worker_logdir),
            ("spawn_playbook", &self.spawn_playbook),
            ("terminate_playbook", &self.terminate_playbook),
        ] {
            if path.as_os_str().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        if self.build_command.trim().is_empty() {
            anyhow::bail!("build_command cannot be empty");
        }

        if let Some(address) = &self.pinned_address {
            if address.trim().is_empty() {
                anyhow::bail!("pinned builder address cannot be blank");
            }
        }

        if let Some(url) = &self.frontend_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("frontend_url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.spool_interval, Duration::from_secs(10));
        assert_eq!(config.build_command, "mockremote");
        assert!(config.pinned_address.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("KILN_BACKEND_ID", "backend-a"),
            ("KILN_WORKERS", "8"),
            ("KILN_DESTDIR", "/srv/results"),
            ("KILN_BUILDER_ADDRESS", "10.0.0.5"),
            ("KILN_SPOOL_INTERVAL", "3"),
            ("KILN_FRONTEND_URL", "https://frontend.example.org"),
        ]))
        .unwrap();

        assert_eq!(config.backend_id, "backend-a");
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.destdir, PathBuf::from("/srv/results"));
        assert_eq!(config.pinned_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(config.spool_interval, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_rejects_bad_worker_count() {
        assert!(Config::from_lookup(lookup_from(&[("KILN_WORKERS", "many")])).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.worker_count = 0;
        assert!(config.validate().is_err());
        config.worker_count = 2;

        config.frontend_url = Some("frontend.example.org".to_string());
        assert!(config.validate().is_err());
        config.frontend_url = Some("http://frontend.example.org".to_string());
        assert!(config.validate().is_ok());

        config.pinned_address = Some("  ".to_string());
        assert!(config.validate().is_err());
        config.pinned_address = None;

        config.destdir = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_log_path() {
        let mut config = Config::default();
        config.worker_logdir = PathBuf::from("/var/log/kiln");
        assert_eq!(
            config.worker_log_path(3),
            PathBuf::from("/var/log/kiln/worker-3.log")
        );
    }
}
