//! In-memory fakes of the worker's ports

use async_trait::async_trait;
use kiln_core::domain::job::JobDescriptor;
use kiln_core::domain::machine::{MachineAddress, ProvisionMode};
use kiln_core::dto::status::BuildStatusEvent;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::build::{BuildError, BuildExecutor, BuildOutcome, BuildRequest};
use crate::finalize::StatusReporter;
use crate::provision::{ProvisionError, ProvisionSpec, Provisioner};
use crate::queue::{JobQueue, QueueError};

/// Writes a job file named `<build_id>.json` and returns its path
pub fn write_job_file(dir: &Path, build_id: u64, targets: &[&str]) -> PathBuf {
    let value = json!({
        "builds": [{
            "id": build_id,
            "user_id": 7,
            "pkgs": "foo",
            "repos": "repo1",
            "chroots": targets.join(" "),
            "memory_reqs": 2048,
            "timeout": 600,
            "copr": {"id": 55, "name": "tools", "owner": {"name": "alice"}}
        }]
    });
    let path = dir.join(format!("{}.json", build_id));
    std::fs::write(&path, value.to_string()).unwrap();
    path
}

/// Parses a freshly written job 1001
pub fn sample_job(spool: &Path, results: &Path, targets: &[&str]) -> JobDescriptor {
    let path = write_job_file(spool, 1001, targets);
    JobDescriptor::from_job_file(&path, results).unwrap()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct ProvisionerState {
    available: VecDeque<String>,
    provisioned: Vec<String>,
    deprovisioned: Vec<String>,
    calls: usize,
}

/// Hands out machines from a fixed list and records every call
#[derive(Default)]
pub struct RecordingProvisioner {
    state: Mutex<ProvisionerState>,
    fail_provision: Option<Option<String>>,
    fail_deprovision: bool,
}

impl RecordingProvisioner {
    pub fn with_addresses(addresses: &[&str]) -> Self {
        let provisioner = Self::default();
        lock(&provisioner.state).available = addresses.iter().map(|a| a.to_string()).collect();
        provisioner
    }

    /// Every provision call fails without reporting a machine
    pub fn failing() -> Self {
        Self {
            fail_provision: Some(None),
            ..Self::default()
        }
    }

    /// Every provision call fails after reporting `address`
    pub fn failing_with_partial(address: &str) -> Self {
        Self {
            fail_provision: Some(Some(address.to_string())),
            ..Self::default()
        }
    }

    pub fn failing_deprovision(mut self) -> Self {
        self.fail_deprovision = true;
        self
    }

    pub fn provision_calls(&self) -> usize {
        lock(&self.state).calls
    }

    pub fn provisioned(&self) -> Vec<String> {
        lock(&self.state).provisioned.clone()
    }

    pub fn deprovisioned(&self) -> Vec<String> {
        lock(&self.state).deprovisioned.clone()
    }
}

#[async_trait]
impl Provisioner for RecordingProvisioner {
    async fn provision(&self, _spec: &ProvisionSpec) -> Result<MachineAddress, ProvisionError> {
        let mut state = lock(&self.state);
        state.calls += 1;

        if let Some(partial) = &self.fail_provision {
            return Err(ProvisionError::Command {
                reason: "cloud quota exceeded".to_string(),
                partial: partial.as_deref().and_then(MachineAddress::parse),
            });
        }

        let address = state.available.pop_front().ok_or_else(|| ProvisionError::NoAddress {
            output: String::new(),
        })?;
        state.provisioned.push(address.clone());
        MachineAddress::parse(&address).ok_or(ProvisionError::NoAddress { output: address })
    }

    async fn deprovision(&self, address: &MachineAddress) -> Result<(), ProvisionError> {
        lock(&self.state).deprovisioned.push(address.as_str().to_string());
        if self.fail_deprovision {
            return Err(ProvisionError::Command {
                reason: "terminate playbook exited with 2".to_string(),
                partial: None,
            });
        }
        Ok(())
    }

    fn mode(&self) -> ProvisionMode {
        ProvisionMode::Ephemeral
    }
}

/// What a scripted build does for one target
#[derive(Clone)]
pub enum Script {
    Fail,
    Error,
    Panic,
    Hang,
}

#[derive(Default)]
struct ExecutorState {
    calls: Vec<(String, String)>,
    active: HashSet<String>,
    overlapped: bool,
}

/// Build executor following a per-target script; unlisted targets succeed
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<String, Script>,
    delay: Duration,
    state: Mutex<ExecutorState>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, target: &str, script: Script) -> Self {
        self.scripts.insert(target.to_string(), script);
        self
    }

    /// Time every build takes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `(address, target)` for every build call, in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.state).calls.clone()
    }

    pub fn targets(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, target)| target).collect()
    }

    /// Whether two builds ever ran against the same address at once
    pub fn overlapped(&self) -> bool {
        lock(&self.state).overlapped
    }
}

#[async_trait]
impl BuildExecutor for ScriptedExecutor {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutcome, BuildError> {
        let address = request.address.as_str().to_string();
        {
            let mut state = lock(&self.state);
            state.calls.push((address.clone(), request.target.clone()));
            if !state.active.insert(address.clone()) {
                state.overlapped = true;
            }
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let script = self.scripts.get(&request.target).cloned();
        lock(&self.state).active.remove(&address);

        match script {
            None => Ok(BuildOutcome::Succeeded),
            Some(Script::Fail) => Ok(BuildOutcome::Failed {
                reason: "mock exited with 1".to_string(),
            }),
            Some(Script::Error) => Err(BuildError::TimedOut {
                seconds: request.timeout_seconds,
            }),
            Some(Script::Panic) => panic!("executor blew up on {}", request.target),
            Some(Script::Hang) => {
                std::future::pending::<()>().await;
                Ok(BuildOutcome::Succeeded)
            }
        }
    }
}

/// Queue replaying a fixed sequence of dequeue results, then closed
pub struct ScriptedQueue {
    items: Mutex<VecDeque<Result<Option<PathBuf>, QueueError>>>,
}

impl ScriptedQueue {
    pub fn new(items: Vec<Result<Option<PathBuf>, QueueError>>) -> Self {
        Self {
            items: Mutex::new(items.into()),
        }
    }
}

#[async_trait]
impl JobQueue for ScriptedQueue {
    async fn dequeue(&self) -> Result<Option<PathBuf>, QueueError> {
        lock(&self.items).pop_front().unwrap_or(Ok(None))
    }
}

/// Status reporter keeping every event
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<BuildStatusEvent>>,
    fail: bool,
}

impl RecordingReporter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<BuildStatusEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(&self, event: &BuildStatusEvent) -> anyhow::Result<()> {
        lock(&self.events).push(event.clone());
        if self.fail {
            anyhow::bail!("frontend unavailable");
        }
        Ok(())
    }
}
