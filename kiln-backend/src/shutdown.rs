//! Shutdown coordination
//!
//! A graceful shutdown stops workers from taking new jobs but lets the
//! current job run to completion. An immediate shutdown additionally
//! abandons the remaining targets of in-flight jobs. In both cases the
//! job is finalized and its build machine released before the worker exits.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown progression; never moves backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownState {
    Running,
    Graceful,
    Immediate,
}

/// Owner side of the shutdown signal
pub struct ShutdownController {
    sender: watch::Sender<ShutdownState>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ShutdownState::Running);
        Self { sender }
    }

    /// Creates a listener for a worker or producer
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.sender.borrow()
    }

    pub fn request_graceful(&self) {
        self.escalate(ShutdownState::Graceful);
    }

    pub fn request_immediate(&self) {
        self.escalate(ShutdownState::Immediate);
    }

    fn escalate(&self, next: ShutdownState) {
        let changed = self.sender.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Shutdown state changed to {:?}", next);
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of the shutdown signal
#[derive(Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<ShutdownState>,
}

impl ShutdownListener {
    pub fn state(&self) -> ShutdownState {
        *self.receiver.borrow()
    }

    /// Whether workers should stop taking new jobs
    pub fn is_stopping(&self) -> bool {
        self.state() != ShutdownState::Running
    }

    /// Resolves once any shutdown was requested
    pub async fn stopping(&mut self) {
        self.wait_until(ShutdownState::Graceful).await;
    }

    /// Resolves once an immediate shutdown was requested
    pub async fn immediate(&mut self) {
        self.wait_until(ShutdownState::Immediate).await;
    }

    async fn wait_until(&mut self, target: ShutdownState) {
        if self.state() >= target {
            return;
        }
        if self.receiver.wait_for(|state| *state >= target).await.is_err() {
            // Controller gone without reaching the target: it never will
            std::future::pending::<()>().await;
        }
    }
}

/// Translates process signals into shutdown requests
///
/// The first SIGINT/SIGTERM starts a graceful shutdown, a second one (or
/// the grace period running out) escalates to an immediate shutdown.
pub async fn listen_for_signals(controller: &ShutdownController, grace: Duration) {
    if let Err(e) = wait_for_signal().await {
        warn!("Failed to listen for shutdown signals: {}", e);
        return;
    }
    info!(
        "Shutdown requested, finishing in-flight jobs (grace period {:?})",
        grace
    );
    controller.request_graceful();

    tokio::select! {
        result = wait_for_signal() => {
            if let Err(e) = result {
                warn!("Failed to listen for shutdown signals: {}", e);
            }
            warn!("Second shutdown signal, abandoning in-flight builds");
        }
        _ = tokio::time::sleep(grace) => {
            warn!("Grace period elapsed, abandoning in-flight builds");
        }
    }
    controller.request_immediate();
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
