//! Scheduler layer for the backend
//!
//! A fixed pool of workers pulls job files from the shared queue. Each
//! worker drives one job at a time through provisioning, the per-target
//! builds, finalization and teardown.

pub mod pool;
pub mod worker;

pub use pool::WorkerPool;
pub use worker::{JobReport, Worker};

use std::sync::Arc;

use crate::build::BuildExecutor;
use crate::finalize::ResultFinalizer;
use crate::provision::Provisioner;
use crate::queue::JobQueue;

/// The capabilities every worker shares
#[derive(Clone)]
pub struct Ports {
    pub queue: Arc<dyn JobQueue>,
    pub provisioner: Arc<dyn Provisioner>,
    pub executor: Arc<dyn BuildExecutor>,
    pub finalizer: Arc<ResultFinalizer>,
}
