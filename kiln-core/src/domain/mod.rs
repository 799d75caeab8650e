//! Core domain types
//!
//! This module contains the core domain structures used across Kiln services.
//! These types are owned by the worker driving a job and are never shared
//! between workers.

pub mod job;
pub mod machine;
pub mod outcome;
