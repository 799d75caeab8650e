//! Kiln Core
//!
//! Core types and abstractions for the Kiln build-farm backend.
//!
//! This crate contains:
//! - Domain types: Core business entities (JobDescriptor, TargetOutcome, etc.)
//! - DTOs: Wire formats exchanged with the outside world (job files, status events)

pub mod domain;
pub mod dto;
