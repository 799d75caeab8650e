//! Data Transfer Objects
//!
//! Wire formats consumed and produced by the backend: the job files dropped
//! into the spool by the frontend, and the status events reported back.

pub mod job_file;
pub mod status;
