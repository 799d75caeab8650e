//! Job file wire format
//!
//! The frontend drops one JSON document per build request into the spool
//! directory. Only the first entry of `builds` is used. Every field is
//! optional at the serde level so that a missing field is reported by name
//! instead of as a generic decoding error.

use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a job file into a job descriptor
#[derive(Debug, Error)]
pub enum JobFileError {
    /// The job file could not be read
    #[error("Failed to read job file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job file is not valid JSON for the expected shape
    #[error("Malformed job file: {0}")]
    Json(#[from] serde_json::Error),

    /// The `builds` list is absent or empty
    #[error("Job file contains no builds")]
    NoBuilds,

    /// A required field is absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A field is present but unusable
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Top-level job file document
#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub builds: Vec<BuildEntry>,
}

/// One build request inside a job file
#[derive(Debug, Clone, Deserialize)]
pub struct BuildEntry {
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "opaque_id")]
    pub user_id: Option<String>,
    /// Space-delimited package names
    pub pkgs: Option<String>,
    /// Space-delimited repository URLs or names
    pub repos: Option<String>,
    /// Space-delimited target (chroot) names
    pub chroots: Option<String>,
    pub memory_reqs: Option<u64>,
    /// Build timeout in seconds
    pub timeout: Option<u64>,
    pub copr: Option<ProjectEntry>,
}

/// Project the build belongs to
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectEntry {
    #[serde(default, deserialize_with = "opaque_id")]
    pub id: Option<String>,
    pub name: Option<String>,
    pub owner: Option<OwnerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerEntry {
    pub name: Option<String>,
}

impl JobFile {
    /// Decodes a job file from its JSON text
    pub fn from_json(text: &str) -> Result<Self, JobFileError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns the build this backend acts on
    pub fn first_build(&self) -> Result<&BuildEntry, JobFileError> {
        self.builds.first().ok_or(JobFileError::NoBuilds)
    }
}

/// Splits a space-delimited list, dropping empty tokens
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Identifiers are opaque: accept both JSON numbers and strings
fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Signed(i64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(n)) => Some(n.to_string()),
        Some(RawId::Signed(n)) => Some(n.to_string()),
        Some(RawId::Text(s)) => Some(s),
        None => None,
    })
}
