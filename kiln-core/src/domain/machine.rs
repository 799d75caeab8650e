//! Build machine domain types

use serde::{Deserialize, Serialize};

/// Network-reachable identifier of a provisioned build machine
///
/// Either an IP address or a host name. Construction through [`MachineAddress::parse`]
/// guarantees the value is non-empty and carries no surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineAddress(String);

impl MachineAddress {
    /// Parses an address reported by a provisioning backend
    ///
    /// Returns `None` when the input holds no usable address.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MachineAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How build machines are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionMode {
    /// A fresh machine is spawned for every job and terminated afterwards
    Ephemeral,

    /// A pre-existing machine is reused; teardown leaves it running
    Pinned,
}

impl std::fmt::Display for ProvisionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionMode::Ephemeral => write!(f, "ephemeral"),
            ProvisionMode::Pinned => write!(f, "pinned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_whitespace() {
        let address = MachineAddress::parse("  10.0.0.5\n").unwrap();
        assert_eq!(address.as_str(), "10.0.0.5");
        assert_eq!(address.to_string(), "10.0.0.5");
    }

    #[test]
    fn test_parse_rejects_unusable_input() {
        assert!(MachineAddress::parse("").is_none());
        assert!(MachineAddress::parse("   ").is_none());
        assert!(MachineAddress::parse("10.0.0.5 10.0.0.6").is_none());
    }

    #[test]
    fn test_parse_accepts_host_names() {
        let address = MachineAddress::parse("builder-01.example.org").unwrap();
        assert_eq!(address.as_str(), "builder-01.example.org");
    }
}
