/// Fork configuration: nesting limit and snapshot round-trip checking.
use serde::{Deserialize, Serialize};

/// Configuration for the isolation fork manager.
///
/// Forks never share state with the application they were taken from; these
/// knobs only bound how deep forks may nest and how strictly snapshots are
/// checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum nesting of forks (a fork of a fork has depth 2).
    pub max_fork_depth: u32,
    /// Re-encode the decoded snapshot and reject it if it differs.
    pub verify_roundtrip: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_fork_depth: 2,
            verify_roundtrip: true,
        }
    }
}
