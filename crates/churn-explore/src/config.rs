use std::path::PathBuf;

use churn_repro::ScriptDialect;
use churn_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};

/// Effective steps per run when nothing else is configured.
pub const DEFAULT_STEPS_PER_RUN: u32 = 255;

/// What happens after a run ends in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Start the next run immediately.
    #[default]
    Restart,
    /// Wait for a line on stdin first.
    Pause,
}

/// Configuration for the driver loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Effective steps per run.
    pub steps_per_run: u32,
    /// Base RNG seed. Defaults to the first run id.
    pub seed: Option<u64>,
    pub failure_policy: FailurePolicy,
    /// End a run as stalled after this many no-op steps in a row.
    pub max_consecutive_noops: Option<u64>,
    /// Where reproduction scripts are written.
    pub artifact_dir: PathBuf,
    pub sandbox: SandboxConfig,
    pub dialect: ScriptDialect,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            steps_per_run: DEFAULT_STEPS_PER_RUN,
            seed: None,
            failure_policy: FailurePolicy::Restart,
            max_consecutive_noops: None,
            artifact_dir: PathBuf::from("fuzz-artifacts"),
            sandbox: SandboxConfig::default(),
            dialect: ScriptDialect::default(),
        }
    }
}

/// Parse a step budget. Anything that is not a positive integer gives the
/// default.
pub fn parse_step_budget(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_STEPS_PER_RUN;
    };
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => {
            tracing::debug!(input = raw, default = DEFAULT_STEPS_PER_RUN, "ignoring step budget");
            DEFAULT_STEPS_PER_RUN
        }
    }
}
