use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use churn_core::StepFault;

static LAST_RUN_ID: AtomicU64 = AtomicU64::new(0);

/// Time-derived run identifier: milliseconds since the Unix epoch.
///
/// Ids handed out by [`RunId::next`] are strictly increasing within the
/// process, even when the clock has not moved between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(u64);

impl RunId {
    pub fn next() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let mut last = LAST_RUN_ID.load(Ordering::Relaxed);
        loop {
            let id = if now > last { now } else { last + 1 };
            match LAST_RUN_ID.compare_exchange_weak(last, id, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return RunId(id),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The step budget was used up without a failure.
    Completed,
    /// A step or invariant failed; a reproduction was written.
    Failed,
    /// Too many no-op steps in a row.
    Stalled,
}

/// Lifecycle of a single run. Terminal phases are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Stepping,
    InvariantCheck,
    Completed,
    Failed,
    Stalled,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed | RunPhase::Stalled)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::Stepping => "stepping",
            RunPhase::InvariantCheck => "invariant_check",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
            RunPhase::Stalled => "stalled",
        };
        f.write_str(name)
    }
}

/// Result of one call to `run_once`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Seed of this run's RNG.
    pub seed: u64,
    /// Length of the action log when the run ended.
    pub effective_actions: usize,
    /// Effective steps taken (steps that dispatched at least one action).
    pub effective_steps: u64,
    /// Step attempts, no-ops included.
    pub steps_attempted: u64,
    pub noop_steps: u64,
    /// Completed passes over the invariant pool.
    pub invariant_passes: u64,
    pub artifact: Option<PathBuf>,
    pub fault: Option<StepFault>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_strictly_increase() {
        let ids: Vec<RunId> = (0..50).map(|_| RunId::next()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_run_id_renders_as_digits() {
        let id = RunId::next().to_string();
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(RunPhase::Failed.is_terminal());
        assert!(!RunPhase::InvariantCheck.is_terminal());
        assert_eq!(RunPhase::InvariantCheck.to_string(), "invariant_check");
    }
}
