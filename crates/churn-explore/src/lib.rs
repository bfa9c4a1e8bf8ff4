//! The run-forever driver: samples operations, detects no-ops, checks
//! invariants after every effective step and hands failures to the recorder.

pub mod config;
pub mod driver;
pub mod replay;
pub mod rng;
pub mod run;

pub use config::{parse_step_budget, DriverConfig, FailurePolicy, DEFAULT_STEPS_PER_RUN};
pub use driver::{Driver, DriverError, PAUSE_PROMPT};
pub use replay::{replay, ReplayReport};
pub use run::{RunId, RunOutcome, RunPhase, RunStatus};
