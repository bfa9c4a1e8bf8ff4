//! Shared vocabulary of the churn engine: actions, the action log, step
//! faults, the application contract and the engine-side adapter.

pub mod action;
pub mod adapter;
pub mod app;
pub mod fault;
pub mod progress;

pub use action::{Action, ActionLog, RECORD_TYPE_KEY};
pub use adapter::{Adapter, DispatchRole};
pub use app::{AppFactory, Application};
pub use fault::{StepFault, Violation};
pub use progress::{Marker, ProgressSink, RecordingProgress, SilentProgress, StdoutProgress};
