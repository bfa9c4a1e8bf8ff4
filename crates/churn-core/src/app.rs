use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::action::Action;
use crate::fault::StepFault;

/// The application under test, as seen by the engine.
///
/// Implementations own their state store and dispatch mechanism; the engine
/// only applies actions and takes snapshots. Applying the same sequence of
/// actions to two fresh instances must yield the same observable state.
pub trait Application {
    /// Serializable image of the observable state, used to build forks.
    type Snapshot: Serialize + DeserializeOwned;

    /// Apply one action. An `Err` is reported as an adapter fault.
    fn apply(&mut self, action: &Action) -> Result<(), StepFault>;

    /// Capture the current observable state.
    fn snapshot(&self) -> Self::Snapshot;
}

/// Builds applications, either fresh (start of a run) or from a snapshot (forks).
pub trait AppFactory<A: Application> {
    fn create(&self, snapshot: Option<A::Snapshot>) -> Result<A, StepFault>;
}

impl<A, F> AppFactory<A> for F
where
    A: Application,
    F: Fn(Option<A::Snapshot>) -> Result<A, StepFault>,
{
    fn create(&self, snapshot: Option<A::Snapshot>) -> Result<A, StepFault> {
        self(snapshot)
    }
}
