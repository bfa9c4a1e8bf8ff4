use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use churn_core::{Action, Adapter, AppFactory, Application, ProgressSink, StepFault};
use churn_model::{CheckContext, InvariantPool};
use churn_sandbox::{ForkManager, SandboxConfig};

use crate::driver::DriverError;

/// Result of replaying a recorded action sequence.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    /// Actions dispatched, including a failing one.
    pub applied: usize,
    /// First fault: from dispatching an action, or from the final invariant check.
    pub fault: Option<StepFault>,
}

impl ReplayReport {
    pub fn passed(&self) -> bool {
        self.fault.is_none()
    }
}

/// Dispatch `actions` in order to a fresh application, then run every
/// invariant once against the final state.
///
/// Operations are not re-run, only the actions they dispatched, so faults
/// raised by an operation's own assertions cannot show up here.
pub fn replay<A: Application>(
    factory: &dyn AppFactory<A>,
    invariants: &InvariantPool<A>,
    sandbox: &SandboxConfig,
    actions: &[Action],
    progress: Rc<dyn ProgressSink>,
) -> Result<ReplayReport, DriverError> {
    let app = factory.create(None).map_err(DriverError::Factory)?;
    let mut adapter = Adapter::primary(app, Rc::clone(&progress));

    for (index, action) in actions.iter().enumerate() {
        let dispatched = panic::catch_unwind(AssertUnwindSafe(|| adapter.dispatch(action.clone())))
            .unwrap_or_else(|payload| Err(StepFault::from_panic(payload)));
        if let Err(fault) = dispatched {
            tracing::debug!(index, op = %action.op_type, "replay stopped at failing action");
            return Ok(ReplayReport {
                applied: index + 1,
                fault: Some(fault.attributed(&action.op_type)),
            });
        }
    }

    let forks = ForkManager::new(factory, sandbox, progress);
    let cx = CheckContext::new(&adapter, &forks);
    let fault = invariants.check_all(&cx).err();

    Ok(ReplayReport {
        applied: actions.len(),
        fault,
    })
}
