use std::fmt;
use std::rc::Rc;

use crate::action::Action;
use crate::app::Application;
use crate::fault::StepFault;
use crate::progress::{Marker, ProgressSink};

/// Whether an adapter drives the run under test or a detached fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRole {
    Primary,
    /// A fork, `depth` levels below the primary (1 = forked from the primary).
    Fork { depth: u32 },
}

impl DispatchRole {
    pub fn fork_depth(self) -> u32 {
        match self {
            DispatchRole::Primary => 0,
            DispatchRole::Fork { depth } => depth,
        }
    }

    fn marker(self) -> Marker {
        match self {
            DispatchRole::Primary => Marker::PrimaryDispatch,
            DispatchRole::Fork { .. } => Marker::ForkDispatch,
        }
    }
}

/// Engine-side wrapper around an [`Application`].
///
/// Every action goes through [`Adapter::dispatch`], which bumps the effective
/// action counter and buffers the action until the driver moves it into the
/// run's action log. The counter never decreases for the adapter's lifetime.
pub struct Adapter<A: Application> {
    app: A,
    role: DispatchRole,
    progress: Rc<dyn ProgressSink>,
    dispatched: u64,
    pending: Vec<Action>,
}

impl<A: Application> Adapter<A> {
    pub fn new(app: A, role: DispatchRole, progress: Rc<dyn ProgressSink>) -> Self {
        Self {
            app,
            role,
            progress,
            dispatched: 0,
            pending: Vec::new(),
        }
    }

    pub fn primary(app: A, progress: Rc<dyn ProgressSink>) -> Self {
        Self::new(app, DispatchRole::Primary, progress)
    }

    /// Read access to the application, for getters.
    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn role(&self) -> DispatchRole {
        self.role
    }

    /// Dispatch one action to the application.
    ///
    /// The action is counted and buffered even when applying it fails, so the
    /// failing action still shows up in the reproduction.
    pub fn dispatch(&mut self, action: Action) -> Result<(), StepFault> {
        self.progress.mark(self.role.marker());
        let result = self.app.apply(&action);
        if let Err(fault) = &result {
            tracing::debug!(op = %action.op_type, role = ?self.role, %fault, "action rejected");
        }
        self.dispatched += 1;
        self.pending.push(action);
        result
    }

    /// Number of actions dispatched since this adapter was created.
    pub fn effective_action_count(&self) -> u64 {
        self.dispatched
    }

    /// Move out the actions dispatched since the previous call.
    pub fn take_dispatched(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending)
    }

    /// Actions dispatched but not yet taken.
    pub fn pending(&self) -> &[Action] {
        &self.pending
    }

    pub fn snapshot(&self) -> A::Snapshot {
        self.app.snapshot()
    }

    pub fn progress(&self) -> Rc<dyn ProgressSink> {
        Rc::clone(&self.progress)
    }

    pub fn into_app(self) -> A {
        self.app
    }
}

impl<A: Application> fmt::Debug for Adapter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("role", &self.role)
            .field("dispatched", &self.dispatched)
            .field("pending", &self.pending.len())
            .finish()
    }
}
