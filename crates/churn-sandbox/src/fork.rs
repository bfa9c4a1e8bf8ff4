use std::fmt;
use std::rc::Rc;

use churn_core::{Action, Adapter, AppFactory, Application, DispatchRole, ProgressSink, StepFault};
use serde_json::Value;

use crate::config::SandboxConfig;

#[derive(Debug, thiserror::Error)]
pub enum ForkError {
    #[error("Snapshot encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Snapshot decoding failed: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Snapshot does not survive a round trip through its serialized form")]
    LossySnapshot,

    #[error("Fork depth {depth} exceeds limit {limit}")]
    DepthExceeded { depth: u32, limit: u32 },

    #[error("Application factory rejected snapshot: {0}")]
    Factory(StepFault),
}

impl From<ForkError> for StepFault {
    fn from(err: ForkError) -> Self {
        StepFault::fork(err.to_string())
    }
}

/// Creates forks of a running application.
///
/// A fork is built from a snapshot that has been serialized and decoded again,
/// so no shared ownership can leak from the source into the fork. Forks are
/// handed out by value and never reused.
pub struct ForkManager<'a, A: Application> {
    factory: &'a dyn AppFactory<A>,
    config: &'a SandboxConfig,
    progress: Rc<dyn ProgressSink>,
}

impl<'a, A: Application> ForkManager<'a, A> {
    pub fn new(
        factory: &'a dyn AppFactory<A>,
        config: &'a SandboxConfig,
        progress: Rc<dyn ProgressSink>,
    ) -> Self {
        Self {
            factory,
            config,
            progress,
        }
    }

    /// Fork the application behind `source`. The source is only read.
    pub fn fork(&self, source: &Adapter<A>) -> Result<Fork<A>, ForkError> {
        let depth = source.role().fork_depth() + 1;
        if depth > self.config.max_fork_depth {
            return Err(ForkError::DepthExceeded {
                depth,
                limit: self.config.max_fork_depth,
            });
        }

        let snapshot = self.detach(&source.snapshot())?;
        let app = self
            .factory
            .create(Some(snapshot))
            .map_err(ForkError::Factory)?;

        tracing::trace!(depth, "fork created");
        Ok(Fork {
            adapter: Adapter::new(app, DispatchRole::Fork { depth }, Rc::clone(&self.progress)),
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        self.config
    }

    /// Round-trip a snapshot through its serialized form.
    fn detach(&self, snapshot: &A::Snapshot) -> Result<A::Snapshot, ForkError> {
        let encoded: Value = serde_json::to_value(snapshot).map_err(ForkError::Encode)?;
        let detached: A::Snapshot =
            serde_json::from_value(encoded.clone()).map_err(ForkError::Decode)?;

        if self.config.verify_roundtrip {
            let again = serde_json::to_value(&detached).map_err(ForkError::Encode)?;
            if again != encoded {
                return Err(ForkError::LossySnapshot);
            }
        }

        Ok(detached)
    }
}

/// A detached copy of an application plus its private adapter.
pub struct Fork<A: Application> {
    adapter: Adapter<A>,
}

impl<A: Application> Fork<A> {
    pub fn app(&self) -> &A {
        self.adapter.app()
    }

    pub fn adapter(&self) -> &Adapter<A> {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut Adapter<A> {
        &mut self.adapter
    }

    pub fn dispatch(&mut self, action: Action) -> Result<(), StepFault> {
        self.adapter.dispatch(action)
    }

    pub fn depth(&self) -> u32 {
        self.adapter.role().fork_depth()
    }

    /// Actions dispatched to this fork so far.
    pub fn dispatched(&self) -> u64 {
        self.adapter.effective_action_count()
    }

    pub fn into_app(self) -> A {
        self.adapter.into_app()
    }
}

impl<A: Application> fmt::Debug for Fork<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fork").field("adapter", &self.adapter).finish()
    }
}
