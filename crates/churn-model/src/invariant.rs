use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use churn_core::{Adapter, Application, StepFault};
use churn_sandbox::{Fork, ForkManager};

use crate::{validate_name, RegistryError};

/// A named consistency property over the observable state.
///
/// Invariants only get shared access to the primary adapter, so they cannot
/// dispatch to it. Anything that needs to act goes through a fork.
pub trait Invariant<A: Application> {
    fn check(&self, cx: &CheckContext<'_, A>) -> Result<(), StepFault>;
}

impl<A, F> Invariant<A> for F
where
    A: Application,
    F: Fn(&CheckContext<'_, A>) -> Result<(), StepFault>,
{
    fn check(&self, cx: &CheckContext<'_, A>) -> Result<(), StepFault> {
        self(cx)
    }
}

/// Read-only view handed to invariants.
pub struct CheckContext<'a, A: Application> {
    adapter: &'a Adapter<A>,
    forks: &'a ForkManager<'a, A>,
}

impl<'a, A: Application> CheckContext<'a, A> {
    pub fn new(adapter: &'a Adapter<A>, forks: &'a ForkManager<'a, A>) -> Self {
        Self { adapter, forks }
    }

    pub fn app(&self) -> &'a A {
        self.adapter.app()
    }

    pub fn adapter(&self) -> &'a Adapter<A> {
        self.adapter
    }

    pub fn fork(&self) -> Result<Fork<A>, StepFault> {
        Ok(self.forks.fork(self.adapter)?)
    }
}

/// Invariants in registration order. Checks always run in that order and
/// stop at the first failure.
pub struct InvariantPool<A: Application> {
    entries: Vec<(String, Box<dyn Invariant<A>>)>,
}

impl<A: Application> InvariantPool<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        invariant: impl Invariant<A> + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        validate_name(&name, self.names())?;
        self.entries.push((name, Box::new(invariant)));
        Ok(())
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, invariant: F) -> Result<(), RegistryError>
    where
        F: Fn(&CheckContext<'_, A>) -> Result<(), StepFault> + 'static,
    {
        self.register(name, invariant)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Run every invariant in order. Returns the number that passed, or the
    /// first fault attributed to its invariant.
    pub fn check_all(&self, cx: &CheckContext<'_, A>) -> Result<usize, StepFault> {
        for (name, invariant) in &self.entries {
            Self::run_one(name, &**invariant, cx)?;
        }
        Ok(self.entries.len())
    }

    /// Run a single invariant by name. `None` if no such invariant exists.
    pub fn check_one(&self, name: &str, cx: &CheckContext<'_, A>) -> Option<Result<(), StepFault>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(n, invariant)| Self::run_one(n, &**invariant, cx))
    }

    /// Panics count as faults of the invariant that raised them.
    fn run_one(name: &str, invariant: &dyn Invariant<A>, cx: &CheckContext<'_, A>) -> Result<(), StepFault> {
        panic::catch_unwind(AssertUnwindSafe(|| invariant.check(cx)))
            .unwrap_or_else(|payload| Err(StepFault::from_panic(payload)))
            .map_err(|fault| {
                tracing::debug!(invariant = name, error = %fault.message(), "invariant failed");
                fault.attributed(name)
            })
    }
}

impl<A: Application> Default for InvariantPool<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Application> fmt::Debug for InvariantPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
