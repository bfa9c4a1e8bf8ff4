use std::fmt;

use churn_core::{Action, Adapter, Application, StepFault};
use churn_sandbox::{Fork, ForkManager};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::{validate_name, RegistryError};

/// A named step the driver can take. It may dispatch any number of actions,
/// including none (a no-op).
pub trait Operation<A: Application> {
    fn run(&self, cx: &mut StepContext<'_, A>) -> Result<(), StepFault>;
}

impl<A, F> Operation<A> for F
where
    A: Application,
    F: Fn(&mut StepContext<'_, A>) -> Result<(), StepFault>,
{
    fn run(&self, cx: &mut StepContext<'_, A>) -> Result<(), StepFault> {
        self(cx)
    }
}

type Entry<A> = (String, Box<dyn Operation<A>>);

/// Name-keyed operation registry. Sampling is uniform over registered
/// operations; registration order only matters for listing.
pub struct OperationPool<A: Application> {
    entries: Vec<Entry<A>>,
}

impl<A: Application> OperationPool<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        op: impl Operation<A> + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        validate_name(&name, self.names())?;
        self.entries.push((name, Box::new(op)));
        Ok(())
    }

    /// Register a closure. Same as [`OperationPool::register`], but pins the
    /// closure signature so its argument type can be inferred.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, op: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut StepContext<'_, A>) -> Result<(), StepFault> + 'static,
    {
        self.register(name, op)
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

    pub fn get(&self, name: &str) -> Option<&dyn Operation<A>> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, op)| &**op)
    }

    /// A view over the whole pool.
    pub fn view(&self) -> PoolView<'_, A> {
        PoolView {
            entries: &self.entries,
            excluded: Vec::new(),
        }
    }
}

impl<A: Application> Default for OperationPool<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Application> fmt::Debug for OperationPool<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Immutable view of an operation pool with some operations left out.
///
/// Built at call time and never written back, so an operation that samples
/// from its peers cannot pick itself, and the pool it was drawn from is
/// untouched.
pub struct PoolView<'a, A: Application> {
    entries: &'a [Entry<A>],
    excluded: Vec<usize>,
}

impl<'a, A: Application> PoolView<'a, A> {
    /// The same view without `name`. Unknown names are ignored.
    pub fn excluding(&self, name: &str) -> Self {
        let mut excluded = self.excluded.clone();
        if let Some(index) = self.entries.iter().position(|(n, _)| n == name) {
            if !excluded.contains(&index) {
                excluded.push(index);
            }
        }
        Self {
            entries: self.entries,
            excluded,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> Vec<&'a str> {
        self.iter().map(|(name, _)| name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a dyn Operation<A>)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(index, _)| !self.excluded.contains(index))
            .map(|(_, (name, op))| (name.as_str(), &**op))
    }

    /// Pick one operation uniformly at random, or `None` if the view is empty.
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> Option<(&'a str, &'a dyn Operation<A>)> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let pick = rng.gen_range(0..len);
        self.iter().nth(pick)
    }
}

impl<A: Application> Clone for PoolView<'_, A> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries,
            excluded: self.excluded.clone(),
        }
    }
}

impl<A: Application> fmt::Debug for PoolView<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Everything an operation may touch while it runs.
pub struct StepContext<'a, A: Application> {
    adapter: &'a mut Adapter<A>,
    forks: &'a ForkManager<'a, A>,
    peers: PoolView<'a, A>,
    rng: &'a mut ChaCha8Rng,
}

impl<'a, A: Application> StepContext<'a, A> {
    pub fn new(
        adapter: &'a mut Adapter<A>,
        forks: &'a ForkManager<'a, A>,
        peers: PoolView<'a, A>,
        rng: &'a mut ChaCha8Rng,
    ) -> Self {
        Self {
            adapter,
            forks,
            peers,
            rng,
        }
    }

    pub fn app(&self) -> &A {
        self.adapter.app()
    }

    pub fn adapter(&self) -> &Adapter<A> {
        &*self.adapter
    }

    pub fn dispatch(&mut self, action: Action) -> Result<(), StepFault> {
        self.adapter.dispatch(action)
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        self.rng
    }

    /// The pool minus the operation currently running.
    pub fn peers(&self) -> &PoolView<'a, A> {
        &self.peers
    }

    /// Fork whatever application this context is bound to.
    pub fn fork(&self) -> Result<Fork<A>, StepFault> {
        Ok(self.forks.fork(&*self.adapter)?)
    }

    /// Whether [`StepContext::fork`] is still within the nesting limit.
    pub fn can_fork(&self) -> bool {
        self.adapter.role().fork_depth() < self.forks.config().max_fork_depth
    }

    /// Run `op` against this context. Faults without an origin are
    /// attributed to `name`.
    pub fn apply_operation(&mut self, name: &str, op: &dyn Operation<A>) -> Result<(), StepFault> {
        tracing::trace!(op = name, depth = self.adapter.role().fork_depth(), "applying operation");
        op.run(self).map_err(|fault| fault.attributed(name))
    }

    /// Apply `steps` operations sampled from this context's peers to `fork`.
    /// Returns how many were applied (fewer only when there are no peers).
    pub fn explore(&mut self, fork: &mut Fork<A>, steps: usize) -> Result<usize, StepFault> {
        explore(fork, self.forks, &self.peers, steps, self.rng)
    }

    /// Like [`StepContext::explore`], but samples from `peers` instead.
    pub fn explore_from(
        &mut self,
        fork: &mut Fork<A>,
        peers: &PoolView<'_, A>,
        steps: usize,
    ) -> Result<usize, StepFault> {
        explore(fork, self.forks, peers, steps, self.rng)
    }
}

/// Apply `steps` uniformly sampled operations from `peers` to `fork`.
///
/// Each sampled operation sees `peers` minus itself, so nested exploration
/// never re-enters the same operation.
pub fn explore<A: Application>(
    fork: &mut Fork<A>,
    forks: &ForkManager<'_, A>,
    peers: &PoolView<'_, A>,
    steps: usize,
    rng: &mut ChaCha8Rng,
) -> Result<usize, StepFault> {
    let mut applied = 0;
    for _ in 0..steps {
        let Some((name, op)) = peers.sample(rng) else {
            break;
        };
        let mut cx = StepContext::new(fork.adapter_mut(), forks, peers.excluding(name), rng);
        cx.apply_operation(name, op)?;
        applied += 1;
    }
    Ok(applied)
}
