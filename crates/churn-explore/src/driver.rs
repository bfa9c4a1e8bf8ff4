use std::convert::Infallible;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use churn_core::progress::{timestamp, GREEN_TICK, RED_CROSS, YELLOW_TICK};
use churn_core::{
    Action, ActionLog, Adapter, AppFactory, Application, Marker, ProgressSink, StdoutProgress,
    StepFault,
};
use churn_model::{CheckContext, InvariantPool, OperationPool, RegistryError, StepContext};
use churn_repro::{expand_message, simplify_message, RecordError, Recorder};
use churn_sandbox::ForkManager;
use rand_chacha::ChaCha8Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::{DriverConfig, FailurePolicy, DEFAULT_STEPS_PER_RUN};
use crate::replay::{replay, ReplayReport};
use crate::rng::{run_rng, run_seed};
use crate::run::{RunId, RunOutcome, RunPhase, RunStatus};

/// Errors that end the driver itself rather than a single run.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Operation pool is empty")]
    EmptyPool,

    #[error("Failed to create application: {0}")]
    Factory(StepFault),

    #[error("Registration failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("Failed to record reproduction: {0}")]
    Record(#[from] RecordError),

    #[error("Failed to read operator input: {0}")]
    Input(#[from] io::Error),
}

/// Printed before waiting for the operator after a failed run.
pub const PAUSE_PROMPT: &str = "Paused after failure. Press Enter to start the next run.\n";

/// Where the pause policy reads its line from. Kept for the driver's
/// lifetime so input buffered past one line is still there at the next pause.
type OperatorInput = Box<dyn AsyncBufRead + Unpin>;

/// Outcome of a single sampled step.
enum Step {
    NoOp,
    Effective,
}

/// Drives fresh application instances through randomly sampled operations.
///
/// Each run starts from a new application and an empty action log. A step
/// samples one operation uniformly; steps that dispatch nothing are retried
/// without spending budget or checking invariants. After every effective step
/// the whole invariant pool runs in registration order. The first fault of a
/// run, from an operation or an invariant, ends it and is written out as a
/// reproduction script.
pub struct Driver<A: Application> {
    factory: Box<dyn AppFactory<A>>,
    operations: OperationPool<A>,
    invariants: InvariantPool<A>,
    config: DriverConfig,
    recorder: Recorder,
    progress: Rc<dyn ProgressSink>,
    base_seed: Option<u64>,
    runs_started: u64,
    operator_input: Option<OperatorInput>,
}

impl<A: Application> Driver<A> {
    pub fn new(
        factory: impl AppFactory<A> + 'static,
        operations: OperationPool<A>,
        invariants: InvariantPool<A>,
        mut config: DriverConfig,
    ) -> Self {
        if config.steps_per_run == 0 {
            tracing::debug!(default = DEFAULT_STEPS_PER_RUN, "zero step budget, using default");
            config.steps_per_run = DEFAULT_STEPS_PER_RUN;
        }
        let recorder = Recorder::new(config.artifact_dir.clone(), config.dialect.clone());
        Self {
            factory: Box::new(factory),
            operations,
            invariants,
            base_seed: config.seed,
            config,
            recorder,
            progress: Rc::new(StdoutProgress::new()),
            runs_started: 0,
            operator_input: None,
        }
    }

    /// Send progress markers and banners somewhere other than stdout.
    pub fn with_progress(mut self, progress: Rc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Read pause confirmations from `input` instead of stdin.
    pub fn with_operator_input(mut self, input: impl AsyncBufRead + Unpin + 'static) -> Self {
        self.operator_input = Some(Box::new(input));
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn operations(&self) -> &OperationPool<A> {
        &self.operations
    }

    pub fn invariants(&self) -> &InvariantPool<A> {
        &self.invariants
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Base seed of the run RNGs, once known (set by config or by the first run).
    pub fn base_seed(&self) -> Option<u64> {
        self.base_seed
    }

    /// Run forever. Only returns on a fatal error.
    pub async fn run_forever(&mut self) -> Result<Infallible, DriverError> {
        loop {
            let outcome = self.run_once().await?;
            self.after_run(&outcome).await?;
        }
    }

    /// Run exactly `runs` runs and return their outcomes.
    pub async fn run_many(&mut self, runs: usize) -> Result<Vec<RunOutcome>, DriverError> {
        let mut outcomes = Vec::with_capacity(runs);
        for index in 0..runs {
            let outcome = self.run_once().await?;
            if index + 1 < runs {
                self.after_run(&outcome).await?;
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Execute one run from a fresh application until it completes, fails or
    /// stalls.
    pub async fn run_once(&mut self) -> Result<RunOutcome, DriverError> {
        if self.operations.is_empty() {
            return Err(DriverError::EmptyPool);
        }

        let run_number = self.runs_started;
        self.runs_started += 1;
        let run_id = RunId::next();
        let base_seed = *self.base_seed.get_or_insert(run_id.as_u64());
        let seed = run_seed(base_seed, run_number);
        let mut rng = run_rng(base_seed, run_number);

        let progress = Rc::clone(&self.progress);
        let mut phase = RunPhase::Init;
        progress.write(&format!("Setting up test:\n\n{} ", timestamp()));

        let app = self.factory.create(None).map_err(DriverError::Factory)?;
        let mut adapter = Adapter::primary(app, Rc::clone(&progress));
        let forks = ForkManager::new(
            &*self.factory,
            &self.config.sandbox,
            Rc::clone(&progress),
        );
        let mut log = ActionLog::new();
        let budget = self.config.steps_per_run;

        progress.write(&format!(
            "\n\nRunning fuzz test #{run_id} for {budget} steps:\n\n{} ",
            timestamp()
        ));
        tracing::info!(%run_id, seed, steps = budget, "run started");

        let mut outcome = RunOutcome {
            run_id,
            status: RunStatus::Completed,
            seed,
            effective_actions: 0,
            effective_steps: 0,
            steps_attempted: 0,
            noop_steps: 0,
            invariant_passes: 0,
            artifact: None,
            fault: None,
        };
        let mut consecutive_noops = 0u64;
        advance(&mut phase, RunPhase::Stepping, run_id);

        let status = loop {
            progress.mark(Marker::Step);
            outcome.steps_attempted += 1;

            let step = self.take_step(&mut adapter, &forks, &mut rng);
            log.extend(adapter.take_dispatched());
            match step {
                Err(fault) => {
                    outcome.fault = Some(fault);
                    break RunStatus::Failed;
                }
                Ok(Step::NoOp) => {
                    outcome.noop_steps += 1;
                    consecutive_noops += 1;
                    if self
                        .config
                        .max_consecutive_noops
                        .is_some_and(|limit| consecutive_noops > limit)
                    {
                        break RunStatus::Stalled;
                    }
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(Step::Effective) => {
                    consecutive_noops = 0;
                    outcome.effective_steps += 1;
                }
            }

            advance(&mut phase, RunPhase::InvariantCheck, run_id);
            progress.mark(Marker::InvariantPass);
            if let Err(fault) = self.check_invariants(&adapter, &forks) {
                outcome.fault = Some(fault);
                break RunStatus::Failed;
            }
            outcome.invariant_passes += 1;

            if outcome.effective_steps >= u64::from(budget) {
                break RunStatus::Completed;
            }
            advance(&mut phase, RunPhase::Stepping, run_id);
            tokio::task::yield_now().await;
        };

        outcome.status = status;
        outcome.effective_actions = log.len();
        match status {
            RunStatus::Completed => {
                advance(&mut phase, RunPhase::Completed, run_id);
                progress.write(&format!(
                    " {GREEN_TICK} reached step limit of {budget} (dispatched {} actions)\n\n",
                    log.len()
                ));
                tracing::info!(%run_id, actions = log.len(), "run completed");
            }
            RunStatus::Stalled => {
                advance(&mut phase, RunPhase::Stalled, run_id);
                progress.write(&format!(
                    " {YELLOW_TICK} stalled after {consecutive_noops} consecutive no-op steps (dispatched {} actions)\n\n",
                    log.len()
                ));
                tracing::warn!(%run_id, consecutive_noops, "run stalled");
            }
            RunStatus::Failed => {
                advance(&mut phase, RunPhase::Failed, run_id);
                if let Some(fault) = &outcome.fault {
                    progress.write(&format!(
                        " {RED_CROSS} got error: {}\n\n",
                        simplify_message(fault.message())
                    ));
                    let path = self.recorder.capture(fault, &run_id.to_string(), &log)?;
                    progress.write(&format!("Wrote reproduce code to {}\n", path.display()));
                    progress.write(&format!("\nOriginal error was: {}\n\n", expand_message(fault)));
                    tracing::warn!(
                        %run_id,
                        kind = fault.kind(),
                        origin = fault.origin().unwrap_or("-"),
                        actions = log.len(),
                        "run failed"
                    );
                    outcome.artifact = Some(path);
                }
            }
        }

        Ok(outcome)
    }

    /// Replay recorded actions against a fresh application, then check every
    /// invariant once.
    pub fn replay(&self, actions: &[Action]) -> Result<ReplayReport, DriverError> {
        replay(
            &*self.factory,
            &self.invariants,
            &self.config.sandbox,
            actions,
            Rc::clone(&self.progress),
        )
    }

    /// Sample one operation and apply it to the primary adapter.
    fn take_step(
        &self,
        adapter: &mut Adapter<A>,
        forks: &ForkManager<'_, A>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Step, StepFault> {
        let view = self.operations.view();
        let Some((name, op)) = view.sample(rng) else {
            return Ok(Step::NoOp);
        };
        let before = adapter.effective_action_count();
        let peers = view.excluding(name);

        panic::catch_unwind(AssertUnwindSafe(|| {
            let mut cx = StepContext::new(&mut *adapter, forks, peers, &mut *rng);
            cx.apply_operation(name, op)
        }))
        .unwrap_or_else(|payload| Err(StepFault::from_panic(payload).attributed(name)))?;

        if adapter.effective_action_count() == before {
            tracing::trace!(op = name, "no-op");
            Ok(Step::NoOp)
        } else {
            Ok(Step::Effective)
        }
    }

    fn check_invariants(
        &self,
        adapter: &Adapter<A>,
        forks: &ForkManager<'_, A>,
    ) -> Result<usize, StepFault> {
        self.invariants.check_all(&CheckContext::new(adapter, forks))
    }

    async fn after_run(&mut self, outcome: &RunOutcome) -> Result<(), DriverError> {
        if outcome.status != RunStatus::Failed || self.config.failure_policy != FailurePolicy::Pause {
            return Ok(());
        }
        self.progress.write(PAUSE_PROMPT);
        let input = self.operator_input.get_or_insert_with(|| -> OperatorInput {
            Box::new(BufReader::new(tokio::io::stdin()))
        });
        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            tracing::debug!("operator input closed, not pausing");
        }
        Ok(())
    }
}

fn advance(phase: &mut RunPhase, next: RunPhase, run_id: RunId) {
    debug_assert!(!phase.is_terminal(), "run {run_id} left terminal phase {phase}");
    tracing::debug!(%run_id, from = %phase, to = %next, "phase");
    *phase = next;
}
