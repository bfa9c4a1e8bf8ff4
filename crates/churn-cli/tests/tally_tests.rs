use std::rc::Rc;

use churn_cli::tally::app::{actions, Counter, Partition};
use churn_cli::tally::{self, invariants, ops, PartitionId, Tally, TallyState};
use churn_core::{Adapter, SilentProgress, StepFault};
use churn_explore::{DriverConfig, RunStatus};
use churn_model::{CheckContext, StepContext};
use churn_sandbox::{ForkManager, SandboxConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn partition(counters: &[(&str, i64)], total: i64) -> Partition {
    Partition {
        counters: counters
            .iter()
            .map(|(name, value)| Counter {
                name: name.to_string(),
                value: *value,
            })
            .collect(),
        total,
    }
}

fn healthy() -> TallyState {
    TallyState {
        main: partition(&[("a", 2), ("b", 3)], 5),
        side: partition(&[("x", 9)], 9),
        cursor: PartitionId::Main,
    }
}

/// Run one invariant against `state` with the given fork limit.
fn check(
    invariant: fn(&CheckContext<'_, Tally>) -> Result<(), StepFault>,
    state: TallyState,
    max_fork_depth: u32,
) -> Result<(), StepFault> {
    let factory = tally::factory(false);
    let sandbox = SandboxConfig {
        max_fork_depth,
        ..SandboxConfig::default()
    };
    let forks = ForkManager::<Tally>::new(&factory, &sandbox, Rc::new(SilentProgress));
    let adapter = Adapter::primary(Tally::new(state, false), Rc::new(SilentProgress));
    invariant(&CheckContext::new(&adapter, &forks))
}

#[test]
fn test_totals_match_counters() {
    assert!(check(invariants::totals_match_counters, healthy(), 2).is_ok());

    let mut skewed = healthy();
    skewed.side.total = 10;
    let err = check(invariants::totals_match_counters, skewed, 2).unwrap_err();
    assert!(err.is_violation());
    assert_eq!(err.message(), "expected 10 to deeply equal 9; context was:");
}

#[test]
fn test_names_are_unique() {
    assert!(check(invariants::names_are_unique, healthy(), 2).is_ok());

    let mut doubled = healthy();
    doubled.main = partition(&[("a", 1), ("a", 1)], 2);
    let err = check(invariants::names_are_unique, doubled, 2).unwrap_err();
    assert!(err.message().starts_with("main has duplicate counter names"));
}

#[test]
fn test_cursor_is_valid() {
    for cursor in PartitionId::ALL {
        let state = TallyState {
            cursor,
            ..healthy()
        };
        assert!(check(invariants::cursor_is_valid, state, 2).is_ok());
    }
}

#[test]
fn test_fork_view_agrees() {
    assert!(check(invariants::fork_view_agrees, healthy(), 2).is_ok());

    let err = check(invariants::fork_view_agrees, healthy(), 0).unwrap_err();
    assert_eq!(err.kind(), "ForkFault");
}

/// Apply one tally operation to `adapter` with the full pool as peers.
fn step(
    adapter: &mut Adapter<Tally>,
    max_fork_depth: u32,
    name: &str,
    seed: u64,
) -> Result<(), StepFault> {
    let factory = tally::factory(false);
    let sandbox = SandboxConfig {
        max_fork_depth,
        ..SandboxConfig::default()
    };
    let forks = ForkManager::<Tally>::new(&factory, &sandbox, Rc::new(SilentProgress));
    let pool = tally::operations().unwrap();
    let op = pool.get(name).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut cx = StepContext::new(adapter, &forks, pool.view().excluding(name), &mut rng);
    cx.apply_operation(name, op)
}

#[test]
fn test_operations_are_noops_without_material() {
    let mut adapter = Adapter::primary(
        Tally::new(TallyState::default(), false),
        Rc::new(SilentProgress),
    );
    for name in ["bump_counter", "remove_counter"] {
        step(&mut adapter, 2, name, 1).unwrap();
    }
    assert_eq!(adapter.effective_action_count(), 0);

    step(&mut adapter, 2, "add_counter", 1).unwrap();
    assert_eq!(adapter.effective_action_count(), 1);
    assert_eq!(adapter.pending()[0].op_type, "counterAdded");
}

#[test]
fn test_refocus_only_dispatches_on_change() {
    let mut adapter = Adapter::primary(Tally::new(healthy(), false), Rc::new(SilentProgress));
    let mut focused = Vec::new();
    for seed in 0..20 {
        let before = adapter.app().cursor();
        let count = adapter.effective_action_count();
        step(&mut adapter, 2, "refocus", seed).unwrap();
        let changed = adapter.app().cursor() != before;
        assert_eq!(adapter.effective_action_count() - count, u64::from(changed));
        focused.push(adapter.app().cursor());
    }
    assert!(focused.contains(&PartitionId::Side));
}

#[test]
fn test_fuzz_side_partition_leaves_primary_untouched() {
    let mut adapter = Adapter::primary(Tally::new(healthy(), false), Rc::new(SilentProgress));
    for seed in 0..10 {
        step(&mut adapter, 2, "fuzz_side_partition", seed).unwrap();
    }
    assert_eq!(adapter.effective_action_count(), 0);
    assert_eq!(adapter.snapshot(), healthy());
}

#[test]
fn test_fuzz_side_partition_is_a_noop_at_fork_limit() {
    let mut adapter = Adapter::primary(Tally::new(healthy(), false), Rc::new(SilentProgress));
    step(&mut adapter, 0, "fuzz_side_partition", 3).unwrap();
    assert_eq!(adapter.effective_action_count(), 0);
}

#[test]
fn test_reset_is_recorded_as_a_partition_model() {
    let mut adapter = Adapter::primary(Tally::new(healthy(), false), Rc::new(SilentProgress));
    adapter.dispatch(actions::focus(PartitionId::Side)).unwrap();
    step(&mut adapter, 2, "reset_partition", 5).unwrap();

    let reset = adapter.pending().last().unwrap().clone();
    assert_eq!(reset.op_type, "partitionReset");
    assert_eq!(reset.payload["REC_TYPE"], "PartitionModel");
    assert_eq!(reset.payload["partition"], "side");
    assert_eq!(adapter.app().partition(PartitionId::Main), &healthy().main);
}

fn config(dir: &std::path::Path, steps: u32, seed: u64) -> DriverConfig {
    DriverConfig {
        steps_per_run: steps,
        seed: Some(seed),
        artifact_dir: dir.to_path_buf(),
        ..DriverConfig::default()
    }
}

#[tokio::test]
async fn test_healthy_tally_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = tally::driver(config(dir.path(), 60, 7), false)
        .unwrap()
        .with_progress(Rc::new(SilentProgress));

    let outcomes = driver.run_many(2).await.unwrap();
    for outcome in &outcomes {
        assert_eq!(outcome.status, RunStatus::Completed, "{:?}", outcome.fault);
        assert_eq!(outcome.effective_steps, 60);
    }
    assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[tokio::test]
async fn test_planted_bug_is_caught_and_replays() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = tally::driver(config(dir.path(), 255, 42), true)
        .unwrap()
        .with_progress(Rc::new(SilentProgress));

    let outcomes = driver.run_many(5).await.unwrap();
    let failed = outcomes
        .iter()
        .find(|o| o.status == RunStatus::Failed)
        .expect("planted bug never triggered");
    let fault = failed.fault.as_ref().unwrap();
    assert_eq!(fault.origin(), Some("totals_match_counters"));

    let artifact = failed.artifact.as_ref().unwrap();
    let script = std::fs::read_to_string(artifact).unwrap();
    assert!(script.contains("app.actions.counterBumped(fromJS({ \"by\": 7,"));

    let actions = driver.recorder().load(artifact).unwrap();
    assert_eq!(actions.len(), failed.effective_actions);
    let report = driver.replay(&actions).unwrap();
    assert_eq!(report.applied, actions.len());
    assert_eq!(
        report.fault.as_ref().and_then(|f| f.origin()),
        Some("totals_match_counters")
    );
}
