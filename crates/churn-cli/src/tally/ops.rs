//! Operations over the focused partition. Each one is a no-op when it has
//! nothing sensible to do.

use churn_core::{StepFault, Violation};
use churn_model::StepContext;
use rand::Rng;

use super::app::{actions, Counter, PartitionId, Tally};

/// Longest nested exploration `fuzz_side_partition` takes.
const MAX_SIDE_STEPS: usize = 20;

pub fn add_counter(cx: &mut StepContext<'_, Tally>) -> Result<(), StepFault> {
    let partition = cx.app().cursor();
    let name = format!("c{}", cx.rng().gen_range(0..100));
    if cx.app().counter_names(partition).contains(&name) {
        return Ok(());
    }
    cx.dispatch(actions::counter_added(partition, &name))
}

pub fn bump_counter(cx: &mut StepContext<'_, Tally>) -> Result<(), StepFault> {
    let partition = cx.app().cursor();
    let names = cx.app().counter_names(partition);
    if names.is_empty() {
        return Ok(());
    }
    let name = &names[cx.rng().gen_range(0..names.len())];
    let by = cx.rng().gen_range(1..=9);
    cx.dispatch(actions::counter_bumped(partition, name, by))
}

pub fn remove_counter(cx: &mut StepContext<'_, Tally>) -> Result<(), StepFault> {
    let partition = cx.app().cursor();
    let names = cx.app().counter_names(partition);
    if names.is_empty() {
        return Ok(());
    }
    let name = &names[cx.rng().gen_range(0..names.len())];
    cx.dispatch(actions::counter_removed(partition, name))
}

pub fn reset_partition(cx: &mut StepContext<'_, Tally>) -> Result<(), StepFault> {
    let partition = cx.app().cursor();
    let size = cx.rng().gen_range(0..=3);
    let counters = (0..size)
        .map(|i| Counter {
            name: format!("r{i}"),
            value: cx.rng().gen_range(0..=20),
        })
        .collect();
    cx.dispatch(actions::partition_reset(partition, counters))
}

pub fn refocus(cx: &mut StepContext<'_, Tally>) -> Result<(), StepFault> {
    let target = PartitionId::ALL[cx.rng().gen_range(0..PartitionId::ALL.len())];
    if target == cx.app().cursor() {
        return Ok(());
    }
    cx.dispatch(actions::focus(target))
}

/// Fork, wander around the side partition for a while, and check the main
/// partition looks the same from inside the fork as it does here.
pub fn fuzz_side_partition(cx: &mut StepContext<'_, Tally>) -> Result<(), StepFault> {
    if !cx.can_fork() {
        return Ok(());
    }
    let before = cx.app().summary(PartitionId::Main);
    let mut fork = cx.fork()?;
    if fork.app().cursor() != PartitionId::Side {
        fork.dispatch(actions::focus(PartitionId::Side))?;
    }

    let peers = cx.peers().excluding("refocus");
    let steps = cx.rng().gen_range(1..=MAX_SIDE_STEPS);
    cx.explore_from(&mut fork, &peers, steps)?;

    let after = fork.app().summary(PartitionId::Main);
    Violation::assert_equal(&before, &after)?;
    Ok(())
}
