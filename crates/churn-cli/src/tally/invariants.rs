use std::collections::BTreeSet;

use churn_core::{StepFault, Violation};
use churn_model::CheckContext;

use super::app::{actions, PartitionId, Tally};

/// Each partition's cached total is the sum of its counters.
pub fn totals_match_counters(cx: &CheckContext<'_, Tally>) -> Result<(), StepFault> {
    for id in PartitionId::ALL {
        let partition = cx.app().partition(id);
        let sum: i64 = partition.counters.iter().map(|c| c.value).sum();
        Violation::assert_equal(&sum, &partition.total)?;
    }
    Ok(())
}

pub fn names_are_unique(cx: &CheckContext<'_, Tally>) -> Result<(), StepFault> {
    for id in PartitionId::ALL {
        let names = cx.app().counter_names(id);
        let distinct: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        Violation::ensure(
            distinct.len() == names.len(),
            format!("{id} has duplicate counter names: {names:?}"),
        )?;
    }
    Ok(())
}

pub fn cursor_is_valid(cx: &CheckContext<'_, Tally>) -> Result<(), StepFault> {
    let cursor = cx.app().cursor();
    Violation::ensure(
        PartitionId::ALL.contains(&cursor),
        format!("cursor points at unknown partition {cursor}"),
    )?;
    Ok(())
}

/// Refocusing a fork must not change what either partition reports.
pub fn fork_view_agrees(cx: &CheckContext<'_, Tally>) -> Result<(), StepFault> {
    let mut fork = cx.fork()?;
    fork.dispatch(actions::focus(cx.app().cursor().other()))?;
    for id in PartitionId::ALL {
        Violation::assert_equal(&cx.app().summary(id), &fork.app().summary(id))?;
    }
    Ok(())
}
