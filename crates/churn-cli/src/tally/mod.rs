//! `tally`: a partitioned counter store the binary fuzzes out of the box.

pub mod app;
pub mod invariants;
pub mod ops;

use churn_core::StepFault;
use churn_explore::{Driver, DriverConfig, DriverError};
use churn_model::{InvariantPool, OperationPool};

pub use app::{PartitionId, PartitionSummary, Tally, TallyState};

/// Factory for fresh or forked tallies.
pub fn factory(plant_bug: bool) -> impl Fn(Option<TallyState>) -> Result<Tally, StepFault> {
    move |snapshot| Ok(Tally::new(snapshot.unwrap_or_default(), plant_bug))
}

pub fn operations() -> Result<OperationPool<Tally>, DriverError> {
    let mut pool = OperationPool::new();
    pool.register("add_counter", ops::add_counter)?;
    pool.register("bump_counter", ops::bump_counter)?;
    pool.register("remove_counter", ops::remove_counter)?;
    pool.register("reset_partition", ops::reset_partition)?;
    pool.register("refocus", ops::refocus)?;
    pool.register("fuzz_side_partition", ops::fuzz_side_partition)?;
    Ok(pool)
}

pub fn invariants() -> Result<InvariantPool<Tally>, DriverError> {
    let mut pool = InvariantPool::new();
    pool.register("totals_match_counters", invariants::totals_match_counters)?;
    pool.register("names_are_unique", invariants::names_are_unique)?;
    pool.register("cursor_is_valid", invariants::cursor_is_valid)?;
    pool.register("fork_view_agrees", invariants::fork_view_agrees)?;
    Ok(pool)
}

/// A driver over the full tally pools.
pub fn driver(config: DriverConfig, plant_bug: bool) -> Result<Driver<Tally>, DriverError> {
    Ok(Driver::new(
        factory(plant_bug),
        operations()?,
        invariants()?,
        config,
    ))
}
