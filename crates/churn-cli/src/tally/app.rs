use std::fmt;

use churn_core::{Action, Application, StepFault};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Record type tag carried by `partitionReset` payloads.
pub const PARTITION_MODEL: &str = "PartitionModel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionId {
    #[default]
    Main,
    Side,
}

impl PartitionId {
    pub const ALL: [PartitionId; 2] = [PartitionId::Main, PartitionId::Side];

    pub fn other(self) -> Self {
        match self {
            PartitionId::Main => PartitionId::Side,
            PartitionId::Side => PartitionId::Main,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartitionId::Main => "main",
            PartitionId::Side => "side",
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    pub value: i64,
}

/// Counters in insertion order, plus the running total kept alongside them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub counters: Vec<Counter>,
    pub total: i64,
}

impl Partition {
    fn position(&self, name: &str) -> Option<usize> {
        self.counters.iter().position(|c| c.name == name)
    }
}

/// Everything observable about a tally, and its fork snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyState {
    pub main: Partition,
    pub side: Partition,
    pub cursor: PartitionId,
}

/// What the getters report for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSummary {
    pub names: Vec<String>,
    pub values: Vec<i64>,
    pub total: i64,
}

#[derive(Deserialize)]
struct Focus {
    partition: PartitionId,
}

#[derive(Deserialize)]
struct CounterRef {
    partition: PartitionId,
    name: String,
}

#[derive(Deserialize)]
struct Bump {
    partition: PartitionId,
    name: String,
    by: i64,
}

#[derive(Serialize, Deserialize)]
struct PartitionModel {
    #[serde(rename = "REC_TYPE")]
    rec_type: String,
    partition: PartitionId,
    counters: Vec<Counter>,
}

/// Action constructors. Operations go through these so payload shapes stay
/// in one place.
pub mod actions {
    use super::*;

    pub fn focus(partition: PartitionId) -> Action {
        Action::new("focus", json!({ "partition": partition }))
    }

    pub fn counter_added(partition: PartitionId, name: &str) -> Action {
        Action::new("counterAdded", json!({ "partition": partition, "name": name }))
    }

    pub fn counter_bumped(partition: PartitionId, name: &str, by: i64) -> Action {
        Action::new(
            "counterBumped",
            json!({ "partition": partition, "name": name, "by": by }),
        )
    }

    pub fn counter_removed(partition: PartitionId, name: &str) -> Action {
        Action::new("counterRemoved", json!({ "partition": partition, "name": name }))
    }

    pub fn partition_reset(partition: PartitionId, counters: Vec<Counter>) -> Action {
        let model = PartitionModel {
            rec_type: PARTITION_MODEL.to_string(),
            partition,
            counters,
        };
        Action::new(
            "partitionReset",
            serde_json::to_value(model).unwrap_or(Value::Null),
        )
    }
}

/// A partitioned counter store.
///
/// With `plant_bug` set, a bump of exactly 7 adds one too many to the
/// cached total, which `totals_match_counters` catches.
#[derive(Debug, Clone)]
pub struct Tally {
    state: TallyState,
    plant_bug: bool,
}

impl Tally {
    pub fn new(state: TallyState, plant_bug: bool) -> Self {
        Self { state, plant_bug }
    }

    pub fn cursor(&self) -> PartitionId {
        self.state.cursor
    }

    pub fn partition(&self, id: PartitionId) -> &Partition {
        match id {
            PartitionId::Main => &self.state.main,
            PartitionId::Side => &self.state.side,
        }
    }

    pub fn counter_names(&self, id: PartitionId) -> Vec<String> {
        self.partition(id)
            .counters
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn total(&self, id: PartitionId) -> i64 {
        self.partition(id).total
    }

    pub fn summary(&self, id: PartitionId) -> PartitionSummary {
        let partition = self.partition(id);
        PartitionSummary {
            names: self.counter_names(id),
            values: partition.counters.iter().map(|c| c.value).collect(),
            total: partition.total,
        }
    }

    fn partition_mut(&mut self, id: PartitionId) -> &mut Partition {
        match id {
            PartitionId::Main => &mut self.state.main,
            PartitionId::Side => &mut self.state.side,
        }
    }

    fn add(&mut self, id: PartitionId, name: String) -> Result<(), StepFault> {
        let partition = self.partition_mut(id);
        if partition.position(&name).is_some() {
            return Err(StepFault::adapter(format!(
                "counter '{name}' already exists in {id}"
            )));
        }
        partition.counters.push(Counter { name, value: 0 });
        Ok(())
    }

    fn bump(&mut self, id: PartitionId, name: &str, by: i64) -> Result<(), StepFault> {
        let skew = i64::from(self.plant_bug && by == 7);
        let partition = self.partition_mut(id);
        let index = partition
            .position(name)
            .ok_or_else(|| StepFault::adapter(format!("no counter '{name}' in {id}")))?;
        partition.counters[index].value += by;
        partition.total += by + skew;
        Ok(())
    }

    fn remove(&mut self, id: PartitionId, name: &str) -> Result<(), StepFault> {
        let partition = self.partition_mut(id);
        let index = partition
            .position(name)
            .ok_or_else(|| StepFault::adapter(format!("no counter '{name}' in {id}")))?;
        let removed = partition.counters.remove(index);
        partition.total -= removed.value;
        Ok(())
    }

    fn reset(&mut self, model: PartitionModel) -> Result<(), StepFault> {
        if model.rec_type != PARTITION_MODEL {
            return Err(StepFault::adapter(format!(
                "expected a {PARTITION_MODEL} record, got {}",
                model.rec_type
            )));
        }
        let mut replacement = Partition::default();
        for counter in model.counters {
            if replacement.position(&counter.name).is_some() {
                return Err(StepFault::adapter(format!(
                    "duplicate counter '{}' in reset of {}",
                    counter.name, model.partition
                )));
            }
            replacement.total += counter.value;
            replacement.counters.push(counter);
        }
        *self.partition_mut(model.partition) = replacement;
        Ok(())
    }
}

fn payload<T: DeserializeOwned>(action: &Action) -> Result<T, StepFault> {
    serde_json::from_value(action.payload.clone()).map_err(|e| {
        StepFault::adapter(format!("bad {} payload: {e}", action.op_type))
    })
}

impl Application for Tally {
    type Snapshot = TallyState;

    fn apply(&mut self, action: &Action) -> Result<(), StepFault> {
        match action.op_type.as_str() {
            "focus" => {
                let Focus { partition } = payload(action)?;
                self.state.cursor = partition;
                Ok(())
            }
            "counterAdded" => {
                let CounterRef { partition, name } = payload(action)?;
                self.add(partition, name)
            }
            "counterBumped" => {
                let Bump {
                    partition,
                    name,
                    by,
                } = payload(action)?;
                self.bump(partition, &name, by)
            }
            "counterRemoved" => {
                let CounterRef { partition, name } = payload(action)?;
                self.remove(partition, &name)
            }
            "partitionReset" => self.reset(payload(action)?),
            other => Err(StepFault::adapter(format!("unknown action {other}"))),
        }
    }

    fn snapshot(&self) -> TallyState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(tally: &mut Tally, list: Vec<Action>) {
        for action in list {
            tally.apply(&action).unwrap();
        }
    }

    #[test]
    fn test_actions_update_partition_and_total() {
        let mut tally = Tally::new(TallyState::default(), false);
        apply_all(
            &mut tally,
            vec![
                actions::counter_added(PartitionId::Side, "a"),
                actions::counter_added(PartitionId::Side, "b"),
                actions::counter_bumped(PartitionId::Side, "a", 5),
                actions::counter_bumped(PartitionId::Side, "b", 7),
                actions::counter_removed(PartitionId::Side, "a"),
                actions::focus(PartitionId::Side),
            ],
        );

        assert_eq!(tally.counter_names(PartitionId::Side), vec!["b"]);
        assert_eq!(tally.total(PartitionId::Side), 7);
        assert_eq!(tally.total(PartitionId::Main), 0);
        assert_eq!(tally.cursor(), PartitionId::Side);
    }

    #[test]
    fn test_planted_bug_skews_total_on_seven() {
        let mut tally = Tally::new(TallyState::default(), true);
        apply_all(
            &mut tally,
            vec![
                actions::counter_added(PartitionId::Main, "a"),
                actions::counter_bumped(PartitionId::Main, "a", 6),
            ],
        );
        assert_eq!(tally.total(PartitionId::Main), 6);

        tally
            .apply(&actions::counter_bumped(PartitionId::Main, "a", 7))
            .unwrap();
        assert_eq!(tally.summary(PartitionId::Main).values, vec![13]);
        assert_eq!(tally.total(PartitionId::Main), 14);
    }

    #[test]
    fn test_reset_payload_is_a_record() {
        let action = actions::partition_reset(
            PartitionId::Main,
            vec![Counter {
                name: "r0".into(),
                value: 3,
            }],
        );
        assert!(Action::is_record(&action.payload));

        let mut tally = Tally::new(TallyState::default(), false);
        tally.apply(&action).unwrap();
        assert_eq!(tally.total(PartitionId::Main), 3);
    }

    #[test]
    fn test_rejects_duplicates_and_unknown_counters() {
        let mut tally = Tally::new(TallyState::default(), false);
        tally
            .apply(&actions::counter_added(PartitionId::Main, "a"))
            .unwrap();

        let dup = tally.apply(&actions::counter_added(PartitionId::Main, "a"));
        assert_eq!(dup.unwrap_err().kind(), "AdapterFault");
        let missing = tally.apply(&actions::counter_removed(PartitionId::Side, "a"));
        assert!(missing.is_err());
        let unknown = tally.apply(&Action::bare("explode"));
        assert!(unknown.unwrap_err().message().contains("unknown action"));
    }

    #[test]
    fn test_malformed_payload_is_an_adapter_fault() {
        let mut tally = Tally::new(TallyState::default(), false);
        let err = tally
            .apply(&Action::new("focus", json!({ "partition": "elsewhere" })))
            .unwrap_err();
        assert_eq!(err.kind(), "AdapterFault");
        assert!(err.message().starts_with("bad focus payload"));
    }
}
