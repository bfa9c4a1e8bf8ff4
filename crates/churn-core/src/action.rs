use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object key marking a payload as a typed record rather than a plain keyed map.
pub const RECORD_TYPE_KEY: &str = "REC_TYPE";

/// One unit of observable effect dispatched to the application under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Operation-type identifier; becomes the invoked name in a replay script.
    pub op_type: String,
    /// Opaque, serializable payload.
    pub payload: Value,
}

impl Action {
    pub fn new(op_type: impl Into<String>, payload: Value) -> Self {
        Self {
            op_type: op_type.into(),
            payload,
        }
    }

    /// An action that carries no payload.
    pub fn bare(op_type: impl Into<String>) -> Self {
        Self::new(op_type, Value::Null)
    }

    /// Whether the payload is a typed record (an object tagged with [`RECORD_TYPE_KEY`]).
    pub fn is_record(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|obj| obj.contains_key(RECORD_TYPE_KEY))
    }
}

/// Append-only record of every effective action of a run, in dispatch order.
///
/// The log is the unit of replay: reapplying it in order to a fresh
/// application must reproduce the same observable state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    actions: Vec<Action>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn append(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Append a batch of actions, preserving their order.
    pub fn extend(&mut self, actions: impl IntoIterator<Item = Action>) {
        self.actions.extend(actions);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn last(&self) -> Option<&Action> {
        self.actions.last()
    }
}

impl From<Vec<Action>> for ActionLog {
    fn from(actions: Vec<Action>) -> Self {
        Self { actions }
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
