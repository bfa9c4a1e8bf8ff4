use churn_core::{Action, ActionLog, StepFault};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::literal::{is_identifier, serialize_payload, Cursor};
use crate::message::expand_message;

const DEFAULT_PRELUDE: &str = "// APPLICATION SETUP:

const app = createTestApp();

// ACTION REPLAY:

";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptParseError {
    #[error("Unexpected end of script at byte {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("Expected {expected} at byte {offset}")]
    Expected { expected: String, offset: usize },

    #[error("Invalid literal '{token}' at byte {offset}")]
    InvalidLiteral { token: String, offset: usize },

    #[error("Comment block is never closed")]
    UnterminatedComment,

    #[error("Script does not contain the expected prelude")]
    MissingPrelude,
}

/// Literal syntax of reproduction scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptDialect {
    /// File extension, without the dot.
    pub extension: String,
    /// Setup code emitted between the comment block and the replay statements.
    pub prelude: String,
    /// Expression the action names are invoked on.
    pub receiver: String,
    /// Function wrapping keyed maps and records.
    pub constructor: String,
}

impl Default for ScriptDialect {
    fn default() -> Self {
        Self {
            extension: "js".to_string(),
            prelude: DEFAULT_PRELUDE.to_string(),
            receiver: "app.actions".to_string(),
            constructor: "fromJS".to_string(),
        }
    }
}

impl ScriptDialect {
    pub fn file_name(&self, run_id: &str) -> String {
        format!("fuzz-{run_id}.{}", self.extension)
    }
}

/// One replay statement, e.g. `app.actions.counterAdded(fromJS({ "name": "a" }));`.
///
/// Names that are not identifiers are invoked in bracket form instead:
/// `app.actions["counter-added"](1);`.
pub fn render_statement(action: &Action, dialect: &ScriptDialect) -> String {
    let payload = serialize_payload(&action.payload, &dialect.constructor);
    if is_identifier(&action.op_type) {
        format!("{}.{}({payload});", dialect.receiver, action.op_type)
    } else {
        let quoted = Value::String(action.op_type.clone());
        format!("{}[{quoted}]({payload});", dialect.receiver)
    }
}

/// The complete artifact: comment block, prelude, one statement per action.
pub fn render_script(fault: &StepFault, log: &ActionLog, dialect: &ScriptDialect) -> String {
    let mut out = String::new();
    out.push_str("/*\n");
    out.push_str(&expand_message(fault).replace("*/", "*\\/"));
    out.push_str("\n*/\n");
    out.push_str(&dialect.prelude);
    let statements: Vec<String> = log
        .iter()
        .map(|action| render_statement(action, dialect))
        .collect();
    out.push_str(&statements.join("\n\n"));
    out.push('\n');
    out
}

/// Read the replay statements of a script back into actions.
///
/// Error offsets count bytes from the start of the replay section.
pub fn parse_script(text: &str, dialect: &ScriptDialect) -> Result<Vec<Action>, ScriptParseError> {
    let body = strip_comment(text)?;
    let body = body
        .strip_prefix(dialect.prelude.as_str())
        .ok_or(ScriptParseError::MissingPrelude)?;

    let mut cursor = Cursor::new(body);
    let mut actions = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.at_end() {
            break;
        }
        cursor.expect(&dialect.receiver)?;
        let op_type = if cursor.eat("[") {
            cursor.skip_ws();
            let name = cursor.string()?;
            cursor.expect("]")?;
            name
        } else {
            cursor.expect(".")?;
            cursor.identifier()?.to_string()
        };
        cursor.expect("(")?;
        let payload = cursor.literal(&dialect.constructor)?;
        cursor.expect(")")?;
        cursor.expect(";")?;
        actions.push(Action::new(op_type, payload));
    }
    Ok(actions)
}

fn strip_comment(text: &str) -> Result<&str, ScriptParseError> {
    let Some(rest) = text.strip_prefix("/*") else {
        return Ok(text);
    };
    let end = rest
        .find("*/")
        .ok_or(ScriptParseError::UnterminatedComment)?;
    let after = &rest[end + 2..];
    Ok(after.strip_prefix('\n').unwrap_or(after))
}
