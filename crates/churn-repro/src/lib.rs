//! Reproduction artifacts: literal serialization of action payloads, failure
//! message formatting and the script writer/reader.

pub mod literal;
pub mod message;
pub mod recorder;
pub mod script;

pub use literal::{parse_literal, serialize_payload};
pub use message::{expand_message, inspect, simplify_message};
pub use recorder::{RecordError, Recorder};
pub use script::{parse_script, render_script, render_statement, ScriptDialect, ScriptParseError};
