use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Trailer appended by [`Violation::assert_equal`]; reporters strip it again.
pub const CONTEXT_TRAILER: &str = "; context was:";

/// A detected inconsistency, raised by an invariant (or by an operation that
/// checks a property inline).
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub message: String,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
    /// Name of the invariant or operation that raised it, filled in by the driver.
    pub origin: Option<String>,
    /// Rendered backtrace, present only when backtraces are enabled.
    pub backtrace: Option<String>,
}

impl Violation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
            origin: None,
            backtrace: capture_backtrace(),
        }
    }

    /// A violation carrying an `expected`/`actual` pair for diagnostics.
    pub fn mismatch(message: impl Into<String>, expected: Value, actual: Value) -> Self {
        Self {
            expected: Some(expected),
            actual: Some(actual),
            ..Self::new(message)
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Structural equality check in the style of a test assertion.
    ///
    /// Both sides are converted to JSON so the diagnostic pair can be carried
    /// into the reproduction artifact.
    pub fn assert_equal<T: Serialize + PartialEq>(expected: &T, actual: &T) -> Result<(), Self> {
        if expected == actual {
            return Ok(());
        }
        match (serde_json::to_value(expected), serde_json::to_value(actual)) {
            (Ok(expected), Ok(actual)) => Err(Self::mismatch(
                format!("expected {actual} to deeply equal {expected}{CONTEXT_TRAILER}"),
                expected,
                actual,
            )),
            // No pair at all rather than a made-up one.
            (Err(err), _) | (_, Err(err)) => Err(Self::new(format!(
                "values are not deeply equal and cannot be shown ({err}){CONTEXT_TRAILER}"
            ))),
        }
    }

    /// Check a boolean condition, failing with `message` when it does not hold.
    pub fn ensure(condition: bool, message: impl Into<String>) -> Result<(), Self> {
        if condition {
            Ok(())
        } else {
            Err(Self::new(message))
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Violation {}

/// Everything that can abort a step. All variants abort the current run and
/// trigger reproduction capture; none of them abort the process.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StepFault {
    #[error("{0}")]
    Violation(Violation),

    #[error("{message}")]
    Adapter {
        message: String,
        origin: Option<String>,
    },

    #[error("panicked: {message}")]
    Panic {
        message: String,
        origin: Option<String>,
    },

    #[error("fork failed: {message}")]
    Fork {
        message: String,
        origin: Option<String>,
    },
}

impl StepFault {
    pub fn adapter(message: impl Into<String>) -> Self {
        StepFault::Adapter {
            message: message.into(),
            origin: None,
        }
    }

    pub fn fork(message: impl Into<String>) -> Self {
        StepFault::Fork {
            message: message.into(),
            origin: None,
        }
    }

    /// Convert a payload caught by `catch_unwind` into a fault.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        StepFault::Panic {
            message,
            origin: None,
        }
    }

    /// Record which plugin raised the fault, unless it is already attributed.
    pub fn attributed(mut self, name: &str) -> Self {
        let slot = match &mut self {
            StepFault::Violation(v) => &mut v.origin,
            StepFault::Adapter { origin, .. }
            | StepFault::Panic { origin, .. }
            | StepFault::Fork { origin, .. } => origin,
        };
        if slot.is_none() {
            *slot = Some(name.to_string());
        }
        self
    }

    /// Short taxonomy label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StepFault::Violation(_) => "InvariantViolation",
            StepFault::Adapter { .. } => "AdapterFault",
            StepFault::Panic { .. } => "Panic",
            StepFault::Fork { .. } => "ForkFault",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StepFault::Violation(v) => &v.message,
            StepFault::Adapter { message, .. }
            | StepFault::Panic { message, .. }
            | StepFault::Fork { message, .. } => message,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        match self {
            StepFault::Violation(v) => v.origin.as_deref(),
            StepFault::Adapter { origin, .. }
            | StepFault::Panic { origin, .. }
            | StepFault::Fork { origin, .. } => origin.as_deref(),
        }
    }

    pub fn expected(&self) -> Option<&Value> {
        match self {
            StepFault::Violation(v) => v.expected.as_ref(),
            _ => None,
        }
    }

    pub fn actual(&self) -> Option<&Value> {
        match self {
            StepFault::Violation(v) => v.actual.as_ref(),
            _ => None,
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, StepFault::Violation(_))
    }

    /// Full diagnostic context: kind, message, origin and backtrace if any.
    pub fn context(&self) -> String {
        let mut out = format!("{}: {}", self.kind(), self.message());
        if let Some(origin) = self.origin() {
            out.push_str("\n    at ");
            out.push_str(origin);
        }
        if let StepFault::Violation(Violation {
            backtrace: Some(bt),
            ..
        }) = self
        {
            out.push('\n');
            out.push_str(bt.trim_end());
        }
        out
    }
}

impl From<Violation> for StepFault {
    fn from(v: Violation) -> Self {
        StepFault::Violation(v)
    }
}

fn capture_backtrace() -> Option<String> {
    let bt = Backtrace::capture();
    match bt.status() {
        BacktraceStatus::Captured => Some(bt.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assert_equal_passes_on_equal_values() {
        assert!(Violation::assert_equal(&vec![1, 2], &vec![1, 2]).is_ok());
    }

    #[test]
    fn test_assert_equal_carries_diagnostic_pair() {
        let err = Violation::assert_equal(&vec![1, 2], &vec![1, 3]).unwrap_err();
        assert_eq!(err.expected, Some(json!([1, 2])));
        assert_eq!(err.actual, Some(json!([1, 3])));
        assert!(err.message.ends_with(CONTEXT_TRAILER));
    }

    #[test]
    fn test_assert_equal_without_json_form_has_no_pair() {
        use std::collections::BTreeMap;

        let left: BTreeMap<(u8, u8), u8> = BTreeMap::from([((0, 0), 1)]);
        let right: BTreeMap<(u8, u8), u8> = BTreeMap::from([((0, 0), 2)]);
        let err = Violation::assert_equal(&left, &right).unwrap_err();
        assert!(err.expected.is_none());
        assert!(err.actual.is_none());
        assert!(err.message.starts_with("values are not deeply equal"));
        assert!(err.message.ends_with(CONTEXT_TRAILER));
    }

    #[test]
    fn test_attribution_is_sticky() {
        let fault = StepFault::adapter("boom").attributed("first").attributed("second");
        assert_eq!(fault.origin(), Some("first"));
    }

    #[test]
    fn test_panic_payload_conversion() {
        let fault = StepFault::from_panic(Box::new("static message"));
        assert_eq!(fault.message(), "static message");
        let fault = StepFault::from_panic(Box::new(String::from("owned")));
        assert_eq!(fault.message(), "owned");
        let fault = StepFault::from_panic(Box::new(17u32));
        assert_eq!(fault.message(), "non-string panic payload");
    }

    #[test]
    fn test_context_mentions_kind_and_origin() {
        let fault = StepFault::from(Violation::new("count is odd")).attributed("count_is_even");
        let ctx = fault.context();
        assert!(ctx.starts_with("InvariantViolation: count is odd"));
        assert!(ctx.contains("at count_is_even"));
    }
}
