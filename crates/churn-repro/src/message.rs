use churn_core::fault::CONTEXT_TRAILER;
use churn_core::StepFault;
use serde_json::Value;

/// Nesting depth shown by [`inspect`] before containers collapse to
/// `[Object]` / `[Array]`.
pub const INSPECT_DEPTH: usize = 5;

const BREAK_LENGTH: usize = 72;

/// First line of `message`, without the assertion trailer.
pub fn simplify_message(message: &str) -> String {
    let first = message.split('\n').next().unwrap_or_default();
    first.strip_suffix(CONTEXT_TRAILER).unwrap_or(first).to_string()
}

/// Full diagnostic text: the fault context, then the expected/actual pair
/// when the fault carries one.
///
/// Presence decides, not truthiness: an expected `0`, `false` or `null` is
/// still printed, since that is often the interesting half of the pair.
pub fn expand_message(fault: &StepFault) -> String {
    let mut parts = vec![fault.context()];
    if let Some(expected) = fault.expected() {
        parts.push(format!("Expected: {}", inspect(expected)));
    }
    if let Some(actual) = fault.actual() {
        parts.push(format!("Actual:   {}", inspect(actual)));
    }
    parts.join("\n\n")
}

/// Human-oriented rendering of a value, in the style of a REPL printer.
pub fn inspect(value: &Value) -> String {
    inspect_with_depth(value, INSPECT_DEPTH)
}

pub fn inspect_with_depth(value: &Value, depth: usize) -> String {
    render(value, 0, depth, 0)
}

fn render(value: &Value, level: usize, depth: usize, indent: usize) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Array(_) if level > depth => "[Array]".to_string(),
        Value::Object(_) if level > depth => "[Object]".to_string(),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(|item| render(item, level + 1, depth, indent + 2))
                .collect();
            wrap('[', ']', parts, indent)
        }
        Value::Object(map) => {
            let parts = map
                .iter()
                .map(|(key, field)| {
                    format!("{}: {}", object_key(key), render(field, level + 1, depth, indent + 2))
                })
                .collect();
            wrap('{', '}', parts, indent)
        }
    }
}

fn wrap(open: char, close: char, parts: Vec<String>, indent: usize) -> String {
    let single = format!("{open} {} {close}", parts.join(", "));
    if indent + single.len() <= BREAK_LENGTH && !single.contains('\n') {
        return single;
    }
    let pad = " ".repeat(indent + 2);
    let body: Vec<String> = parts.iter().map(|part| format!("{pad}{part}")).collect();
    format!("{open}\n{}\n{}{close}", body.join(",\n"), " ".repeat(indent))
}

fn object_key(key: &str) -> String {
    let mut chars = key.chars();
    let is_ident = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        key.to_string()
    } else {
        quote(key)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use churn_core::Violation;
    use serde_json::json;

    #[test]
    fn test_simplify_keeps_first_line_only() {
        assert_eq!(
            simplify_message("expected 1 to deeply equal 2; context was:\n  at foo\n  at bar"),
            "expected 1 to deeply equal 2"
        );
        assert_eq!(simplify_message("plain"), "plain");
        assert_eq!(simplify_message(""), "");
        // Only a trailing marker is stripped.
        assert_eq!(
            simplify_message("a; context was: b"),
            "a; context was: b"
        );
    }

    #[test]
    fn test_expand_includes_pair_when_present() {
        let fault: StepFault = Violation::assert_equal(&json!({ "n": 1 }), &json!({ "n": 2 }))
            .unwrap_err()
            .into();
        let expanded = expand_message(&fault);
        let sections: Vec<&str> = expanded.split("\n\n").collect();
        assert!(sections[0].starts_with("InvariantViolation: expected"));
        assert_eq!(sections[sections.len() - 2], "Expected: { n: 1 }");
        assert_eq!(sections[sections.len() - 1], "Actual:   { n: 2 }");
    }

    #[test]
    fn test_expand_prints_falsy_pairs() {
        for (expected, actual) in [(json!(0), json!(1)), (json!(false), json!(null))] {
            let fault: StepFault =
                Violation::mismatch("mismatch", expected.clone(), actual.clone()).into();
            let expanded = expand_message(&fault);
            assert!(expanded.contains(&format!("Expected: {}", inspect(&expected))));
            assert!(expanded.contains(&format!("Actual:   {}", inspect(&actual))));
        }
    }

    #[test]
    fn test_expand_without_pair_is_just_context() {
        let fault = StepFault::adapter("dispatch refused").attributed("add_counter");
        assert_eq!(
            expand_message(&fault),
            "AdapterFault: dispatch refused\n    at add_counter"
        );
    }

    #[test]
    fn test_inspect_collapses_deep_nesting() {
        let deep = json!({ "a": { "b": { "c": { "d": { "e": { "f": { "g": 1 } } } } } } });
        let out = inspect(&deep);
        assert!(out.contains("f: [Object]"), "{out}");
        assert!(!out.contains("g:"));

        let arrays = json!([[[[[[[1]]]]]]]);
        assert!(inspect(&arrays).contains("[Array]"));
        assert_eq!(inspect_with_depth(&json!({ "x": [1] }), 0), "{ x: [Array] }");
    }

    #[test]
    fn test_inspect_scalars_and_keys() {
        assert_eq!(
            inspect(&json!({ "plain": "it's", "needs quote": null })),
            "{ 'needs quote': null, plain: 'it\\'s' }"
        );
        assert_eq!(inspect(&json!([])), "[]");
    }

    #[test]
    fn test_inspect_breaks_long_values() {
        let long: Vec<String> = (0..20).map(|i| format!("item-{i}")).collect();
        let out = inspect(&json!(long));
        assert!(out.starts_with("[\n  'item-0',\n"));
        assert!(out.ends_with("\n]"));
    }
}
