//! Payload literals for replay scripts.
//!
//! Keyed maps become `<constructor>({ "k": <literal>, ... })` with every field
//! rendered recursively, records become `<constructor>(<pretty JSON>)`, arrays
//! become `[ a, b ]` and scalars are plain JSON. The parser accepts exactly
//! this grammar (plain JSON is a subset of it).

use churn_core::Action;
use serde_json::{Map, Value};

use crate::script::ScriptParseError;

/// Render a payload as a source literal.
pub fn serialize_payload(value: &Value, constructor: &str) -> String {
    match value {
        Value::Object(_) if Action::is_record(value) => {
            let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("{constructor}({pretty})")
        }
        Value::Object(map) => {
            let fields: Vec<String> = map
                .iter()
                .map(|(key, field)| {
                    format!(
                        "{}: {}",
                        Value::String(key.clone()),
                        serialize_payload(field, constructor)
                    )
                })
                .collect();
            format!("{constructor}({{ {} }})", fields.join(", "))
        }
        Value::Array(items) => {
            let items: Vec<String> = items
                .iter()
                .map(|item| serialize_payload(item, constructor))
                .collect();
            format!("[ {} ]", items.join(", "))
        }
        scalar => scalar.to_string(),
    }
}

/// Parse a literal produced by [`serialize_payload`] back into a value.
pub fn parse_literal(src: &str, constructor: &str) -> Result<Value, ScriptParseError> {
    let mut cursor = Cursor::new(src);
    let value = cursor.literal(constructor)?;
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(cursor.expected("end of literal"));
    }
    Ok(value)
}

/// Whether `name` can follow a `.` in a script as-is.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Byte cursor shared by the literal and script parsers.
pub(crate) struct Cursor<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub(crate) fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    pub(crate) fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, token: &str) -> Result<(), ScriptParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.expected(format!("'{token}'")))
        }
    }

    pub(crate) fn expected(&self, what: impl Into<String>) -> ScriptParseError {
        if self.at_end() {
            ScriptParseError::UnexpectedEnd { offset: self.pos }
        } else {
            ScriptParseError::Expected {
                expected: what.into(),
                offset: self.pos,
            }
        }
    }

    pub(crate) fn identifier(&mut self) -> Result<&'s str, ScriptParseError> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.expected("identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    pub(crate) fn literal(&mut self, constructor: &str) -> Result<Value, ScriptParseError> {
        self.skip_ws();
        if self.at_constructor(constructor) {
            self.pos += constructor.len();
            self.expect("(")?;
            let inner = self.literal(constructor)?;
            self.expect(")")?;
            return Ok(inner);
        }
        match self.rest().chars().next() {
            None => Err(self.expected("literal")),
            Some('{') => self.object(constructor),
            Some('[') => self.array(constructor),
            Some('"') => self.string().map(Value::String),
            Some(_) => self.scalar(),
        }
    }

    fn at_constructor(&self, constructor: &str) -> bool {
        !constructor.is_empty()
            && self
                .rest()
                .strip_prefix(constructor)
                .is_some_and(|after| after.trim_start().starts_with('('))
    }

    fn object(&mut self, constructor: &str) -> Result<Value, ScriptParseError> {
        self.expect("{")?;
        let mut map = Map::new();
        if self.eat("}") {
            return Ok(Value::Object(map));
        }
        loop {
            self.skip_ws();
            if !self.rest().starts_with('"') {
                return Err(self.expected("quoted key"));
            }
            let key = self.string()?;
            self.expect(":")?;
            let value = self.literal(constructor)?;
            map.insert(key, value);
            if self.eat(",") {
                continue;
            }
            self.expect("}")?;
            return Ok(Value::Object(map));
        }
    }

    fn array(&mut self, constructor: &str) -> Result<Value, ScriptParseError> {
        self.expect("[")?;
        let mut items = Vec::new();
        if self.eat("]") {
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.literal(constructor)?);
            if self.eat(",") {
                continue;
            }
            self.expect("]")?;
            return Ok(Value::Array(items));
        }
    }

    /// A JSON string literal, starting at the opening quote.
    pub(crate) fn string(&mut self) -> Result<String, ScriptParseError> {
        let rest = self.rest();
        if !rest.starts_with('"') {
            return Err(self.expected("string"));
        }
        let bytes = rest.as_bytes();
        let mut i = 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'"' => break,
                _ => i += 1,
            }
        }
        if i >= bytes.len() {
            return Err(ScriptParseError::UnexpectedEnd {
                offset: self.src.len(),
            });
        }
        let token = &rest[..=i];
        let value = serde_json::from_str::<String>(token).map_err(|_| self.invalid(token))?;
        self.pos += token.len();
        Ok(value)
    }

    /// Numbers, `true`, `false` and `null`.
    fn scalar(&mut self) -> Result<Value, ScriptParseError> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, ',' | ')' | ']' | '}'))
            .unwrap_or(rest.len());
        let token = &rest[..len];
        match serde_json::from_str::<Value>(token) {
            Ok(value) if !value.is_object() && !value.is_array() => {
                self.pos += len;
                Ok(value)
            }
            _ => Err(self.invalid(token)),
        }
    }

    fn invalid(&self, token: &str) -> ScriptParseError {
        ScriptParseError::InvalidLiteral {
            token: token.to_string(),
            offset: self.pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars_are_plain_json() {
        assert_eq!(serialize_payload(&json!(3), "fromJS"), "3");
        assert_eq!(serialize_payload(&json!("a\"b"), "fromJS"), r#""a\"b""#);
        assert_eq!(serialize_payload(&json!(null), "fromJS"), "null");
        assert_eq!(serialize_payload(&json!(true), "fromJS"), "true");
    }

    #[test]
    fn test_keyed_map_recurses_into_fields() {
        let value = json!({ "b": [1, { "c": 2 }], "a": "x" });
        assert_eq!(
            serialize_payload(&value, "fromJS"),
            r#"fromJS({ "a": "x", "b": [ 1, fromJS({ "c": 2 }) ] })"#
        );
    }

    #[test]
    fn test_record_is_emitted_whole() {
        let value = json!({ "REC_TYPE": "Point", "x": 1 });
        assert_eq!(
            serialize_payload(&value, "fromJS"),
            "fromJS({\n  \"REC_TYPE\": \"Point\",\n  \"x\": 1\n})"
        );
    }

    #[test]
    fn test_empty_containers() {
        assert_eq!(serialize_payload(&json!([]), "fromJS"), "[  ]");
        assert_eq!(serialize_payload(&json!({}), "fromJS"), "fromJS({  })");
        assert_eq!(parse_literal("[  ]", "fromJS").unwrap(), json!([]));
        assert_eq!(parse_literal("fromJS({  })", "fromJS").unwrap(), json!({}));
    }

    #[test]
    fn test_parse_inverts_serialize() {
        let value = json!({
            "list": [1, -2.5, "three", null, { "REC_TYPE": "Inner", "deep": [[], {}] }],
            "nested": { "flag": false, "text": "a, b) ]" },
        });
        let text = serialize_payload(&value, "fromJS");
        assert_eq!(parse_literal(&text, "fromJS").unwrap(), value);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_literal("fromJS({ \"a\": nope })", "fromJS"),
            Err(ScriptParseError::InvalidLiteral { .. })
        ));
        assert!(matches!(
            parse_literal("[ 1, 2", "fromJS"),
            Err(ScriptParseError::UnexpectedEnd { .. })
        ));
        assert!(parse_literal("1 2", "fromJS").is_err());
    }
}
