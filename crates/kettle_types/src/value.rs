//! Component values
//!
//! A [`Value`] is what travels on the bus as a bare value payload and what a
//! component stores. It serializes as plain JSON (`null`, `true`, `12.5`,
//! `"text"`), so a value written by one device can be read by any front end.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Value
// ─────────────────────────────────────────────────────────────────────────────

/// Dynamically typed component value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value has been written, or the value was cleared
    #[default]
    Unset,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all numbers are 64-bit floats on the wire)
    Number(f64),
    /// UTF-8 text
    Text(String),
}

impl Value {
    /// Check if the value is unset
    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by boolean consumers: `true`, non-zero numbers and
    /// the strings "true"/"1" are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Unset => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => s == "true" || s == "1",
        }
    }

    /// Render the value as text, the way TEXT components store it
    pub fn to_text(&self) -> String {
        match self {
            Value::Unset => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Get the value type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unset => "unset",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
        }
    }
}

/// Integral numbers render without a trailing `.0`
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unset => write!(f, "<unset>"),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Unset)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Unset,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Unset),
            serde_json::Value::String(s) => Value::Text(s),
            // Structured payloads are kept verbatim as text
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Unset => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_bare_json() {
        assert_eq!(serde_json::to_string(&Value::Unset).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::from(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Value::from(12.5)).unwrap(), "12.5");
        assert_eq!(serde_json::to_string(&Value::from("on")).unwrap(), "\"on\"");
    }

    #[test]
    fn test_deserializes_bare_json() {
        let v: Value = serde_json::from_str("null").unwrap();
        assert!(v.is_unset());
        let v: Value = serde_json::from_str("3").unwrap();
        assert_eq!(v.as_f64(), Some(3.0));
        let v: Value = serde_json::from_str("\"RELAY_1A_0\"").unwrap();
        assert_eq!(v.as_str(), Some("RELAY_1A_0"));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::from(12.0).to_text(), "12");
        assert_eq!(Value::from(0.25).to_text(), "0.25");
        assert_eq!(Value::from(false).to_text(), "false");
        assert_eq!(Value::Unset.to_text(), "");
    }

    #[test]
    fn test_json_conversion() {
        let v: Value = serde_json::json!([1, 2]).into();
        assert_eq!(v.as_str(), Some("[1,2]"));

        let json: serde_json::Value = Value::from(7).into();
        assert_eq!(json, serde_json::json!(7.0));
    }
}
