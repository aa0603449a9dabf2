//! Component types and write coercion
//!
//! Every write to a component passes through [`ComponentType::coerce`]. The
//! rules are deliberately lenient for BOOLEAN and TEXT (anything can be
//! coerced) and strict for NUMBER (non-numeric input is an error).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::value::Value;

/// Open metadata map attached to a component (`{"options": [...]}` etc.)
pub type Info = serde_json::Map<String, serde_json::Value>;

/// Declared type of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    #[default]
    Text,
    Number,
    Boolean,
    Options,
    LongText,
}

impl ComponentType {
    /// Coerce an incoming value to this type.
    ///
    /// `Value::Unset` always passes through untouched, clearing the component.
    pub fn coerce(&self, input: Value, info: &Info) -> Result<Value, ValidationError> {
        if input.is_unset() {
            return Ok(Value::Unset);
        }

        match self {
            ComponentType::Number => match input {
                Value::Number(n) if n.is_finite() => Ok(Value::Number(n)),
                Value::Text(ref s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Value::Number)
                    .ok_or_else(|| ValidationError::NotANumber(s.clone())),
                other => Err(ValidationError::NotANumber(other.to_text())),
            },

            ComponentType::Boolean => Ok(Value::Bool(match input {
                Value::Bool(b) => b,
                Value::Number(n) => n == 1.0,
                Value::Text(s) => s == "true" || s == "1",
                Value::Unset => false,
            })),

            ComponentType::Text | ComponentType::LongText => Ok(Value::Text(input.to_text())),

            ComponentType::Options => {
                let text = input.to_text();
                let allowed = options(info);
                if allowed.is_empty() || allowed.iter().any(|o| *o == text) {
                    Ok(Value::Text(text))
                } else {
                    Err(ValidationError::NotAnOption {
                        value: text,
                        options: allowed,
                    })
                }
            }
        }
    }

    /// Safe default used when a front-facing component is reset
    pub fn safe_default(&self) -> Value {
        match self {
            ComponentType::Number => Value::Number(0.0),
            ComponentType::Boolean => Value::Bool(false),
            _ => Value::Text(String::new()),
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentType::Text => write!(f, "TEXT"),
            ComponentType::Number => write!(f, "NUMBER"),
            ComponentType::Boolean => write!(f, "BOOLEAN"),
            ComponentType::Options => write!(f, "OPTIONS"),
            ComponentType::LongText => write!(f, "LONG_TEXT"),
        }
    }
}

/// Read `info.options` as a list of strings. Non-string entries are skipped.
pub fn options(info: &Info) -> Vec<String> {
    info.get("options")
        .and_then(|o| o.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Replace `info.options` with the given list
pub fn set_options(info: &mut Info, opts: &[String]) {
    info.insert(
        "options".to_string(),
        serde_json::Value::Array(
            opts.iter()
                .map(|o| serde_json::Value::String(o.clone()))
                .collect(),
        ),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
