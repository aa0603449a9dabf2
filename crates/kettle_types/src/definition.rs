//! Component configuration and wire definition
//!
//! [`ComponentConfig`] enumerates every field a component recognizes together
//! with its default, and is validated once at construction.
//! [`ComponentDefinition`] is the metadata payload published (retained) on the
//! bus; it deliberately carries no value or timestamp, those travel on
//! separate topics.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::kind::{ComponentType, Info, set_options};
use crate::value::Value;

/// Characters that would break topic addressing
const RESERVED: &[char] = &['/', '+', '#', ':'];

// ─────────────────────────────────────────────────────────────────────────────
// Component Config
// ─────────────────────────────────────────────────────────────────────────────

/// Construction config for a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Globally unique identifier
    pub id: String,

    /// Display name (defaults to the id)
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Display grouping used by front ends
    #[serde(default)]
    pub group: String,

    #[serde(default)]
    pub display_order: i32,

    /// Discovery tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default, rename = "type")]
    pub component_type: ComponentType,

    #[serde(default)]
    pub units: String,

    #[serde(default)]
    pub read_only: bool,

    /// Restore from and write through to the owning process's settings
    #[serde(default)]
    pub persist: bool,

    #[serde(default)]
    pub info: Info,

    /// Initial value, coerced on validation
    #[serde(default)]
    pub value: Value,
}

impl ComponentConfig {
    /// Create a TEXT component config with all other fields defaulted
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            group: String::new(),
            display_order: 0,
            class: None,
            component_type: ComponentType::Text,
            units: String::new(),
            read_only: false,
            persist: false,
            info: Info::new(),
            value: Value::Unset,
        }
    }

    /// NUMBER component
    pub fn number(id: impl Into<String>) -> Self {
        Self::new(id).with_type(ComponentType::Number)
    }

    /// BOOLEAN component
    pub fn boolean(id: impl Into<String>) -> Self {
        Self::new(id).with_type(ComponentType::Boolean)
    }

    /// TEXT component
    pub fn text(id: impl Into<String>) -> Self {
        Self::new(id)
    }

    /// OPTIONS component constrained to `options`
    pub fn options(id: impl Into<String>, options: &[String]) -> Self {
        let mut config = Self::new(id).with_type(ComponentType::Options);
        set_options(&mut config.info, options);
        config
    }

    pub fn with_type(mut self, component_type: ComponentType) -> Self {
        self.component_type = component_type;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_display_order(mut self, order: i32) -> Self {
        self.display_order = order;
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.info.insert(key.into(), value);
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }

    /// Validate and fill defaults.
    ///
    /// Rejects ids or classes that cannot be addressed on the bus, malformed
    /// `info.options`, and initial values that fail coercion.
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        if self.id.trim().is_empty() || self.id.contains(RESERVED) {
            return Err(ValidationError::InvalidId(self.id));
        }

        if let Some(class) = &self.class {
            if class.is_empty() || class.contains(RESERVED) {
                return Err(ValidationError::InvalidClass(class.clone()));
            }
        }

        if let Some(opts) = self.info.get("options") {
            let valid = opts
                .as_array()
                .map(|items| items.iter().all(|i| i.is_string()))
                .unwrap_or(false);
            if !valid {
                return Err(ValidationError::InvalidOptions(self.id));
            }
        }

        if self.name.is_empty() {
            self.name = self.id.clone();
        }

        let initial = std::mem::take(&mut self.value);
        self.value = self.component_type.coerce(initial, &self.info)?;

        Ok(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component Definition (wire payload)
// ─────────────────────────────────────────────────────────────────────────────

/// Component metadata as published on `component/by_id/<id>/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub info: Info,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub persist: bool,
}

impl From<&ComponentConfig> for ComponentDefinition {
    fn from(config: &ComponentConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            description: config.description.clone(),
            component_type: config.component_type,
            class: config.class.clone(),
            read_only: config.read_only,
            info: config.info.clone(),
            units: config.units.clone(),
            group: config.group.clone(),
            display_order: config.display_order,
            persist: config.persist,
        }
    }
}

impl ComponentDefinition {
    /// Build a config for a local mirror of this definition.
    ///
    /// Mirrors never persist locally, the owning device does that.
    pub fn to_mirror_config(&self, id: impl Into<String>) -> ComponentConfig {
        ComponentConfig {
            id: id.into(),
            name: self.name.clone(),
            description: self.description.clone(),
            group: self.group.clone(),
            display_order: self.display_order,
            class: self.class.clone(),
            component_type: self.component_type,
            units: self.units.clone(),
            read_only: self.read_only,
            persist: false,
            info: self.info.clone(),
            value: Value::Unset,
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
    fn test_defaults_fill_name() {
        let config = ComponentConfig::number("boiler_temp").validate().unwrap();
        assert_eq!(config.name, "boiler_temp");
        assert_eq!(config.component_type, ComponentType::Number);
        assert!(config.value.is_unset());
    }

    #[test]
    fn test_rejects_unaddressable_ids() {
        for bad in ["", "a/b", "temp+", "x#", "id:host"] {
            assert!(matches!(
                ComponentConfig::new(bad).validate(),
                Err(ValidationError::InvalidId(_))
            ));
        }
        assert!(matches!(
            ComponentConfig::new("ok").with_class("a/b").validate(),
            Err(ValidationError::InvalidClass(_))
        ));
    }

    #[test]
    fn test_initial_value_is_coerced() {
        let config = ComponentConfig::boolean("pump").with_value("1").validate().unwrap();
        assert_eq!(config.value, Value::Bool(true));

        let err = ComponentConfig::number("rate").with_value("fast").validate();
        assert!(matches!(err, Err(ValidationError::NotANumber(_))));
    }

    #[test]
    fn test_rejects_malformed_options() {
        let config = ComponentConfig::new("mode")
            .with_type(ComponentType::Options)
            .with_info("options", serde_json::json!([1, 2]));
        assert!(matches!(config.validate(), Err(ValidationError::InvalidOptions(_))));
    }

    #[test]
    fn test_definition_payload_fields() {
        let config = ComponentConfig::number("mash_temp")
            .with_name("Mash Temperature")
            .with_class("temperature")
            .with_units("C")
            .read_only(true)
            .with_value(66.0)
            .validate()
            .unwrap();

        let json = serde_json::to_value(ComponentDefinition::from(&config)).unwrap();
        assert_eq!(json["id"], "mash_temp");
        assert_eq!(json["type"], "NUMBER");
        assert_eq!(json["class"], "temperature");
        assert_eq!(json["units"], "C");
        assert_eq!(json["read_only"], true);
        assert!(json.get("value").is_none());

        let back: ComponentDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back.name, "Mash Temperature");
    }
}
