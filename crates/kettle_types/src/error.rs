//! Error types for the component data model.

use thiserror::Error;

/// A value or configuration was rejected by a component's type rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A NUMBER component was written something that does not parse as a number
    #[error("'{0}' is not a number")]
    NotANumber(String),

    /// An OPTIONS component was written a value outside its option list
    #[error("'{value}' is not one of the allowed options {options:?}")]
    NotAnOption { value: String, options: Vec<String> },

    /// Component ids must be non-empty and free of topic separators
    #[error("invalid component id '{0}'")]
    InvalidId(String),

    /// Component classes must be free of topic separators
    #[error("invalid component class '{0}'")]
    InvalidClass(String),

    /// `info.options` must be a list of strings
    #[error("invalid options for component '{0}': expected a list of strings")]
    InvalidOptions(String),
}

/// No conversion is registered between two unit tags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no conversion registered from '{from}' to '{to}'")]
pub struct ConversionError {
    pub from: String,
    pub to: String,
}
