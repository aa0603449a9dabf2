//! Kettle Types - Core data model for device components
//!
//! This crate contains the pure data structures shared by the runtime and the
//! device application:
//!
//! - [`Value`]: the dynamically typed value carried by a component
//! - [`ComponentType`]: the declared type and its write coercion rules
//! - [`convert_value`]: the unit conversion table used by mirrors
//! - [`ComponentConfig`] / [`ComponentDefinition`]: construction config and
//!   wire payload for component metadata
//!
//! Nothing in here performs I/O.

mod definition;
mod error;
mod kind;
mod units;
mod value;

pub use definition::*;
pub use error::*;
pub use kind::*;
pub use units::*;
pub use value::*;
