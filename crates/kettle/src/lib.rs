//! Kettle - Device runtime for small control boxes
//!
//! This crate wires [`kettle_runtime`] into a runnable device:
//! - Device configuration loading (`device.toml`)
//! - The soft/hard resource binder and its name pools
//! - Soft resource kinds (hardware-backed, PID, variable, function)
//! - Built-in processes (`simulator`, `resources`)

// Re-export core crates
pub use kettle_runtime;
pub use kettle_types;

// Device configuration
pub mod config;

// Name pools and hardware binding
pub mod binder;

// Soft resource kinds
pub mod resources;

// Built-in processes
pub mod processes;
