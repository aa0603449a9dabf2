//! Control Processes
//!
//! A process is a unit of control logic with a one-time `setup` and a
//! periodic `step`. Processes are created from a [`ProcessCatalog`] by load
//! path and driven by the [`Scheduler`].
//!
//! # Lifecycle
//!
//! - dependencies returned by `requires` are loaded first
//! - `setup` runs exactly once, in load order
//! - `step` runs once per scheduler tick, in registration order
//!
//! A process whose factory is unknown, whose dependency failed, or whose
//! `setup` errored or panicked is marked failed and never stepped.

mod context;
mod scheduler;

pub use context::*;
pub use scheduler::*;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessError;

/// Result type for process operations
pub type ProcessResult<T> = Result<T, ProcessError>;

// ─────────────────────────────────────────────────────────────────────────────
// Process Specification
// ─────────────────────────────────────────────────────────────────────────────

/// Descriptive metadata for a process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Human-readable name
    pub name: String,

    pub description: String,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

/// Where a process is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Dependencies or setup still running
    Loading,
    /// Setup done, stepped on every tick
    Steady,
    /// Permanently excluded
    Failed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Process Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Control logic driven by the scheduler
#[async_trait]
pub trait Process: Send + 'static {
    /// Returns the process metadata
    fn spec(&self) -> ProcessSpec;

    /// Load paths of processes that must be set up before this one
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Called exactly once. Errors and panics fail the process.
    async fn setup(&mut self, ctx: &mut ProcessContext) -> ProcessResult<()>;

    /// Called on every tick. Errors and panics are logged and ignored.
    async fn step(&mut self, _ctx: &mut ProcessContext) -> ProcessResult<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

type ProcessFactory = Arc<dyn Fn() -> Box<dyn Process> + Send + Sync>;

/// Maps normalized load paths to process factories
#[derive(Clone, Default)]
pub struct ProcessCatalog {
    factories: HashMap<String, ProcessFactory>,
}

impl ProcessCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a load path
    pub fn register<P, F>(&mut self, path: &str, factory: F)
    where
        P: Process,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let factory: ProcessFactory = Arc::new(move || Box::new(factory()) as Box<dyn Process>);
        self.factories.insert(normalize_path(path), factory);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<P, F>(mut self, path: &str, factory: F) -> Self
    where
        P: Process,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.register(path, factory);
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(&normalize_path(path))
    }

    /// Instantiate the process registered under `path`
    pub fn create(&self, path: &str) -> Option<Box<dyn Process>> {
        self.factories.get(&normalize_path(path)).map(|f| f())
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Normalize a load path into a process id.
///
/// Separators become `/`, `.` and `..` segments are resolved, leading
/// slashes and the file extension are dropped:
/// `./processes/../processes/Still.js` -> `processes/Still`.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    if let Some(last) = segments.last_mut() {
        let file: &str = last;
        if let Some((stem, _ext)) = file.rsplit_once('.') {
            if !stem.is_empty() {
                *last = stem;
            }
        }
    }

    segments.join("/")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    #[async_trait]
    impl Process for Idle {
        fn spec(&self) -> ProcessSpec {
            ProcessSpec::new("Idle")
        }

        async fn setup(&mut self, _ctx: &mut ProcessContext) -> ProcessResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("processes/still.js"), "processes/still");
        assert_eq!(normalize_path("./processes/./still"), "processes/still");
        assert_eq!(normalize_path("processes/lib/../still.rs"), "processes/still");
        assert_eq!(normalize_path("\\processes\\still"), "processes/still");
        assert_eq!(normalize_path("/resources"), "resources");
        assert_eq!(normalize_path(".hidden"), ".hidden");
    }

    #[test]
    fn test_catalog_lookup_is_normalized() {
        let catalog = ProcessCatalog::new().with("processes/idle.js", || Idle);
        assert!(catalog.contains("./processes/idle"));
        assert!(catalog.create("processes\\idle.rs").is_some());
        assert!(catalog.create("processes/busy").is_none());
        assert_eq!(catalog.ids(), vec!["processes/idle".to_string()]);
    }

    #[test]
    fn test_spec_builder() {
        let spec = ProcessSpec::new("Still").with_description("Pot still controller");
        assert_eq!(spec.name, "Still");
        assert_eq!(spec.description, "Pot still controller");
    }
}
