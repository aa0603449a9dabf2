//! Device Configuration
//!
//! Types for `device.toml` and the loader that reads it.

mod loader;

pub use loader::*;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kettle_runtime::SchedulerConfig;

use crate::binder::ResourceKind;
use crate::resources::FunctionOp;

/// Device file (device.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device: DeviceInfo,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Process load paths, loaded in order on start
    #[serde(default)]
    pub processes: Vec<String>,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    pub simulator: Option<SimulatorConfig>,
}

/// Device identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Bus address of this device
    pub address: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// Address of the device publishing hardware components.
    /// Hardware is local when absent.
    pub hardware: Option<String>,
}

fn default_name() -> String {
    "kettle".to_string()
}

/// Scheduler and persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    #[serde(default = "default_settings_dir")]
    pub settings_dir: PathBuf,
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_drain_interval_ms() -> u64 {
    50
}

fn default_settings_dir() -> PathBuf {
    PathBuf::from("./settings")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            drain_interval_ms: default_drain_interval_ms(),
            settings_dir: default_settings_dir(),
        }
    }
}

impl RuntimeConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_tick_interval(Duration::from_millis(self.tick_interval_ms))
            .with_drain_interval(Duration::from_millis(self.drain_interval_ms))
    }
}

/// A known remote device. Connections are still opened lazily.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub address: String,
    pub name: Option<String>,
}

/// One soft resource instance for the `resources` process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub id: String,
    pub kind: ResourceKind,
    /// Hardware name (or target component) attached on first start
    pub assign: Option<String>,
    /// Front-facing units (temperature probes, variables)
    pub units: Option<String>,
    /// PID process variable component
    pub process: Option<String>,
    /// PID control output component
    pub control: Option<String>,
    /// Function inputs
    #[serde(default)]
    pub inputs: Vec<String>,
    pub function: Option<FunctionOp>,
    /// Variable initial value
    pub value: Option<f64>,
}

impl ResourceConfig {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            assign: None,
            units: None,
            process: None,
            control: None,
            inputs: Vec::new(),
            function: None,
            value: None,
        }
    }

    pub fn with_assign(mut self, name: impl Into<String>) -> Self {
        self.assign = Some(name.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

/// Simulated hardware published by the `simulator` process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub relays: Vec<String>,
    #[serde(default)]
    pub dacs: Vec<String>,
    #[serde(default)]
    pub steppers: Vec<String>,
    #[serde(default)]
    pub bit_ins: Vec<String>,
    #[serde(default)]
    pub bit_outs: Vec<String>,
    #[serde(default)]
    pub distances: Vec<String>,
    #[serde(default)]
    pub probes: Vec<String>,
    #[serde(default)]
    pub barometers: Vec<String>,
}
