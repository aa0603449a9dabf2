//! Built-in Processes
//!
//! - `simulator`: publishes simulated hardware components and name lists
//! - `resources`: builds the soft resources listed in the device config

mod resources;
mod simulator;

pub use resources::*;
pub use simulator::*;

use kettle_runtime::ProcessCatalog;

use crate::config::DeviceConfig;

/// Load path of the simulator process
pub const SIMULATOR: &str = "simulator";

/// Load path of the resources process
pub const RESOURCES: &str = "resources";

/// Catalog with every built-in process, configured from the device file
pub fn builtin_catalog(config: &DeviceConfig) -> ProcessCatalog {
    let simulator = config.simulator.clone().unwrap_or_default();
    let resources = config.resources.clone();
    let hardware = config.device.hardware.clone();

    ProcessCatalog::new()
        .with(SIMULATOR, move || Simulator::new(simulator.clone()))
        .with(RESOURCES, move || {
            ResourcesProcess::new(resources.clone(), hardware.clone())
        })
}
