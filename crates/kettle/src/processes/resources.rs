//! Resources process
//!
//! Builds every `[[resources]]` entry of the device file on one shared
//! [`Binder`], then each step applies pool and selector changes and runs every
//! resource's periodic work.

use std::time::Instant;

use async_trait::async_trait;

use kettle_runtime::{Process, ProcessContext, ProcessResult, ProcessSpec};

use crate::binder::{Binder, BinderError, ResourceKind};
use crate::config::ResourceConfig;
use crate::resources::{
    Function, FunctionOp, HardwareResource, PidResource, SoftResource, Variable,
};

/// Hosts the configured soft resources
pub struct ResourcesProcess {
    configs: Vec<ResourceConfig>,
    hardware: Option<String>,
    binder: Option<Binder>,
    resources: Vec<Box<dyn SoftResource>>,
}

impl ResourcesProcess {
    pub fn new(configs: Vec<ResourceConfig>, hardware: Option<String>) -> Self {
        Self {
            configs,
            hardware,
            binder: None,
            resources: Vec::new(),
        }
    }

    pub fn binder(&self) -> Option<&Binder> {
        self.binder.as_ref()
    }

    fn build(
        binder: &Binder,
        config: &ResourceConfig,
    ) -> Result<Box<dyn SoftResource>, BinderError> {
        let factory = binder.factory();
        let bundle = binder.bundle().clone();
        let id = config.id.as_str();

        let mut resource: Box<dyn SoftResource> = match config.kind {
            ResourceKind::Pid => Box::new(PidResource::new(
                factory,
                bundle,
                id,
                config.process.as_deref(),
                config.control.as_deref(),
            )?),
            ResourceKind::Variable => Box::new(Variable::new(
                factory,
                bundle,
                id,
                config.units.as_deref(),
                config.value,
            )?),
            ResourceKind::Function => {
                let op = config.function.unwrap_or(FunctionOp::Sum);
                Box::new(Function::new(
                    factory,
                    bundle,
                    id,
                    config.inputs.clone(),
                    op.into_fn(),
                )?)
            }
            kind => Box::new(HardwareResource::register(
                binder,
                id,
                kind,
                config.units.as_deref(),
            )?),
        };

        // Restored assignments win over the configured one
        let restored = match config.kind {
            kind if kind.is_hardware() => binder
                .selector(id)
                .is_some_and(|s| !s.read().to_text().is_empty()),
            _ => resource.assignment().is_some(),
        };
        if let Some(name) = config.assign.as_deref() {
            if !restored {
                resource.attach(name)?;
            }
        }

        Ok(resource)
    }
}

#[async_trait]
impl Process for ResourcesProcess {
    fn spec(&self) -> ProcessSpec {
        ProcessSpec::new("Resources").with_description("Soft resources bound to hardware")
    }

    async fn setup(&mut self, ctx: &mut ProcessContext) -> ProcessResult<()> {
        let binder = Binder::new(ctx.factory(), ctx.bundle().clone(), self.hardware.clone());

        for config in &self.configs {
            match Self::build(&binder, config) {
                Ok(resource) => self.resources.push(resource),
                Err(e) => ctx
                    .log()
                    .error(format!("Resource '{}' ({}) not built: {}", config.id, config.kind, e)),
            }
        }

        binder.poll();
        ctx.log().info(format!("{} resources ready", self.resources.len()));
        self.binder = Some(binder);
        Ok(())
    }

    async fn step(&mut self, _ctx: &mut ProcessContext) -> ProcessResult<()> {
        if let Some(binder) = &self.binder {
            binder.poll();
        }

        let now = Instant::now();
        for resource in self.resources.iter_mut() {
            resource.process(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kettle_runtime::{
        BrokerNetwork, Bundle, JsonDirectory, MemoryBackend, Runtime, Scheduler, SettingsBackend,
    };
    use kettle_types::Value;
    use tempfile::TempDir;

    use crate::config::ConfigLoader;
    use crate::processes::builtin_catalog;

    const DEVICE: &str = r#"
processes = ["resources", "simulator"]

[device]
address = "still-1"

[[resources]]
id = "heater"
kind = "relay"
assign = "RELAY_1A_0"

[[resources]]
id = "head"
kind = "temperature"
units = "F"
assign = "PROBE_0"

[[resources]]
id = "boiler"
kind = "pid"
process = "head_temperature"
control = "element_output"

[[resources]]
id = "element"
kind = "dac"
assign = "DAC_0"

[simulator]
relays = ["RELAY_1A_0", "RELAY_1A_1"]
probes = ["PROBE_0"]
dacs = ["DAC_0"]
"#;

    async fn boot(settings: Arc<dyn SettingsBackend>) -> (Runtime, Scheduler) {
        let config = ConfigLoader::parse(DEVICE).unwrap();
        let runtime = Runtime::new("still-1", Arc::new(BrokerNetwork::new())).unwrap();
        let mut scheduler = Scheduler::new(runtime.clone(), builtin_catalog(&config), settings);
        assert_eq!(scheduler.load_all(&config.processes).await, 2);
        (runtime, scheduler)
    }

    fn component(runtime: &Runtime, id: &str) -> kettle_runtime::Component {
        let bundle = Bundle::new(runtime.clone());
        bundle.require(id).unwrap();
        bundle.get(id).unwrap()
    }

    #[tokio::test]
    async fn test_relay_enable_reaches_hardware_within_a_tick() {
        let (runtime, mut scheduler) = boot(Arc::new(MemoryBackend::new())).await;
        scheduler.tick().await;

        let enable = component(&runtime, "heater_enable");
        let relay = component(&runtime, "RELAY_1A_0");
        enable.set(true).unwrap();
        scheduler.tick().await;
        assert_eq!(relay.read(), Value::Bool(true));

        let selector = component(&runtime, "heater_assignment");
        assert_eq!(selector.read(), Value::Text("RELAY_1A_0".into()));
        assert_eq!(selector.options(), vec!["", "RELAY_1A_0", "RELAY_1A_1"]);

        selector.set("").unwrap();
        scheduler.tick().await;
        assert_eq!(relay.read(), Value::Bool(false));
        assert_eq!(enable.read(), Value::Bool(false));
        assert_eq!(selector.options(), vec!["", "RELAY_1A_0", "RELAY_1A_1"]);
    }

    #[tokio::test]
    async fn test_pid_drives_dac_from_probe() {
        let (runtime, mut scheduler) = boot(Arc::new(MemoryBackend::new())).await;
        scheduler.tick().await;

        let head = component(&runtime, "head_temperature");
        assert_eq!(head.units(), "F");
        assert_eq!(head.read(), Value::Number(68.0));

        component(&runtime, "boiler_setpoint").set(78.0).unwrap();
        component(&runtime, "boiler_enable").set(true).unwrap();
        scheduler.tick().await;

        let dac = component(&runtime, "DAC_0_output");
        assert!(dac.read().as_f64().unwrap() > 0.0);

        component(&runtime, "boiler_enable").set(false).unwrap();
        assert_eq!(dac.read(), Value::Number(0.0));
    }

    #[tokio::test]
    async fn test_assignment_survives_restart() {
        let temp = TempDir::new().unwrap();
        {
            let (runtime, mut scheduler) = boot(Arc::new(JsonDirectory::new(temp.path()))).await;
            scheduler.tick().await;
            component(&runtime, "heater_assignment").set("RELAY_1A_1").unwrap();
            scheduler.tick().await;
            assert_eq!(
                component(&runtime, "heater_enable").read(),
                Value::Bool(false)
            );
        }

        let (runtime, mut scheduler) = boot(Arc::new(JsonDirectory::new(temp.path()))).await;
        scheduler.tick().await;
        let selector = component(&runtime, "heater_assignment");
        assert_eq!(selector.read(), Value::Text("RELAY_1A_1".into()));

        component(&runtime, "heater_enable").set(true).unwrap();
        assert_eq!(component(&runtime, "RELAY_1A_1").read(), Value::Bool(true));
        assert_eq!(component(&runtime, "RELAY_1A_0").read(), Value::Bool(false));
    }
}
