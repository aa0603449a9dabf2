use std::fmt::Display;
use std::sync::Arc;

use kettle_types::{ComponentConfig, Value};

use crate::bundle::Bundle;
use crate::bus::{Bus, LogLevel, Topic};
use crate::component::Component;
use crate::error::RegistryError;
use crate::registry::LocalRegistry;
use crate::runtime::Runtime;
use crate::settings::{SettingsStore, persist_quietly};

// ─────────────────────────────────────────────────────────────────────────────
// Process Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context passed to process lifecycle methods
pub struct ProcessContext {
    /// Normalized process id
    pub process_id: String,

    /// Human-readable name
    pub name: String,

    runtime: Runtime,
    settings: Arc<dyn SettingsStore>,
    bundle: Bundle,
    logger: ProcessLogger,
    factory: ComponentFactory,
    load_requests: Vec<String>,
    resolved: Vec<Component>,
}

impl ProcessContext {
    pub fn new(
        process_id: impl Into<String>,
        name: impl Into<String>,
        runtime: Runtime,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let process_id = process_id.into();
        let logger = ProcessLogger::new(&process_id, Arc::clone(runtime.registry().bus()));
        let factory = ComponentFactory::new(runtime.registry().clone(), Arc::clone(&settings));

        Self {
            name: name.into(),
            bundle: Bundle::new(runtime.clone()),
            runtime,
            settings,
            logger,
            factory,
            load_requests: Vec::new(),
            resolved: Vec::new(),
            process_id,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// This process's persisted settings
    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn log(&self) -> &ProcessLogger {
        &self.logger
    }

    /// Component factory bound to this process's settings
    pub fn factory(&self) -> ComponentFactory {
        self.factory.clone()
    }

    /// Create and register a component owned by this process
    pub fn create_component(&self, config: ComponentConfig) -> Result<Component, RegistryError> {
        self.factory.create(config)
    }

    /// Declare a dependency and return the component if already resolved
    pub fn require(&self, reference: &str) -> Result<Option<Component>, RegistryError> {
        self.bundle.require(reference)?;
        Ok(self.bundle.get(reference))
    }

    /// Resolved component for a declared dependency
    pub fn get(&self, reference: &str) -> Option<Component> {
        self.bundle.get(reference)
    }

    /// Ask the scheduler to load another process after the current call
    pub fn load(&mut self, path: impl Into<String>) {
        self.load_requests.push(path.into());
    }

    /// Components resolved by the poll before this step
    pub fn newly_resolved(&self) -> &[Component] {
        &self.resolved
    }

    pub(crate) fn take_load_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.load_requests)
    }

    pub(crate) fn poll_bundle(&mut self) {
        self.resolved = self.bundle.poll();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Creates components on behalf of one process: restores `persist`
/// components from its settings and writes their changes through.
#[derive(Clone)]
pub struct ComponentFactory {
    registry: LocalRegistry,
    settings: Arc<dyn SettingsStore>,
}

impl ComponentFactory {
    pub fn new(registry: LocalRegistry, settings: Arc<dyn SettingsStore>) -> Self {
        Self { registry, settings }
    }

    pub fn registry(&self) -> &LocalRegistry {
        &self.registry
    }

    pub fn create(&self, config: ComponentConfig) -> Result<Component, RegistryError> {
        if !config.persist {
            return self.registry.create_component(config);
        }

        let key = config.id.clone();
        let stored = self.settings.get(&key, serde_json::Value::Null);

        let component = if stored.is_null() {
            self.registry.create_component(config)?
        } else {
            let mut restored = config.clone();
            restored.value = Value::from(stored);
            match self.registry.create_component(restored) {
                Err(RegistryError::Invalid(e)) => {
                    tracing::warn!(component = %key, error = %e, "Discarding stored value");
                    self.registry.create_component(config)?
                }
                other => other?,
            }
        };

        let settings = Arc::clone(&self.settings);
        component.subscribe(move |change| {
            persist_quietly(settings.as_ref(), &key, serde_json::Value::from(change.value.clone()));
        });

        Ok(component)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Process Logger
// ─────────────────────────────────────────────────────────────────────────────

/// Emits a tracing event and fans the message out on `log/<level>/<process>`,
/// where `<process>` is the process id with `/` replaced by `.` so the topic
/// keeps three segments
#[derive(Clone)]
pub struct ProcessLogger {
    process_id: String,
    bus: Arc<dyn Bus>,
}

impl ProcessLogger {
    pub fn new(process_id: &str, bus: Arc<dyn Bus>) -> Self {
        Self {
            process_id: process_id.to_string(),
            bus,
        }
    }

    pub fn info(&self, message: impl Display) {
        tracing::info!(process_id = %self.process_id, "{}", message);
        self.publish(LogLevel::Info, message.to_string());
    }

    pub fn warning(&self, message: impl Display) {
        tracing::warn!(process_id = %self.process_id, "{}", message);
        self.publish(LogLevel::Warning, message.to_string());
    }

    pub fn error(&self, message: impl Display) {
        tracing::error!(process_id = %self.process_id, "{}", message);
        self.publish(LogLevel::Error, message.to_string());
    }

    fn publish(&self, level: LogLevel, message: String) {
        let topic = Topic::Log {
            level,
            process: Some(log_segment(&self.process_id)),
        };
        if let Err(e) = self
            .bus
            .publish(&topic.to_string(), serde_json::Value::String(message), false)
        {
            tracing::debug!(process_id = %self.process_id, error = %e, "Failed to publish log");
        }
    }
}

/// Single topic segment for a process id (`processes/still` -> `processes.still`)
fn log_segment(process_id: &str) -> String {
    process_id
        .split('/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BrokerNetwork, LocalBroker};
    use crate::settings::{JsonDirectory, MemoryStore, SettingsBackend};
    use serde_json::json;
    use tempfile::TempDir;

    fn context(network: &Arc<BrokerNetwork>, settings: Arc<dyn SettingsStore>) -> ProcessContext {
        let runtime = Runtime::new("still-1", network.clone()).unwrap();
        ProcessContext::new("processes/still", "Still", runtime, settings)
    }

    #[test]
    fn test_persisted_component_restored_and_written_through() {
        let temp = TempDir::new().unwrap();
        let backend = JsonDirectory::new(temp.path());
        let store = backend.open("processes/still").unwrap();
        store.set("boil_temp", json!(97.0)).unwrap();

        let network = Arc::new(BrokerNetwork::new());
        let ctx = context(&network, store);
        let boil = ctx
            .create_component(ComponentConfig::number("boil_temp").persist(true).with_value(98))
            .unwrap();
        assert_eq!(boil.read(), Value::Number(97.0));

        boil.set(96.5).unwrap();
        let reopened = JsonDirectory::new(temp.path()).open("processes/still").unwrap();
        assert_eq!(reopened.get("boil_temp", json!(null)), json!(96.5));
    }

    #[test]
    fn test_invalid_stored_value_falls_back_to_config() {
        let store = Arc::new(MemoryStore::new());
        store.set("mode", json!("turbo")).unwrap();

        let network = Arc::new(BrokerNetwork::new());
        let ctx = context(&network, store);
        let options = vec!["off".to_string(), "heads".to_string()];
        let mode = ctx
            .create_component(
                ComponentConfig::options("mode", &options)
                    .persist(true)
                    .with_value("off"),
            )
            .unwrap();
        assert_eq!(mode.read(), Value::Text("off".into()));
    }

    #[test]
    fn test_logger_publishes_on_log_topic() {
        let broker = Arc::new(LocalBroker::new("still-1"));
        let mut sub = broker.subscribe("log/+/+").unwrap();
        let logger = ProcessLogger::new("processes/still", broker);

        logger.warning("Column flooding");
        let msg = sub.try_next().unwrap();
        assert_eq!(msg.topic, "log/warning/processes.still");
        assert_eq!(msg.payload, json!("Column flooding"));
        assert_eq!(
            Topic::parse(&msg.topic),
            Some(Topic::Log {
                level: LogLevel::Warning,
                process: Some("processes.still".into()),
            })
        );
    }

    #[test]
    fn test_load_requests_are_taken_once() {
        let network = Arc::new(BrokerNetwork::new());
        let mut ctx = context(&network, Arc::new(MemoryStore::new()));
        ctx.load("processes/heads");
        assert_eq!(ctx.take_load_requests(), vec!["processes/heads".to_string()]);
        assert!(ctx.take_load_requests().is_empty());
    }
}
