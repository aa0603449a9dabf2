//! Local component registry
//!
//! Owns every component created on this device, publishes their definitions
//! and values on the device's own bus, serves `write/...` and `read/...`
//! requests from front ends, and resolves local requirements.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use kettle_types::{ComponentConfig, Value};

use crate::bus::{Bus, BusMessage, Subscription, Topic};
use crate::component::{ChangeOrigin, Component};
use crate::error::{ComponentError, RegistryError, TransportError};
use crate::resolve::{ComponentSource, Resolution, Waiters as IdWaiters, add_waiter};

/// Handle to the local registry. Cheap to clone.
#[derive(Clone)]
pub struct LocalRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    bus: Arc<dyn Bus>,
    components: DashMap<String, Component>,
    /// Held while inserting so waiters never miss a creation
    pending: Mutex<Waiters>,
    requests: Mutex<Vec<Subscription>>,
}

#[derive(Default)]
struct Waiters {
    ids: IdWaiters,
    classes: HashMap<String, Vec<mpsc::UnboundedSender<Component>>>,
}

impl LocalRegistry {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                bus,
                components: DashMap::new(),
                pending: Mutex::new(Waiters::default()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.inner.bus
    }

    pub fn address(&self) -> &str {
        self.inner.bus.address()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Creation
    // ─────────────────────────────────────────────────────────────────────

    /// Create, register and publish a component
    pub fn create_component(&self, config: ComponentConfig) -> Result<Component, RegistryError> {
        let id = config.id.clone();
        if self.inner.components.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }

        let component = Component::create(config).map_err(|e| match e {
            ComponentError::Validation { source, .. } => RegistryError::Invalid(source),
            other => RegistryError::InvalidReference(other.to_string()),
        })?;

        let bus = Arc::clone(&self.inner.bus);
        let class = component.class();
        component.subscribe(move |change| {
            if change.origin == ChangeOrigin::Remote {
                return;
            }
            publish_value(bus.as_ref(), &change.id, class.as_deref(), &change.value);
        });

        let (waiters, watchers) = {
            let mut pending = self.inner.pending.lock();
            if self.inner.components.contains_key(&id) {
                return Err(RegistryError::Duplicate(id));
            }
            self.inner.components.insert(id.clone(), component.clone());

            let waiters = pending.ids.remove(&id).unwrap_or_default();
            let watchers = match component.class() {
                Some(class) => {
                    let senders = pending.classes.entry(class).or_default();
                    senders.retain(|tx| !tx.is_closed());
                    senders.clone()
                }
                None => Vec::new(),
            };
            (waiters, watchers)
        };

        self.republish(&component);
        let value = component.read();
        if !value.is_unset() {
            publish_value(self.inner.bus.as_ref(), &id, component.class().as_deref(), &value);
        }

        for waiter in waiters {
            let _ = waiter.send(component.clone());
        }
        for watcher in watchers {
            let _ = watcher.send(component.clone());
        }

        debug!(component = %id, "Created component");
        Ok(component)
    }

    fn publish_definition(&self, component: &Component) -> Result<(), TransportError> {
        let definition = component.definition();
        let payload = serde_json::to_value(&definition).unwrap_or(serde_json::Value::Null);

        self.inner
            .bus
            .publish(&Topic::info(&definition.id).to_string(), payload.clone(), true)?;

        if let Some(class) = &definition.class {
            let topic = Topic::ClassInfo {
                class: class.clone(),
                id: definition.id.clone(),
            };
            self.inner.bus.publish(&topic.to_string(), payload, true)?;
        }
        Ok(())
    }

    /// Re-publish a component's definition, e.g. after its options changed
    pub fn republish(&self, component: &Component) {
        if let Err(e) = self.publish_definition(component) {
            warn!(component = %component.id(), error = %e, "Failed to republish definition");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.inner.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.components.is_empty()
    }

    /// Live one-shot waiters for `id`
    pub fn waiter_count(&self, id: &str) -> usize {
        self.inner
            .pending
            .lock()
            .ids
            .get(id)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// All component ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.components.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    // ─────────────────────────────────────────────────────────────────────
    // Front-end requests
    // ─────────────────────────────────────────────────────────────────────

    /// Start listening for `write/<id>` and `read/<group>/<class>/<id>`
    pub fn serve_requests(&self) -> Result<(), TransportError> {
        let write = self.inner.bus.subscribe("write/+")?;
        let read = self.inner.bus.subscribe("read/+/+/+")?;

        let mut requests = self.inner.requests.lock();
        requests.push(write);
        requests.push(read);

        info!(address = %self.address(), "Serving read/write requests");
        Ok(())
    }

    /// Apply every pending front-end request. Returns how many were handled.
    pub fn drain_requests(&self) -> usize {
        let messages: Vec<BusMessage> = {
            let mut requests = self.inner.requests.lock();
            requests.iter_mut().flat_map(|s| s.drain()).collect()
        };

        let count = messages.len();
        for message in messages {
            self.handle_request(message);
        }
        count
    }

    fn handle_request(&self, message: BusMessage) {
        match message.parsed_topic() {
            Some(Topic::Write { id }) => self.handle_write(&id, message.payload),
            Some(Topic::Read { group, class, id }) => self.handle_read(&group, &class, &id),
            _ => debug!(topic = %message.topic, "Ignoring request"),
        }
    }

    fn handle_write(&self, id: &str, payload: serde_json::Value) {
        let Some(component) = self.lookup(id) else {
            debug!(component = %id, "Write request for unknown component");
            return;
        };

        if component.is_read_only() {
            warn!(error = %ComponentError::ReadOnly(id.to_string()), "Write request rejected");
            return;
        }

        if let Err(e) = component.write(Value::from(payload), ChangeOrigin::Local) {
            warn!(component = %id, error = %e, "Write request rejected");
        }
    }

    fn handle_read(&self, group: &str, class: &str, id: &str) {
        let matches: Vec<Component> = self
            .inner
            .components
            .iter()
            .filter(|e| id == "+" || e.key() == id)
            .filter(|e| group == "+" || e.value().group() == group)
            .filter(|e| class == "+" || e.value().class().as_deref() == Some(class))
            .map(|e| e.value().clone())
            .collect();

        for component in matches {
            publish_value(
                self.inner.bus.as_ref(),
                component.id(),
                component.class().as_deref(),
                &component.read(),
            );
        }
    }
}

impl ComponentSource for LocalRegistry {
    fn lookup(&self, id: &str) -> Option<Component> {
        self.inner.components.get(id).map(|c| c.value().clone())
    }

    fn resolve(&self, id: &str) -> Resolution {
        let mut pending = self.inner.pending.lock();
        if let Some(component) = self.lookup(id) {
            return Resolution::Ready(component);
        }

        Resolution::Pending(add_waiter(&mut pending.ids, id))
    }

    fn watch_class(&self, class: &str) -> mpsc::UnboundedReceiver<Component> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut pending = self.inner.pending.lock();

        let mut existing: Vec<Component> = self
            .inner
            .components
            .iter()
            .filter(|e| e.value().class().as_deref() == Some(class))
            .map(|e| e.value().clone())
            .collect();
        existing.sort_by(|a, b| a.id().cmp(b.id()));
        for component in existing {
            let _ = tx.send(component);
        }

        pending.classes.entry(class.to_string()).or_default().push(tx);
        rx
    }
}

/// Publish a value on its id topic and, when classed, its class topic
fn publish_value(bus: &dyn Bus, id: &str, class: Option<&str>, value: &Value) {
    let payload = serde_json::Value::from(value.clone());

    if let Err(e) = bus.publish(&Topic::value(id).to_string(), payload.clone(), false) {
        warn!(component = %id, error = %e, "Failed to publish value");
    }

    if let Some(class) = class {
        let topic = Topic::ClassValue {
            class: class.to_string(),
            id: id.to_string(),
        };
        if let Err(e) = bus.publish(&topic.to_string(), payload, false) {
            warn!(component = %id, error = %e, "Failed to publish class value");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
