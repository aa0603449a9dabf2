//! Remote component caches
//!
//! One [`RemoteCache`] per remote device address. It watches the device's
//! broker for definitions and values of the ids and classes it has been asked
//! about, and maintains local mirror components keyed `id:address`.
//!
//! Protocol, per requirement:
//! 1. subscribe `component/by_id/<id>/#` (retained definition arrives first)
//! 2. publish `read/+/+/<id>` so the owner republishes the current value
//! 3. definition for an unknown id -> build the mirror, fire waiters
//! 4. value -> write into the mirror without publishing back
//!
//! Local writes to a mirror are forwarded to the owner as `write/<id>`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use kettle_types::{ComponentDefinition, Value};

use crate::bus::{Bus, BusConnector, BusMessage, Subscription, Topic, class_pattern, id_pattern};
use crate::component::{ChangeOrigin, Component};
use crate::error::TransportError;
use crate::resolve::{ComponentSource, Resolution, Waiters, add_waiter, remote_key};

/// Mirror cache for one remote device. Cheap to clone.
#[derive(Clone)]
pub struct RemoteCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    address: String,
    bus: Arc<dyn Bus>,
    /// Remote id -> local mirror
    mirrors: DashMap<String, Component>,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    subscriptions: Vec<Subscription>,
    watched_ids: HashSet<String>,
    watched_classes: HashSet<String>,
    waiters: Waiters,
    class_watchers: HashMap<String, Vec<mpsc::UnboundedSender<Component>>>,
    /// Values that arrived before their definition
    pending_values: HashMap<String, Value>,
}

impl RemoteCache {
    pub fn new(address: &str, bus: Arc<dyn Bus>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                address: address.to_lowercase(),
                bus,
                mirrors: DashMap::new(),
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Number of mirrors built so far
    pub fn len(&self) -> usize {
        self.inner.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.mirrors.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Watching
    // ─────────────────────────────────────────────────────────────────────

    /// Start following an id. Idempotent.
    pub fn watch_id(&self, id: &str) -> Result<(), TransportError> {
        {
            let mut state = self.inner.state.lock();
            if !state.watched_ids.insert(id.to_string()) {
                return Ok(());
            }
            match self.inner.bus.subscribe(&id_pattern(id)) {
                Ok(subscription) => state.subscriptions.push(subscription),
                Err(e) => {
                    state.watched_ids.remove(id);
                    return Err(e);
                }
            }
        }

        let read = Topic::Read {
            group: "+".into(),
            class: "+".into(),
            id: id.to_string(),
        };
        self.inner
            .bus
            .publish(&read.to_string(), serde_json::Value::Null, false)?;

        debug!(address = %self.inner.address, component = %id, "Watching remote component");
        Ok(())
    }

    /// Start following a class. Idempotent.
    pub fn watch_class_topic(&self, class: &str) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock();
        if !state.watched_classes.insert(class.to_string()) {
            return Ok(());
        }
        match self.inner.bus.subscribe(&class_pattern(class)) {
            Ok(subscription) => {
                state.subscriptions.push(subscription);
                debug!(address = %self.inner.address, class, "Watching remote class");
                Ok(())
            }
            Err(e) => {
                state.watched_classes.remove(class);
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Message handling
    // ─────────────────────────────────────────────────────────────────────

    /// Apply every message received since the last drain
    pub fn drain(&self) -> usize {
        let mut handled = 0;

        // Handling can add subscriptions, so loop until quiet
        loop {
            let messages: Vec<BusMessage> = {
                let mut state = self.inner.state.lock();
                state.subscriptions.iter_mut().flat_map(|s| s.drain()).collect()
            };
            if messages.is_empty() {
                return handled;
            }

            handled += messages.len();
            for message in messages {
                self.handle_message(message);
            }
        }
    }

    fn handle_message(&self, message: BusMessage) {
        match message.parsed_topic() {
            Some(Topic::Info { .. }) | Some(Topic::ClassInfo { .. }) => {
                self.handle_definition(message.payload)
            }
            Some(Topic::Value { id }) => self.handle_value(&id, message.payload),
            Some(Topic::ClassValue { id, .. }) => {
                // Class values only drive discovery; the id topic carries the value
                if let Err(e) = self.watch_id(&id) {
                    warn!(address = %self.inner.address, component = %id, error = %e, "Failed to watch");
                }
            }
            _ => debug!(topic = %message.topic, "Ignoring remote message"),
        }
    }

    fn handle_definition(&self, payload: serde_json::Value) {
        if payload.is_null() {
            return;
        }

        let definition: ComponentDefinition = match serde_json::from_value(payload) {
            Ok(d) => d,
            Err(e) => {
                warn!(address = %self.inner.address, error = %e, "Malformed remote definition");
                return;
            }
        };
        let id = definition.id.clone();

        if self.inner.mirrors.contains_key(&id) {
            debug!(address = %self.inner.address, component = %id, "Definition for existing mirror ignored");
            return;
        }

        let key = remote_key(&id, &self.inner.address);
        let mirror = match Component::mirror_of(&definition, key) {
            Ok(m) => m,
            Err(e) => {
                warn!(address = %self.inner.address, component = %id, error = %e, "Cannot mirror remote component");
                return;
            }
        };

        let bus = Arc::clone(&self.inner.bus);
        let remote_id = id.clone();
        mirror.subscribe(move |change| {
            if change.origin == ChangeOrigin::Remote {
                return;
            }
            let topic = Topic::write(&remote_id).to_string();
            if let Err(e) = bus.publish(&topic, serde_json::Value::from(change.value.clone()), false) {
                warn!(component = %remote_id, error = %e, "Failed to forward write");
            }
        });

        // Hold the state lock across insertion so resolve() never misses it
        let (waiters, watchers, pending_value) = {
            let mut state = self.inner.state.lock();
            self.inner.mirrors.insert(id.clone(), mirror.clone());

            let waiters = state.waiters.remove(&id).unwrap_or_default();
            let watchers = match &definition.class {
                Some(class) => {
                    let senders = state.class_watchers.entry(class.clone()).or_default();
                    senders.retain(|tx| !tx.is_closed());
                    senders.clone()
                }
                None => Vec::new(),
            };
            (waiters, watchers, state.pending_values.remove(&id))
        };

        if let Some(value) = pending_value {
            self.write_mirror(&mirror, value);
        }

        info!(address = %self.inner.address, component = %id, "Mirrored remote component");

        for waiter in waiters {
            let _ = waiter.send(mirror.clone());
        }
        for watcher in watchers {
            let _ = watcher.send(mirror.clone());
        }

        // Class discovery may surface ids we are not following yet
        if let Err(e) = self.watch_id(&id) {
            warn!(address = %self.inner.address, component = %id, error = %e, "Failed to watch");
        }
    }

    fn handle_value(&self, id: &str, payload: serde_json::Value) {
        let value = Value::from(payload);
        let mirror = self.inner.mirrors.get(id).map(|m| m.value().clone());
        match mirror {
            Some(mirror) => self.write_mirror(&mirror, value),
            None => {
                self.inner
                    .state
                    .lock()
                    .pending_values
                    .insert(id.to_string(), value);
            }
        }
    }

    fn write_mirror(&self, mirror: &Component, value: Value) {
        if let Err(e) = mirror.write(value, ChangeOrigin::Remote) {
            warn!(address = %self.inner.address, component = %mirror.id(), error = %e, "Remote value rejected");
        }
    }
}

impl ComponentSource for RemoteCache {
    fn lookup(&self, id: &str) -> Option<Component> {
        self.inner.mirrors.get(id).map(|m| m.value().clone())
    }

    fn resolve(&self, id: &str) -> Resolution {
        let rx = {
            let mut state = self.inner.state.lock();
            if let Some(mirror) = self.lookup(id) {
                return Resolution::Ready(mirror);
            }
            add_waiter(&mut state.waiters, id)
        };

        if let Err(e) = self.watch_id(id) {
            warn!(address = %self.inner.address, component = %id, error = %e, "Failed to watch");
        }
        Resolution::Pending(rx)
    }

    fn watch_class(&self, class: &str) -> mpsc::UnboundedReceiver<Component> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.state.lock();
            let mut existing: Vec<Component> = self
                .inner
                .mirrors
                .iter()
                .filter(|m| m.value().class().as_deref() == Some(class))
                .map(|m| m.value().clone())
                .collect();
            existing.sort_by(|a, b| a.id().cmp(b.id()));
            for mirror in existing {
                let _ = tx.send(mirror);
            }
            state.class_watchers.entry(class.to_string()).or_default().push(tx);
        }

        if let Err(e) = self.watch_class_topic(class) {
            warn!(address = %self.inner.address, class, error = %e, "Failed to watch class");
        }
        rx
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote Network
// ─────────────────────────────────────────────────────────────────────────────

/// All remote caches, one per lowercase address, opened lazily
#[derive(Clone)]
pub struct RemoteNetwork {
    connector: Arc<dyn BusConnector>,
    caches: Arc<DashMap<String, RemoteCache>>,
}

impl RemoteNetwork {
    pub fn new(connector: Arc<dyn BusConnector>) -> Self {
        Self {
            connector,
            caches: Arc::new(DashMap::new()),
        }
    }

    /// Cache for an address, connecting on first use
    pub fn cache(&self, address: &str) -> Result<RemoteCache, TransportError> {
        let key = address.trim().to_lowercase();
        if let Some(cache) = self.caches.get(&key) {
            return Ok(cache.value().clone());
        }

        let bus = self.connector.connect(&key)?;
        let cache = self
            .caches
            .entry(key.clone())
            .or_insert_with(|| RemoteCache::new(&key, bus))
            .clone();
        info!(address = %key, "Connected to remote device");
        Ok(cache)
    }

    /// Drain every cache
    pub fn drain(&self) -> usize {
        let caches: Vec<RemoteCache> = self.caches.iter().map(|c| c.value().clone()).collect();
        caches.iter().map(|c| c.drain()).sum()
    }

    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.caches.iter().map(|c| c.key().clone()).collect();
        addresses.sort();
        addresses
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BrokerNetwork, LocalBroker};
    use crate::registry::LocalRegistry;
    use kettle_types::ComponentConfig;

    fn owner(network: &BrokerNetwork, address: &str) -> LocalRegistry {
        let broker: Arc<LocalBroker> = network.broker(address);
        let bus: Arc<dyn Bus> = broker;
        let registry = LocalRegistry::new(bus);
        registry.serve_requests().unwrap();
        registry
    }

    #[tokio::test]
    async fn test_remote_requirement_resolves_and_tracks_values() {
        let network = BrokerNetwork::new();
        let still = owner(&network, "still-1");
        let remotes = RemoteNetwork::new(Arc::new(network.clone()));
        let cache = remotes.cache("Still-1").unwrap();

        let resolution = cache.resolve("boil_temp");
        assert!(matches!(resolution, Resolution::Pending(_)));

        let boil = still
            .create_component(ComponentConfig::number("boil_temp").with_units("C"))
            .unwrap();
        boil.set(98.2).unwrap();
        remotes.drain();

        let mirror = resolution.wait().await.unwrap();
        assert_eq!(mirror.id(), "boil_temp:still-1");
        assert_eq!(mirror.source_id(), "boil_temp");
        assert_eq!(mirror.units(), "C");
        assert_eq!(mirror.read(), Value::Number(98.2));

        boil.set(99.0).unwrap();
        remotes.drain();
        assert_eq!(mirror.read(), Value::Number(99.0));
    }

    #[tokio::test]
    async fn test_existing_component_value_fetched_by_read_request() {
        let network = BrokerNetwork::new();
        let still = owner(&network, "still-1");
        still
            .create_component(ComponentConfig::number("flow").with_value(3.5))
            .unwrap();

        let remotes = RemoteNetwork::new(Arc::new(network.clone()));
        let cache = remotes.cache("still-1").unwrap();
        let resolution = cache.resolve("flow");

        // Owner answers the read request, then the cache applies the value
        remotes.drain();
        still.drain_requests();
        remotes.drain();

        let mirror = resolution.wait().await.unwrap();
        assert_eq!(mirror.read(), Value::Number(3.5));
    }

    #[test]
    fn test_abandoned_remote_waiters_are_pruned() {
        let network = BrokerNetwork::new();
        let remotes = RemoteNetwork::new(Arc::new(network));
        let cache = remotes.cache("still-1").unwrap();

        drop(cache.resolve("ghost"));
        let _flow = cache.resolve("flow");

        let state = cache.inner.state.lock();
        assert!(!state.waiters.contains_key("ghost"));
        assert_eq!(state.waiters["flow"].len(), 1);
    }

    #[test]
    fn test_mirror_writes_forwarded_to_owner() {
        let network = BrokerNetwork::new();
        let still = owner(&network, "still-1");
        let heater = still.create_component(ComponentConfig::boolean("heater")).unwrap();

        let remotes = RemoteNetwork::new(Arc::new(network.clone()));
        let cache = remotes.cache("still-1").unwrap();
        let _ = cache.resolve("heater");
        remotes.drain();

        let mirror = cache.lookup("heater").unwrap();
        mirror.set(true).unwrap();
        still.drain_requests();
        assert_eq!(heater.read(), Value::Bool(true));

        remotes.drain();
        assert_eq!(mirror.read(), Value::Bool(true));
    }

    #[test]
    fn test_class_discovery() {
        let network = BrokerNetwork::new();
        let still = owner(&network, "still-1");
        still
            .create_component(ComponentConfig::number("head").with_class("temperature"))
            .unwrap();

        let remotes = RemoteNetwork::new(Arc::new(network.clone()));
        let cache = remotes.cache("still-1").unwrap();
        let mut rx = cache.watch_class("temperature");
        remotes.drain();

        still
            .create_component(ComponentConfig::number("base").with_class("temperature"))
            .unwrap();
        remotes.drain();

        assert_eq!(rx.try_recv().unwrap().id(), "head:still-1");
        assert_eq!(rx.try_recv().unwrap().id(), "base:still-1");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cache_memoized_per_address() {
        let network = BrokerNetwork::new();
        let remotes = RemoteNetwork::new(Arc::new(network));
        remotes.cache("A").unwrap();
        remotes.cache("a").unwrap();
        assert_eq!(remotes.addresses(), vec!["a".to_string()]);
    }
}
