//! Soft/Hard Resource Binder
//!
//! The [`Binder`] owns one [`NamePool`] per hardware kind and every
//! hardware-backed instance drawing from those pools. Assigning a name to an
//! instance creates the instance's front-facing components (first time only)
//! and mirrors them to the hardware components `<name><suffix>`.
//!
//! Each instance exposes an OPTIONS selector, `<id>_assignment`. Its options
//! are `""` plus the free names plus the current assignment; writing it
//! assigns, writing `""` unassigns. Selector writes are queued and applied by
//! [`Binder::poll`], which also tracks the published name lists and wires
//! hardware components that resolve late.
//!
//! All pool and instance state sits behind one lock. Component writes
//! decided under it (resets, mirrors, selector updates) are staged and applied
//! after it is released, so listeners may call back into the binder.

mod kinds;
mod pool;

pub use kinds::*;
pub use pool::*;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use kettle_runtime::{
    Bundle, ChangeOrigin, Component, ComponentError, ComponentFactory, RegistryError,
};
use kettle_types::{ComponentConfig, Value, can_convert, convert_value};

/// Errors raised by binder operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BinderError {
    #[error("Unknown hardware name '{0}'")]
    UnknownName(String),

    #[error("Hardware name '{name}' is assigned to '{owner}'")]
    NameTaken { name: String, owner: String },

    #[error("Unknown resource instance '{0}'")]
    UnknownInstance(String),

    #[error("Resource instance '{0}' already exists")]
    DuplicateInstance(String),

    #[error("'{0}' resources are not hardware-backed")]
    NotHardware(ResourceKind),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Component(#[from] ComponentError),
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct BinderInner {
    pools: BTreeMap<PoolKind, PoolState>,
    /// In registration order
    instances: Vec<Instance>,
}

#[derive(Default)]
struct PoolState {
    pool: NamePool,
    /// Last list text applied to the pool
    list_text: Option<String>,
}

struct Instance {
    id: String,
    kind: ResourceKind,
    front_units: Option<String>,
    selector: Component,
    requests: mpsc::UnboundedReceiver<String>,
    /// Set while the binder itself writes the selector
    muted: Arc<AtomicBool>,
    assignment: Option<String>,
    /// Created on first assignment, reused afterwards
    channels: Vec<Channel>,
}

struct Channel {
    spec: ChannelSpec,
    front: Component,
    /// Set once the mirrors are in place
    hardware: Option<Component>,
}

impl BinderInner {
    fn index(&self, id: &str) -> Result<usize, BinderError> {
        self.instances
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| BinderError::UnknownInstance(id.to_string()))
    }

    fn instance(&self, id: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.id == id)
    }

    fn pool_mut(&mut self, kind: PoolKind) -> &mut NamePool {
        &mut self.pools.entry(kind).or_default().pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Deferred Effects
// ─────────────────────────────────────────────────────────────────────────────

/// Component writes decided under the binder lock. They run listeners, so
/// they are applied in order once the lock is released.
enum Effect {
    /// Write a channel's safe default while its mirrors are still in place
    Reset { front: Component, value: Value },
    /// Drop `source`'s mirror if it still points at `target`
    Unmirror { source: Component, target: Component },
    /// Mirror a front component and its hardware counterpart, then sync
    Wire {
        owner: String,
        mode: ChannelMode,
        front: Component,
        hardware: Component,
    },
    /// Binder-originated selector write, hidden from the request listener
    Selector {
        owner: String,
        selector: Component,
        muted: Arc<AtomicBool>,
        value: String,
    },
}

type Effects = Vec<Effect>;

impl Effect {
    fn apply(self) {
        match self {
            Effect::Reset { front, value } => {
                if let Err(e) = front.set(value) {
                    warn!(component = %front.id(), error = %e, "Reset failed");
                }
            }
            Effect::Unmirror { source, target } => {
                if source.mirror_target().is_some_and(|t| t.ptr_eq(&target)) {
                    source.clear_mirror();
                }
            }
            Effect::Wire {
                owner,
                mode,
                front,
                hardware,
            } => match Self::wire(mode, &front, &hardware) {
                Ok(()) => {
                    debug!(instance = %owner, front = %front.id(), hardware = %hardware.id(), "Wired channel");
                }
                Err(e) => {
                    warn!(instance = %owner, hardware = %hardware.id(), error = %e, "Cannot wire channel");
                }
            },
            Effect::Selector {
                owner,
                selector,
                muted,
                value,
            } => {
                if selector.read().to_text() == value {
                    return;
                }
                muted.store(true, Ordering::SeqCst);
                let result = selector.set(value);
                muted.store(false, Ordering::SeqCst);
                if let Err(e) = result {
                    warn!(instance = %owner, error = %e, "Selector update rejected");
                }
            }
        }
    }

    /// `Both` pushes the front value down first, `FromHardware` pulls the
    /// hardware value up.
    fn wire(mode: ChannelMode, front: &Component, hardware: &Component) -> Result<(), ComponentError> {
        match mode {
            ChannelMode::Both => {
                front.mirror_to(hardware)?;
                hardware.mirror_to(front)?;
                front.set(front.read())
            }
            ChannelMode::FromHardware => {
                hardware.mirror_to(front)?;
                let value = hardware.read();
                if value.is_unset() {
                    return Ok(());
                }
                let converted = convert_value(&value, &hardware.units(), &front.units())
                    .map_err(|source| ComponentError::Conversion {
                        id: hardware.id().to_string(),
                        source,
                    })?;
                front.write(converted, ChangeOrigin::Mirror)
            }
            ChannelMode::Local => Ok(()),
        }
    }
}

fn apply(effects: Effects) {
    for effect in effects {
        effect.apply();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Binder
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to the device's pools and hardware-backed instances
#[derive(Clone)]
pub struct Binder {
    inner: Arc<Mutex<BinderInner>>,
    factory: ComponentFactory,
    bundle: Bundle,
    /// Device publishing hardware components, `None` for this one
    hardware: Option<String>,
}

impl Binder {
    pub fn new(factory: ComponentFactory, bundle: Bundle, hardware: Option<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BinderInner::default())),
            factory,
            bundle,
            hardware,
        }
    }

    pub fn factory(&self) -> &ComponentFactory {
        &self.factory
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    /// Reference to a hardware component
    pub fn hardware_ref(&self, name: &str, suffix: &str) -> String {
        match &self.hardware {
            Some(address) => format!("kettle://{}/{}{}", address, name, suffix),
            None => format!("{}{}", name, suffix),
        }
    }

    /// Register a hardware-backed instance and create its selector.
    ///
    /// A value restored into the selector from settings is queued as an
    /// assignment request for the next [`poll`](Self::poll).
    pub fn register(
        &self,
        id: &str,
        kind: ResourceKind,
        front_units: Option<&str>,
    ) -> Result<Component, BinderError> {
        let pool = kind.pool().ok_or(BinderError::NotHardware(kind))?;

        let mut inner = self.inner.lock();
        if inner.instance(id).is_some() {
            return Err(BinderError::DuplicateInstance(id.to_string()));
        }

        self.bundle
            .require(&self.hardware_ref(pool.list_component(), ""))?;
        inner.pools.entry(pool).or_default();

        // Empty options accept any restored value; real options follow below
        let selector = self.factory.create(
            ComponentConfig::options(format!("{}_assignment", id), &[])
                .with_name(format!("{} assignment", id))
                .with_group(id)
                .with_class("assignment")
                .persist(true)
                .with_value(""),
        )?;

        let (tx, rx) = mpsc::unbounded_channel();
        let restored = selector.read().to_text();
        if !restored.is_empty() {
            let _ = tx.send(restored);
        }
        let muted = Arc::new(AtomicBool::new(false));
        let listener_muted = Arc::clone(&muted);
        selector.subscribe(move |change| {
            if !listener_muted.load(Ordering::SeqCst) {
                let _ = tx.send(change.value.to_text());
            }
        });

        inner.instances.push(Instance {
            id: id.to_string(),
            kind,
            front_units: front_units.map(String::from),
            selector: selector.clone(),
            requests: rx,
            muted,
            assignment: None,
            channels: Vec::new(),
        });
        self.refresh_selectors(&mut inner, pool);

        debug!(instance = %id, kind = %kind, "Registered resource instance");
        Ok(selector)
    }

    /// Bind `name` to instance `id`. Assigning `""` unassigns.
    pub fn assign(&self, id: &str, name: &str) -> Result<(), BinderError> {
        let mut effects = Effects::new();
        let result = {
            let mut inner = self.inner.lock();
            self.assign_locked(&mut inner, id, name, &mut effects)
        };
        apply(effects);
        result
    }

    /// Reset the instance's front components and release its name
    pub fn unassign(&self, id: &str) -> Result<(), BinderError> {
        let mut effects = Effects::new();
        let result = {
            let mut inner = self.inner.lock();
            self.unassign_locked(&mut inner, id, &mut effects)
        };
        apply(effects);
        result
    }

    /// Apply list updates and selector requests, then wire any hardware
    /// components resolved since the last poll
    pub fn poll(&self) {
        self.bundle.poll();

        let mut effects = Effects::new();
        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            self.sync_pools(inner, &mut effects);
            self.apply_requests(inner, &mut effects);
            self.wire_pending(inner, &mut effects);
        }
        apply(effects);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn assignment(&self, id: &str) -> Option<String> {
        self.inner
            .lock()
            .instance(id)
            .and_then(|i| i.assignment.clone())
    }

    /// Free names in a pool, sorted
    pub fn options(&self, pool: PoolKind) -> Vec<String> {
        self.inner
            .lock()
            .pools
            .get(&pool)
            .map(|p| p.pool.options())
            .unwrap_or_default()
    }

    /// Assigned names in a pool, sorted
    pub fn assigned(&self, pool: PoolKind) -> Vec<String> {
        self.inner
            .lock()
            .pools
            .get(&pool)
            .map(|p| p.pool.assigned())
            .unwrap_or_default()
    }

    pub fn selector(&self, id: &str) -> Option<Component> {
        self.inner.lock().instance(id).map(|i| i.selector.clone())
    }

    /// Front-facing component `<id><suffix>`, once created
    pub fn front(&self, id: &str, suffix: &str) -> Option<Component> {
        self.inner.lock().instance(id).and_then(|i| {
            i.channels
                .iter()
                .find(|c| c.spec.front == suffix)
                .map(|c| c.front.clone())
        })
    }

    /// Whether every hardware channel of `id` is mirrored
    pub fn is_wired(&self, id: &str) -> bool {
        self.inner.lock().instance(id).is_some_and(|i| {
            i.assignment.is_some()
                && i.channels
                    .iter()
                    .filter(|c| c.spec.hardware.is_some())
                    .all(|c| c.hardware.is_some())
        })
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .instances
            .iter()
            .map(|i| i.id.clone())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Assignment
    // ─────────────────────────────────────────────────────────────────────

    fn assign_locked(
        &self,
        inner: &mut BinderInner,
        id: &str,
        name: &str,
        effects: &mut Effects,
    ) -> Result<(), BinderError> {
        if name.is_empty() {
            return self.unassign_locked(inner, id, effects);
        }

        let index = inner.index(id)?;
        let kind = inner.instances[index].kind;
        let pool = kind.pool().ok_or(BinderError::NotHardware(kind))?;
        if inner.instances[index].assignment.as_deref() == Some(name) {
            return Ok(());
        }

        inner.pool_mut(pool).claim(name, id)?;
        if inner.instances[index].assignment.is_some() {
            self.unassign_locked(inner, id, effects)?;
        }

        if let Err(e) = self.ensure_fronts(&mut inner.instances[index]) {
            inner.pool_mut(pool).release(name);
            self.refresh_selectors(inner, pool);
            return Err(e);
        }

        let instance = &mut inner.instances[index];
        instance.assignment = Some(name.to_string());
        for channel in &mut instance.channels {
            let Some(suffix) = channel.spec.hardware else {
                continue;
            };
            let reference = self.hardware_ref(name, suffix);
            if let Err(e) = self.bundle.require(&reference) {
                warn!(instance = %id, hardware = %reference, error = %e, "Cannot resolve hardware");
                continue;
            }
            if let Some(hardware) = self.bundle.get(&reference) {
                Self::stage_wire(&instance.id, channel, hardware, effects);
            }
        }

        self.refresh_selectors(inner, pool);
        Self::stage_selector(&inner.instances[index], name, effects);

        info!(instance = %id, name = %name, "Assigned hardware");
        Ok(())
    }

    fn unassign_locked(
        &self,
        inner: &mut BinderInner,
        id: &str,
        effects: &mut Effects,
    ) -> Result<(), BinderError> {
        let index = inner.index(id)?;
        let instance = &mut inner.instances[index];
        let Some(name) = instance.assignment.take() else {
            Self::stage_selector(instance, "", effects);
            return Ok(());
        };

        // Reset first so the safe value still reaches the hardware
        for channel in &mut instance.channels {
            if channel.spec.reset {
                effects.push(Effect::Reset {
                    front: channel.front.clone(),
                    value: channel.spec.component_type.safe_default(),
                });
            }
            if let Some(hardware) = channel.hardware.take() {
                effects.push(Effect::Unmirror {
                    source: channel.front.clone(),
                    target: hardware.clone(),
                });
                effects.push(Effect::Unmirror {
                    source: hardware,
                    target: channel.front.clone(),
                });
            }
        }

        let kind = instance.kind;
        if let Some(pool) = kind.pool() {
            inner.pool_mut(pool).release(&name);
            self.refresh_selectors(inner, pool);
        }
        Self::stage_selector(&inner.instances[index], "", effects);

        info!(instance = %id, name = %name, "Unassigned hardware");
        Ok(())
    }

    fn ensure_fronts(&self, instance: &mut Instance) -> Result<(), BinderError> {
        if !instance.channels.is_empty() {
            return Ok(());
        }

        let mut channels = Vec::new();
        for spec in instance.kind.channels() {
            let units = match &instance.front_units {
                Some(units) if !spec.units.is_empty() && can_convert(spec.units, units) => {
                    units.clone()
                }
                _ => spec.units.to_string(),
            };
            let config = ComponentConfig::new(format!("{}{}", instance.id, spec.front))
                .with_type(spec.component_type)
                .with_units(units)
                .with_group(instance.id.clone())
                .with_class(instance.kind.class())
                .read_only(spec.mode == ChannelMode::FromHardware)
                .persist(spec.persist)
                .with_value(spec.component_type.safe_default());
            channels.push(Channel {
                spec: *spec,
                front: self.factory.create(config)?,
                hardware: None,
            });
        }

        instance.channels = channels;
        Ok(())
    }

    /// Claim `hardware` for a channel and stage its mirrors
    fn stage_wire(owner: &str, channel: &mut Channel, hardware: Component, effects: &mut Effects) {
        if channel.spec.mode == ChannelMode::Local {
            return;
        }
        let (front_units, hardware_units) = (channel.front.units(), hardware.units());
        if !can_convert(&front_units, &hardware_units) {
            warn!(
                instance = %owner,
                hardware = %hardware.id(),
                from = %hardware_units,
                to = %front_units,
                "Cannot wire channel"
            );
            return;
        }

        channel.hardware = Some(hardware.clone());
        effects.push(Effect::Wire {
            owner: owner.to_string(),
            mode: channel.spec.mode,
            front: channel.front.clone(),
            hardware,
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Polling
    // ─────────────────────────────────────────────────────────────────────

    fn sync_pools(&self, inner: &mut BinderInner, effects: &mut Effects) {
        let kinds: Vec<PoolKind> = inner.pools.keys().copied().collect();
        for kind in kinds {
            let Some(list) = self.bundle.get(&self.hardware_ref(kind.list_component(), "")) else {
                continue;
            };
            let value = list.read();
            if value.is_unset() {
                continue;
            }
            let text = value.to_text();

            let state = inner.pools.entry(kind).or_default();
            if state.list_text.as_deref() == Some(text.as_str()) {
                continue;
            }
            let evicted = state.pool.sync(parse_name_list(&text));
            state.list_text = Some(text);
            debug!(pool = %kind, options = ?state.pool.options(), "Pool updated");

            for (name, owner) in evicted {
                warn!(instance = %owner, name = %name, "Hardware name withdrawn");
                if let Err(e) = self.unassign_locked(inner, &owner, effects) {
                    warn!(instance = %owner, error = %e, "Unassign failed");
                }
            }
            self.refresh_selectors(inner, kind);
        }
    }

    fn apply_requests(&self, inner: &mut BinderInner, effects: &mut Effects) {
        let mut requests = Vec::new();
        for instance in inner.instances.iter_mut() {
            while let Ok(value) = instance.requests.try_recv() {
                requests.push((instance.id.clone(), value));
            }
        }

        for (id, value) in requests {
            let current = inner
                .instance(&id)
                .and_then(|i| i.assignment.clone())
                .unwrap_or_default();
            if current == value {
                continue;
            }

            if let Err(e) = self.assign_locked(inner, &id, &value, effects) {
                warn!(instance = %id, name = %value, error = %e, "Assignment rejected");
                if let Some(instance) = inner.instance(&id) {
                    Self::stage_selector(instance, &current, effects);
                }
            }
        }
    }

    fn wire_pending(&self, inner: &mut BinderInner, effects: &mut Effects) {
        for instance in inner.instances.iter_mut() {
            let Some(name) = instance.assignment.clone() else {
                continue;
            };
            for channel in instance.channels.iter_mut() {
                let Some(suffix) = channel.spec.hardware else {
                    continue;
                };
                if channel.hardware.is_some() {
                    continue;
                }
                if let Some(hardware) = self.bundle.get(&self.hardware_ref(&name, suffix)) {
                    Self::stage_wire(&instance.id, channel, hardware, effects);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selectors
    // ─────────────────────────────────────────────────────────────────────

    fn refresh_selectors(&self, inner: &mut BinderInner, pool: PoolKind) {
        let free = inner
            .pools
            .get(&pool)
            .map(|p| p.pool.options())
            .unwrap_or_default();

        for instance in inner.instances.iter().filter(|i| i.kind.pool() == Some(pool)) {
            let mut names: BTreeSet<String> = free.iter().cloned().collect();
            if let Some(current) = &instance.assignment {
                names.insert(current.clone());
            }
            let mut options = vec![String::new()];
            options.extend(names);
            instance.selector.set_options(&options);
        }
    }

    fn stage_selector(instance: &Instance, value: &str, effects: &mut Effects) {
        effects.push(Effect::Selector {
            owner: instance.id.clone(),
            selector: instance.selector.clone(),
            muted: Arc::clone(&instance.muted),
            value: value.to_string(),
        });
    }
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binder")
            .field("hardware", &self.hardware)
            .field("instances", &self.instance_ids())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use kettle_runtime::{BrokerNetwork, MemoryStore, Runtime};
    use kettle_types::Value;

    struct Rig {
        runtime: Runtime,
        binder: Binder,
    }

    fn rig() -> Rig {
        let network = Arc::new(BrokerNetwork::new());
        let runtime = Runtime::new("still-1", network).unwrap();
        let registry = runtime.registry();
        for name in ["RELAY_1A_0", "RELAY_1A_1"] {
            registry
                .create_component(ComponentConfig::boolean(name).with_value(false))
                .unwrap();
        }
        registry
            .create_component(ComponentConfig::text("relay_names").with_value("RELAY_1A_0 RELAY_1A_1"))
            .unwrap();

        let factory = ComponentFactory::new(registry.clone(), Arc::new(MemoryStore::new()));
        let binder = Binder::new(factory, Bundle::new(runtime.clone()), None);
        Rig { runtime, binder }
    }

    fn hardware(rig: &Rig, id: &str) -> Component {
        let bundle = Bundle::new(rig.runtime.clone());
        bundle.require(id).unwrap();
        bundle.get(id).unwrap()
    }

    #[test]
    fn test_relay_assign_enable_unassign() {
        let rig = rig();
        let binder = &rig.binder;
        binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.poll();
        assert_eq!(binder.options(PoolKind::Relay), vec!["RELAY_1A_0", "RELAY_1A_1"]);

        binder.assign("heater", "RELAY_1A_0").unwrap();
        assert!(binder.is_wired("heater"));
        assert_eq!(binder.options(PoolKind::Relay), vec!["RELAY_1A_1"]);
        assert_eq!(binder.assigned(PoolKind::Relay), vec!["RELAY_1A_0"]);

        let enable = binder.front("heater", "_enable").unwrap();
        let relay = hardware(&rig, "RELAY_1A_0");
        enable.set(true).unwrap();
        assert_eq!(relay.read(), Value::Bool(true));

        binder.unassign("heater").unwrap();
        assert_eq!(enable.read(), Value::Bool(false));
        assert_eq!(relay.read(), Value::Bool(false));
        assert_eq!(binder.options(PoolKind::Relay), vec!["RELAY_1A_0", "RELAY_1A_1"]);
        assert!(binder.assignment("heater").is_none());

        // Mirrors are gone
        enable.set(true).unwrap();
        assert_eq!(relay.read(), Value::Bool(false));
    }

    #[test]
    fn test_listeners_may_query_binder_during_unassign() {
        let rig = rig();
        let binder = rig.binder.clone();
        let selector = binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.poll();
        binder.assign("heater", "RELAY_1A_0").unwrap();
        let enable = binder.front("heater", "_enable").unwrap();
        enable.set(true).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer = binder.clone();
        let log = Arc::clone(&seen);
        enable.subscribe(move |change| {
            log.lock().push((change.value.clone(), observer.assignment("heater")));
        });
        let observer = binder.clone();
        let options = Arc::new(Mutex::new(Vec::new()));
        let free = Arc::clone(&options);
        selector.subscribe(move |_| {
            *free.lock() = observer.options(PoolKind::Relay);
        });

        binder.unassign("heater").unwrap();

        assert_eq!(*seen.lock(), vec![(Value::Bool(false), None)]);
        assert_eq!(*options.lock(), vec!["RELAY_1A_0", "RELAY_1A_1"]);
        assert_eq!(hardware(&rig, "RELAY_1A_0").read(), Value::Bool(false));
    }

    #[test]
    fn test_reassign_from_selector_keeps_new_name() {
        let rig = rig();
        let binder = &rig.binder;
        let selector = binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.poll();
        binder.assign("heater", "RELAY_1A_0").unwrap();

        selector.set("RELAY_1A_1").unwrap();
        binder.poll();
        assert_eq!(binder.assignment("heater").as_deref(), Some("RELAY_1A_1"));
        assert_eq!(selector.read(), Value::Text("RELAY_1A_1".into()));
        assert!(binder.is_wired("heater"));
    }

    #[test]
    fn test_hardware_drives_front() {
        let rig = rig();
        let binder = &rig.binder;
        binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.poll();
        binder.assign("heater", "RELAY_1A_1").unwrap();

        hardware(&rig, "RELAY_1A_1").set(true).unwrap();
        let enable = binder.front("heater", "_enable").unwrap();
        assert_eq!(enable.read(), Value::Bool(true));
    }

    #[test]
    fn test_selector_options_and_requests() {
        let rig = rig();
        let binder = &rig.binder;
        let selector = binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.register("pump", ResourceKind::Relay, None).unwrap();
        binder.poll();
        assert_eq!(selector.options(), vec!["", "RELAY_1A_0", "RELAY_1A_1"]);

        selector.set("RELAY_1A_1").unwrap();
        binder.poll();
        assert_eq!(binder.assignment("heater").as_deref(), Some("RELAY_1A_1"));
        assert_eq!(selector.options(), vec!["", "RELAY_1A_0", "RELAY_1A_1"]);

        let pump = binder.selector("pump").unwrap();
        assert_eq!(pump.options(), vec!["", "RELAY_1A_0"]);
        assert!(pump.set("RELAY_1A_1").is_err());

        selector.set("").unwrap();
        binder.poll();
        assert!(binder.assignment("heater").is_none());
        assert_eq!(pump.options(), vec!["", "RELAY_1A_0", "RELAY_1A_1"]);
    }

    #[test]
    fn test_taken_name_rejected() {
        let rig = rig();
        let binder = &rig.binder;
        binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.register("pump", ResourceKind::Relay, None).unwrap();
        binder.poll();

        binder.assign("heater", "RELAY_1A_0").unwrap();
        assert!(matches!(
            binder.assign("pump", "RELAY_1A_0"),
            Err(BinderError::NameTaken { .. })
        ));
        assert!(matches!(
            binder.assign("pump", "RELAY_9Z_9"),
            Err(BinderError::UnknownName(_))
        ));
        assert!(matches!(
            binder.assign("nobody", "RELAY_1A_1"),
            Err(BinderError::UnknownInstance(_))
        ));
    }

    #[test]
    fn test_reassign_releases_previous_name() {
        let rig = rig();
        let binder = &rig.binder;
        binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.poll();

        binder.assign("heater", "RELAY_1A_0").unwrap();
        binder.front("heater", "_enable").unwrap().set(true).unwrap();
        binder.assign("heater", "RELAY_1A_1").unwrap();

        assert_eq!(binder.options(PoolKind::Relay), vec!["RELAY_1A_0"]);
        assert_eq!(hardware(&rig, "RELAY_1A_0").read(), Value::Bool(false));
        assert_eq!(hardware(&rig, "RELAY_1A_1").read(), Value::Bool(false));
    }

    #[test]
    fn test_withdrawn_name_forces_unassign() {
        let rig = rig();
        let binder = &rig.binder;
        binder.register("heater", ResourceKind::Relay, None).unwrap();
        binder.poll();
        binder.assign("heater", "RELAY_1A_0").unwrap();

        hardware(&rig, "relay_names").set("RELAY_1A_1, RELAY_1A_2").unwrap();
        binder.poll();

        assert!(binder.assignment("heater").is_none());
        assert_eq!(binder.options(PoolKind::Relay), vec!["RELAY_1A_1", "RELAY_1A_2"]);
        assert!(binder.assigned(PoolKind::Relay).is_empty());
        assert_eq!(binder.selector("heater").unwrap().read(), Value::Text(String::new()));
    }

    #[test]
    fn test_late_hardware_is_wired_on_poll() {
        let rig = rig();
        let binder = &rig.binder;
        binder.register("probe", ResourceKind::Temperature, Some("F")).unwrap();
        binder.assign("probe", "PROBE_0").unwrap();
        assert!(!binder.is_wired("probe"));

        let probe = rig
            .runtime
            .registry()
            .create_component(
                ComponentConfig::number("PROBE_0")
                    .with_units("C")
                    .with_value(100.0),
            )
            .unwrap();
        binder.poll();
        assert!(binder.is_wired("probe"));

        let front = binder.front("probe", "_temperature").unwrap();
        assert_eq!(front.units(), "F");
        assert_eq!(front.read(), Value::Number(212.0));

        probe.set(0.0).unwrap();
        assert_eq!(front.read(), Value::Number(32.0));
    }

    #[test]
    fn test_register_rejects_soft_kinds_and_duplicates() {
        let rig = rig();
        let binder = &rig.binder;
        assert!(matches!(
            binder.register("loop", ResourceKind::Pid, None),
            Err(BinderError::NotHardware(ResourceKind::Pid))
        ));
        binder.register("heater", ResourceKind::Relay, None).unwrap();
        assert!(matches!(
            binder.register("heater", ResourceKind::Relay, None),
            Err(BinderError::DuplicateInstance(_))
        ));
    }
}
