//! Component cells
//!
//! A [`Component`] is a cheap, cloneable handle to one typed, observable value
//! cell. Writes are coerced by the component's declared type; every accepted
//! write bumps `updated`, notifies listeners once, and forwards the value to
//! the mirror target (if any).
//!
//! Locks are never held while listeners run or while a mirror target is
//! written, so listeners may freely read or write other components.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use kettle_types::{
    ComponentConfig, ComponentDefinition, ComponentType, ConversionError, Info, Value,
    can_convert, convert_value, options, set_options,
};

use crate::error::{ComponentError, ComponentResult};

/// Identifier returned by [`Component::subscribe`]
pub type ListenerId = u64;

/// Callback invoked on every accepted write
pub type Listener = Arc<dyn Fn(&ValueChange) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Value Change
// ─────────────────────────────────────────────────────────────────────────────

/// Where a write came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Local process logic or a bus write request
    Local,
    /// A value message from the owning remote device
    Remote,
    /// Propagated from another component's mirror link
    Mirror,
}

/// Notification delivered to listeners after an accepted write
#[derive(Debug, Clone)]
pub struct ValueChange {
    /// Registry key of the written component
    pub id: String,
    pub value: Value,
    pub previous: Value,
    pub updated: DateTime<Utc>,
    pub origin: ChangeOrigin,
}

// ─────────────────────────────────────────────────────────────────────────────
// Component
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a typed, observable value cell
#[derive(Clone)]
pub struct Component {
    inner: Arc<ComponentInner>,
}

struct ComponentInner {
    /// Registry key: the id for local components, `id:address` for mirrors
    key: String,
    definition: RwLock<ComponentDefinition>,
    state: Mutex<ValueState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    mirror: Mutex<Option<MirrorLink>>,
}

struct ValueState {
    value: Value,
    updated: DateTime<Utc>,
}

struct MirrorLink {
    target: Weak<ComponentInner>,
    from_units: String,
    to_units: String,
}

impl Component {
    /// Validate `config` and build a component from it
    pub fn create(config: ComponentConfig) -> Result<Self, ComponentError> {
        let id = config.id.clone();
        let config = config
            .validate()
            .map_err(|source| ComponentError::Validation { id, source })?;
        let key = config.id.clone();
        Ok(Self::build(key, &config))
    }

    /// Build a local mirror of a remote component, keyed by `key`
    pub(crate) fn mirror_of(
        definition: &ComponentDefinition,
        key: String,
    ) -> Result<Self, ComponentError> {
        let config = definition
            .to_mirror_config(definition.id.clone())
            .validate()
            .map_err(|source| ComponentError::Validation {
                id: definition.id.clone(),
                source,
            })?;
        Ok(Self::build(key, &config))
    }

    fn build(key: String, config: &ComponentConfig) -> Self {
        Self {
            inner: Arc::new(ComponentInner {
                key,
                definition: RwLock::new(ComponentDefinition::from(config)),
                state: Mutex::new(ValueState {
                    value: config.value.clone(),
                    updated: Utc::now(),
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                mirror: Mutex::new(None),
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────

    /// Registry key (id for local components, `id:address` for mirrors)
    pub fn id(&self) -> &str {
        &self.inner.key
    }

    /// Id as known by the owning device
    pub fn source_id(&self) -> String {
        self.inner.definition.read().id.clone()
    }

    /// Snapshot of the metadata
    pub fn definition(&self) -> ComponentDefinition {
        self.inner.definition.read().clone()
    }

    pub fn name(&self) -> String {
        self.inner.definition.read().name.clone()
    }

    pub fn class(&self) -> Option<String> {
        self.inner.definition.read().class.clone()
    }

    pub fn group(&self) -> String {
        self.inner.definition.read().group.clone()
    }

    pub fn component_type(&self) -> ComponentType {
        self.inner.definition.read().component_type
    }

    pub fn units(&self) -> String {
        self.inner.definition.read().units.clone()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.definition.read().read_only
    }

    pub fn is_persisted(&self) -> bool {
        self.inner.definition.read().persist
    }

    pub fn info(&self) -> Info {
        self.inner.definition.read().info.clone()
    }

    /// Current `info.options`
    pub fn options(&self) -> Vec<String> {
        options(&self.inner.definition.read().info)
    }

    /// Replace `info.options`. Does not revalidate the current value.
    pub fn set_options(&self, opts: &[String]) {
        set_options(&mut self.inner.definition.write().info, opts);
    }

    /// Check whether two handles refer to the same cell
    pub fn ptr_eq(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Value
    // ─────────────────────────────────────────────────────────────────────

    /// Read the current value. Never blocks on I/O.
    pub fn read(&self) -> Value {
        self.inner.state.lock().value.clone()
    }

    /// Timestamp of the last accepted write
    pub fn updated(&self) -> DateTime<Utc> {
        self.inner.state.lock().updated
    }

    /// Write a value from local logic
    pub fn set(&self, value: impl Into<Value>) -> ComponentResult<()> {
        self.write(value.into(), ChangeOrigin::Local)
    }

    /// Write a value, tagging where it came from.
    ///
    /// A failed coercion leaves value and `updated` untouched.
    pub fn write(&self, value: Value, origin: ChangeOrigin) -> ComponentResult<()> {
        self.write_along(value, origin, &[])
    }

    /// Write carrying the mirror chain that led here. A value that comes
    /// back around to a component already on the chain is an echo and is
    /// dropped; writes from anywhere else are always accepted.
    fn write_along(
        &self,
        value: Value,
        origin: ChangeOrigin,
        chain: &[*const ComponentInner],
    ) -> ComponentResult<()> {
        let this = Arc::as_ptr(&self.inner);
        if chain.contains(&this) {
            tracing::trace!(component = %self.inner.key, "Dropping mirror echo");
            return Ok(());
        }

        let coerced = {
            let definition = self.inner.definition.read();
            definition
                .component_type
                .coerce(value, &definition.info)
                .map_err(|source| ComponentError::Validation {
                    id: self.inner.key.clone(),
                    source,
                })?
        };

        let change = {
            let mut state = self.inner.state.lock();
            let now = Utc::now();
            let updated = if now > state.updated { now } else { state.updated };
            let previous = std::mem::replace(&mut state.value, coerced.clone());
            state.updated = updated;
            ValueChange {
                id: self.inner.key.clone(),
                value: coerced,
                previous,
                updated,
                origin,
            }
        };

        self.notify(&change);

        let mut chain = chain.to_vec();
        chain.push(this);
        self.propagate(&change.value, &chain);

        Ok(())
    }

    fn notify(&self, change: &ValueChange) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(change);
        }
    }

    fn propagate(&self, value: &Value, chain: &[*const ComponentInner]) {
        let link = {
            let mirror = self.inner.mirror.lock();
            mirror.as_ref().and_then(|m| {
                m.target
                    .upgrade()
                    .map(|t| (t, m.from_units.clone(), m.to_units.clone()))
            })
        };

        let Some((target, from, to)) = link else {
            return;
        };
        let target = Component { inner: target };

        let converted = match convert_value(value, &from, &to) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(component = %self.inner.key, error = %e, "Mirror conversion failed");
                return;
            }
        };

        if let Err(e) = target.write_along(converted, ChangeOrigin::Mirror, chain) {
            tracing::warn!(
                component = %self.inner.key,
                target = %target.id(),
                error = %e,
                "Mirror write rejected"
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Listeners & Mirrors
    // ─────────────────────────────────────────────────────────────────────

    /// Register a listener invoked once per accepted write
    pub fn subscribe(&self, listener: impl Fn(&ValueChange) + Send + Sync + 'static) -> ListenerId {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Forward every accepted write to `target`, converting from this
    /// component's units to the target's. Replaces any existing mirror.
    pub fn mirror_to(&self, target: &Component) -> ComponentResult<()> {
        let from = self.units();
        let to = target.units();
        if !can_convert(&from, &to) {
            return Err(ComponentError::Conversion {
                id: self.inner.key.clone(),
                source: ConversionError { from, to },
            });
        }

        *self.inner.mirror.lock() = Some(MirrorLink {
            target: Arc::downgrade(&target.inner),
            from_units: from,
            to_units: to,
        });
        Ok(())
    }

    /// Tear down the mirror link
    pub fn clear_mirror(&self) {
        *self.inner.mirror.lock() = None;
    }

    /// Current mirror target, if still alive
    pub fn mirror_target(&self) -> Option<Component> {
        self.inner
            .mirror
            .lock()
            .as_ref()
            .and_then(|m| m.target.upgrade())
            .map(|inner| Component { inner })
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.inner.key)
            .field("type", &self.component_type())
            .field("value", &self.read())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
