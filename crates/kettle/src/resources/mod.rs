//! Soft Resources
//!
//! A soft resource is a logical control abstraction that can be bound to
//! hardware (or to another component) at runtime. Every kind implements
//! [`SoftResource`]; hardware-backed kinds delegate to the [`Binder`], the
//! rest bind to a component by name through a [`NamedLink`].
//!
//! [`Binder`]: crate::binder::Binder

mod duty;
mod function;
mod hardware;
mod pid;
mod variable;

pub use duty::*;
pub use function::*;
pub use hardware::*;
pub use pid::*;
pub use variable::*;

use std::time::Instant;

use tracing::warn;

use kettle_runtime::{Bundle, Component, ComponentFactory, RegistryError};
use kettle_types::ComponentConfig;

use crate::binder::{BinderError, ResourceKind};

// ─────────────────────────────────────────────────────────────────────────────
// Soft Resource Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Common surface of every soft resource kind
pub trait SoftResource: Send {
    /// Instance id, the prefix of every component it owns
    fn id(&self) -> &str;

    fn kind(&self) -> ResourceKind;

    /// Bind to a hardware name (hardware kinds) or a component reference
    fn attach(&mut self, name: &str) -> Result<(), BinderError>;

    /// Drop the binding and return to a safe state
    fn detach(&mut self) -> Result<(), BinderError>;

    /// Current binding, if any
    fn assignment(&self) -> Option<String>;

    /// Periodic work, called once per scheduler tick
    fn process(&mut self, _now: Instant) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// Named Links
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted TEXT component holding a component reference, re-resolved
/// through a bundle whenever its value changes
pub struct NamedLink {
    name: Component,
    bundle: Bundle,
    current: String,
    resolved: Option<Component>,
}

impl NamedLink {
    pub fn new(
        factory: &ComponentFactory,
        bundle: Bundle,
        owner: &str,
        suffix: &str,
    ) -> Result<Self, RegistryError> {
        let name = factory.create(
            ComponentConfig::text(format!("{}{}", owner, suffix))
                .with_group(owner)
                .persist(true)
                .with_value(""),
        )?;
        Ok(Self {
            name,
            bundle,
            current: String::new(),
            resolved: None,
        })
    }

    /// The TEXT component holding the reference
    pub fn component(&self) -> &Component {
        &self.name
    }

    pub fn name(&self) -> String {
        self.name.read().to_text()
    }

    pub fn set_name(&self, name: &str) {
        if let Err(e) = self.name.set(name) {
            warn!(component = %self.name.id(), error = %e, "Cannot store reference");
        }
    }

    /// Resolved component, if any
    pub fn get(&self) -> Option<&Component> {
        self.resolved.as_ref()
    }

    /// Pick up name changes and late resolutions. Returns true when the
    /// resolved component changed.
    pub fn refresh(&mut self) -> bool {
        let name = self.name();
        let mut changed = false;

        if name != self.current {
            self.current = name.clone();
            changed = self.resolved.take().is_some();
            if !name.is_empty() {
                if let Err(e) = self.bundle.require(&name) {
                    warn!(component = %self.name.id(), reference = %name, error = %e, "Bad reference");
                }
            }
        }

        if self.resolved.is_none() && !self.current.is_empty() {
            self.resolved = self.bundle.get(&self.current);
            changed |= self.resolved.is_some();
        }
        changed
    }
}

/// Point `source`'s mirror at `target` (or nowhere) and push its value
pub fn retarget(source: &Component, target: Option<&Component>) {
    source.clear_mirror();
    let Some(target) = target else {
        return;
    };

    if let Err(e) = source.mirror_to(target) {
        warn!(component = %source.id(), target = %target.id(), error = %e, "Cannot mirror");
        return;
    }
    let value = source.read();
    if !value.is_unset() {
        if let Err(e) = source.set(value) {
            warn!(component = %source.id(), error = %e, "Cannot push value");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    use kettle_runtime::{BrokerNetwork, MemoryStore, Runtime};
    use kettle_types::Value;

    pub(crate) fn runtime() -> (Runtime, ComponentFactory, Bundle) {
        let network = Arc::new(BrokerNetwork::new());
        let runtime = Runtime::new("still-1", network).unwrap();
        let factory = ComponentFactory::new(runtime.registry().clone(), Arc::new(MemoryStore::new()));
        let bundle = Bundle::new(runtime.clone());
        (runtime, factory, bundle)
    }

    #[test]
    fn test_named_link_follows_name_changes() {
        let (runtime, factory, bundle) = runtime();
        let registry = runtime.registry();
        registry.create_component(ComponentConfig::number("a")).unwrap();

        let mut link = NamedLink::new(&factory, bundle, "loop", "_target").unwrap();
        assert!(!link.refresh());

        link.set_name("a");
        assert!(link.refresh());
        assert_eq!(link.get().unwrap().id(), "a");
        assert!(!link.refresh());

        link.set_name("b");
        assert!(link.refresh());
        assert!(link.get().is_none());

        registry.create_component(ComponentConfig::number("b")).unwrap();
        link.bundle.poll();
        assert!(link.refresh());
        assert_eq!(link.get().unwrap().id(), "b");
    }

    #[test]
    fn test_retarget_moves_mirror() {
        let (runtime, _, _) = runtime();
        let registry = runtime.registry();
        let source = registry
            .create_component(ComponentConfig::number("src").with_value(4.0))
            .unwrap();
        let a = registry.create_component(ComponentConfig::number("a")).unwrap();
        let b = registry.create_component(ComponentConfig::number("b")).unwrap();

        retarget(&source, Some(&a));
        assert_eq!(a.read(), Value::Number(4.0));

        retarget(&source, Some(&b));
        source.set(5.0).unwrap();
        assert_eq!(a.read(), Value::Number(4.0));
        assert_eq!(b.read(), Value::Number(5.0));

        retarget(&source, None);
        assert!(source.mirror_target().is_none());
    }
}
