//! Variables
//!
//! A persisted NUMBER a user can set, optionally mirrored onto another
//! component named by `<id>_target`.

use kettle_runtime::{Bundle, Component, ComponentFactory};
use kettle_types::ComponentConfig;

use super::{NamedLink, SoftResource, retarget};
use crate::binder::{BinderError, ResourceKind};

pub struct Variable {
    id: String,
    value: Component,
    target: NamedLink,
}

impl Variable {
    pub fn new(
        factory: &ComponentFactory,
        bundle: Bundle,
        id: &str,
        units: Option<&str>,
        initial: Option<f64>,
    ) -> Result<Self, BinderError> {
        let value = factory.create(
            ComponentConfig::number(id)
                .with_group(id)
                .with_class("variable")
                .with_units(units.unwrap_or_default())
                .persist(true)
                .with_value(initial.unwrap_or(0.0)),
        )?;
        let target = NamedLink::new(factory, bundle, id, "_target")?;
        Ok(Self {
            id: id.to_string(),
            value,
            target,
        })
    }

    pub fn value(&self) -> &Component {
        &self.value
    }
}

impl SoftResource for Variable {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Variable
    }

    fn attach(&mut self, name: &str) -> Result<(), BinderError> {
        self.target.set_name(name);
        self.process(std::time::Instant::now());
        Ok(())
    }

    fn detach(&mut self) -> Result<(), BinderError> {
        self.target.set_name("");
        self.process(std::time::Instant::now());
        Ok(())
    }

    fn assignment(&self) -> Option<String> {
        Some(self.target.name()).filter(|n| !n.is_empty())
    }

    fn process(&mut self, _now: std::time::Instant) {
        if self.target.refresh() {
            retarget(&self.value, self.target.get());
        }
    }
}
