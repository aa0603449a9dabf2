//! Hardware-backed soft resources
//!
//! Relays, DACs, steppers, bit I/O and sensors all share one implementation:
//! channel wiring lives in the [`Binder`], and duty-cycle relays additionally
//! own a [`DutyCycle`] ticker driven from [`SoftResource::process`].

use std::time::Instant;

use tracing::{debug, warn};

use kettle_runtime::Component;

use super::{DutyCycle, SoftResource, period_from_secs};
use crate::binder::{Binder, BinderError, ResourceKind};

/// A soft resource bound to hardware names through the binder
pub struct HardwareResource {
    id: String,
    kind: ResourceKind,
    binder: Binder,
    /// Present only while a duty-cycle relay is assigned and enabled
    ticker: Option<DutyCycle>,
}

impl HardwareResource {
    /// Register `id` with the binder
    pub fn register(
        binder: &Binder,
        id: &str,
        kind: ResourceKind,
        front_units: Option<&str>,
    ) -> Result<Self, BinderError> {
        binder.register(id, kind, front_units)?;
        Ok(Self {
            id: id.to_string(),
            kind,
            binder: binder.clone(),
            ticker: None,
        })
    }

    /// The `<id>_assignment` selector
    pub fn selector(&self) -> Option<Component> {
        self.binder.selector(&self.id)
    }

    /// Front-facing component `<id><suffix>`, once created
    pub fn front(&self, suffix: &str) -> Option<Component> {
        self.binder.front(&self.id, suffix)
    }

    fn drive_duty_cycle(&mut self, now: Instant) {
        let enabled = self.binder.assignment(&self.id).is_some()
            && self
                .front("_enable")
                .and_then(|c| c.read().as_bool())
                .unwrap_or(false);

        if !enabled {
            if self.ticker.take().is_some() {
                debug!(instance = %self.id, "Duty cycle stopped");
                self.set_output(false);
            }
            return;
        }

        let ticker = *self.ticker.get_or_insert_with(|| DutyCycle::new(now));
        let duty = self
            .front("_duty")
            .and_then(|c| c.read().as_f64())
            .unwrap_or(0.0);
        let period = period_from_secs(self.front("_period").and_then(|c| c.read().as_f64()));
        self.set_output(ticker.output(now, period, duty));
    }

    fn set_output(&self, on: bool) {
        let Some(output) = self.front("_output") else {
            return;
        };
        if output.read().as_bool() == Some(on) {
            return;
        }
        if let Err(e) = output.set(on) {
            warn!(instance = %self.id, error = %e, "Cannot drive output");
        }
    }
}

impl SoftResource for HardwareResource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn attach(&mut self, name: &str) -> Result<(), BinderError> {
        self.binder.assign(&self.id, name)
    }

    fn detach(&mut self) -> Result<(), BinderError> {
        self.ticker = None;
        self.set_output(false);
        self.binder.unassign(&self.id)
    }

    fn assignment(&self) -> Option<String> {
        self.binder.assignment(&self.id)
    }

    fn process(&mut self, now: Instant) {
        if self.kind == ResourceKind::DutyCycleRelay {
            self.drive_duty_cycle(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use kettle_types::{ComponentConfig, Value};

    use crate::resources::tests::runtime;

    #[test]
    fn test_duty_cycle_relay() {
        let (runtime, factory, bundle) = runtime();
        let registry = runtime.registry();
        let relay = registry
            .create_component(ComponentConfig::boolean("RELAY_1A_0").with_value(false))
            .unwrap();
        registry
            .create_component(ComponentConfig::text("relay_names").with_value("RELAY_1A_0"))
            .unwrap();

        let binder = Binder::new(factory, bundle, None);
        let mut element =
            HardwareResource::register(&binder, "element", ResourceKind::DutyCycleRelay, None)
                .unwrap();
        binder.poll();
        element.attach("RELAY_1A_0").unwrap();
        assert_eq!(element.assignment().as_deref(), Some("RELAY_1A_0"));

        element.front("_duty").unwrap().set(50.0).unwrap();
        element.front("_period").unwrap().set(4.0).unwrap();

        let start = Instant::now();
        element.process(start);
        assert_eq!(relay.read(), Value::Bool(false), "disabled until enabled");

        element.front("_enable").unwrap().set(true).unwrap();
        element.process(start);
        assert_eq!(relay.read(), Value::Bool(true));
        element.process(start + Duration::from_secs(3));
        assert_eq!(relay.read(), Value::Bool(false));
        element.process(start + Duration::from_secs(5));
        assert_eq!(relay.read(), Value::Bool(true));

        element.detach().unwrap();
        assert_eq!(relay.read(), Value::Bool(false));
        assert!(element.assignment().is_none());
        assert_eq!(element.front("_enable").unwrap().read(), Value::Bool(false));
        assert_eq!(element.front("_duty").unwrap().read(), Value::Number(50.0));
    }
}
