//! PID control loops
//!
//! A [`PidResource`] reads a process variable component, drives a control
//! component, and exposes its gains, limits and state as components:
//!
//! | suffix | meaning |
//! |---|---|
//! | `_enable` | loop on/off; turning it off resets the integral and zeroes the output |
//! | `_setpoint` | target value |
//! | `_process` / `_control` | component references, re-resolved on change |
//! | `_kp` `_ki` `_kd` | gains |
//! | `_min` `_max` | output clamp |
//! | `_output` `_integral` | read-only state |
//!
//! The update is the parallel form with output clamping and conditional
//! integration: the integral only accumulates while the output is not
//! saturated.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use kettle_runtime::{Bundle, Component, ComponentFactory};
use kettle_types::{ComponentConfig, Value};

use super::{NamedLink, SoftResource};
use crate::binder::{BinderError, ResourceKind};

// ─────────────────────────────────────────────────────────────────────────────
// Controller math
// ─────────────────────────────────────────────────────────────────────────────

/// Gains and output limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            out_min: 0.0,
            out_max: 100.0,
        }
    }
}

/// Controller memory between updates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidTerms {
    pub integral: f64,
    pub previous_error: Option<f64>,
}

impl PidGains {
    /// One controller update. `dt` is in seconds; a zero `dt` skips the
    /// integral and derivative terms.
    pub fn update(&self, terms: &mut PidTerms, pv: f64, sp: f64, dt: f64) -> f64 {
        let error = sp - pv;
        let p_term = self.kp * error;

        let new_integral = if dt > 0.0 {
            terms.integral + error * dt
        } else {
            terms.integral
        };
        let i_term = self.ki * new_integral;

        let d_term = match terms.previous_error {
            Some(previous) if dt > 0.0 => self.kd * (error - previous) / dt,
            _ => 0.0,
        };

        let (lo, hi) = if self.out_min <= self.out_max {
            (self.out_min, self.out_max)
        } else {
            (self.out_max, self.out_min)
        };
        let output_raw = p_term + i_term + d_term;
        let output = output_raw.clamp(lo, hi);

        // Anti-windup: keep the old integral while saturated
        if output == output_raw {
            terms.integral = new_integral;
        }
        terms.previous_error = Some(error);

        output
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PID Resource
// ─────────────────────────────────────────────────────────────────────────────

/// State shared with the `_enable` listener
#[derive(Default)]
struct Shared {
    terms: PidTerms,
    control: Option<Component>,
}

/// A PID loop exposed as components
pub struct PidResource {
    id: String,
    enable: Component,
    setpoint: Component,
    kp: Component,
    ki: Component,
    kd: Component,
    min: Component,
    max: Component,
    output: Component,
    integral: Component,
    process: NamedLink,
    control: NamedLink,
    shared: Arc<Mutex<Shared>>,
    last: Option<Instant>,
}

fn number(
    factory: &ComponentFactory,
    id: &str,
    suffix: &str,
    value: f64,
) -> Result<Component, BinderError> {
    Ok(factory.create(
        ComponentConfig::number(format!("{}{}", id, suffix))
            .with_group(id)
            .with_class("pid")
            .persist(true)
            .with_value(value),
    )?)
}

impl PidResource {
    /// Create the loop's components. `process` and `control` seed the
    /// references unless values were restored from settings.
    pub fn new(
        factory: &ComponentFactory,
        bundle: Bundle,
        id: &str,
        process: Option<&str>,
        control: Option<&str>,
    ) -> Result<Self, BinderError> {
        let defaults = PidGains::default();

        let enable = factory.create(
            ComponentConfig::boolean(format!("{}_enable", id))
                .with_group(id)
                .with_class("pid")
                .persist(true)
                .with_value(false),
        )?;
        let output = factory.create(
            ComponentConfig::number(format!("{}_output", id))
                .with_group(id)
                .with_class("pid")
                .read_only(true)
                .with_value(0.0),
        )?;
        let integral = factory.create(
            ComponentConfig::number(format!("{}_integral", id))
                .with_group(id)
                .read_only(true)
                .with_value(0.0),
        )?;

        let process_link = NamedLink::new(factory, bundle.clone(), id, "_process")?;
        let control_link = NamedLink::new(factory, bundle, id, "_control")?;
        for (link, seed) in [(&process_link, process), (&control_link, control)] {
            if let Some(seed) = seed {
                if link.name().is_empty() {
                    link.set_name(seed);
                }
            }
        }

        let shared = Arc::new(Mutex::new(Shared::default()));
        {
            let shared = Arc::clone(&shared);
            let output = output.clone();
            let integral = integral.clone();
            let id = id.to_string();
            enable.subscribe(move |change| {
                if change.value.as_bool() != Some(false) {
                    return;
                }
                let control = {
                    let mut shared = shared.lock();
                    shared.terms = PidTerms::default();
                    shared.control.clone()
                };
                for component in [Some(&output), Some(&integral), control.as_ref()]
                    .into_iter()
                    .flatten()
                {
                    if let Err(e) = component.set(0.0) {
                        warn!(pid = %id, component = %component.id(), error = %e, "Cannot zero on disable");
                    }
                }
                debug!(pid = %id, "Disabled");
            });
        }

        Ok(Self {
            enable,
            setpoint: number(factory, id, "_setpoint", 0.0)?,
            kp: number(factory, id, "_kp", defaults.kp)?,
            ki: number(factory, id, "_ki", defaults.ki)?,
            kd: number(factory, id, "_kd", defaults.kd)?,
            min: number(factory, id, "_min", defaults.out_min)?,
            max: number(factory, id, "_max", defaults.out_max)?,
            output,
            integral,
            process: process_link,
            control: control_link,
            shared,
            last: None,
            id: id.to_string(),
        })
    }

    pub fn enable(&self) -> &Component {
        &self.enable
    }

    pub fn setpoint(&self) -> &Component {
        &self.setpoint
    }

    pub fn output(&self) -> &Component {
        &self.output
    }

    pub fn integral(&self) -> &Component {
        &self.integral
    }

    /// Reference holding the process variable's name
    pub fn process_name(&self) -> &Component {
        self.process.component()
    }

    /// Reference holding the control component's name
    pub fn control_name(&self) -> &Component {
        self.control.component()
    }

    pub fn gains(&self) -> PidGains {
        let read = |c: &Component, default: f64| c.read().as_f64().unwrap_or(default);
        let defaults = PidGains::default();
        PidGains {
            kp: read(&self.kp, defaults.kp),
            ki: read(&self.ki, defaults.ki),
            kd: read(&self.kd, defaults.kd),
            out_min: read(&self.min, defaults.out_min),
            out_max: read(&self.max, defaults.out_max),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enable.read().as_bool().unwrap_or(false)
    }

    fn refresh_links(&mut self) {
        self.process.refresh();
        if self.control.refresh() {
            let control = self.control.get().cloned();
            debug!(pid = %self.id, control = ?control.as_ref().map(|c| c.id().to_string()), "Control target changed");
            self.shared.lock().control = control;
        }
    }

    fn write(component: &Component, value: f64) {
        if component.read() == Value::Number(value) {
            return;
        }
        if let Err(e) = component.set(value) {
            warn!(component = %component.id(), error = %e, "PID write rejected");
        }
    }
}

impl SoftResource for PidResource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Pid
    }

    /// Drive the named control component
    fn attach(&mut self, name: &str) -> Result<(), BinderError> {
        self.control.set_name(name);
        self.refresh_links();
        Ok(())
    }

    /// Zero and release the control component
    fn detach(&mut self) -> Result<(), BinderError> {
        if let Some(control) = self.control.get() {
            Self::write(control, 0.0);
        }
        self.control.set_name("");
        self.refresh_links();
        Ok(())
    }

    fn assignment(&self) -> Option<String> {
        Some(self.control.name()).filter(|n| !n.is_empty())
    }

    fn process(&mut self, now: Instant) {
        self.refresh_links();

        let dt = self
            .last
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.last = Some(now);

        if !self.is_enabled() {
            return;
        }
        let Some(pv) = self.process.get().and_then(|c| c.read().as_f64()) else {
            return;
        };
        let Some(sp) = self.setpoint.read().as_f64() else {
            return;
        };

        let gains = self.gains();
        let (output, integral, control) = {
            let mut shared = self.shared.lock();
            let output = gains.update(&mut shared.terms, pv, sp, dt);
            (output, shared.terms.integral, shared.control.clone())
        };

        Self::write(&self.output, output);
        Self::write(&self.integral, integral);
        if let Some(control) = control {
            Self::write(&control, output);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::resources::tests::runtime;

    #[test]
    fn test_proportional_only() {
        let gains = PidGains {
            kp: 2.0,
            ..PidGains::default()
        };
        let mut terms = PidTerms::default();
        assert_eq!(gains.update(&mut terms, 40.0, 50.0, 1.0), 20.0);
        assert_eq!(gains.update(&mut terms, 60.0, 50.0, 1.0), 0.0);
        assert_eq!(gains.update(&mut terms, -50.0, 50.0, 1.0), 100.0);
    }

    #[test]
    fn test_integral_accumulates_and_winds_up_only_unsaturated() {
        let gains = PidGains {
            kp: 0.0,
            ki: 1.0,
            ..PidGains::default()
        };
        let mut terms = PidTerms::default();
        assert_eq!(gains.update(&mut terms, 40.0, 50.0, 2.0), 20.0);
        assert_eq!(terms.integral, 20.0);

        // Would reach 120, clamps at 100 and keeps the old integral
        assert_eq!(gains.update(&mut terms, 0.0, 50.0, 2.0), 100.0);
        assert_eq!(terms.integral, 20.0);
    }

    #[test]
    fn test_derivative_needs_history() {
        let gains = PidGains {
            kp: 0.0,
            kd: 1.0,
            out_min: -100.0,
            ..PidGains::default()
        };
        let mut terms = PidTerms::default();
        assert_eq!(gains.update(&mut terms, 50.0, 50.0, 1.0), 0.0);
        assert_eq!(gains.update(&mut terms, 45.0, 50.0, 1.0), 5.0);
        assert_eq!(gains.update(&mut terms, 45.0, 50.0, 0.0), 0.0);
    }

    #[test]
    fn test_enable_disable_scenario() {
        let (runtime, factory, bundle) = runtime();
        let registry = runtime.registry();
        let temperature = registry
            .create_component(ComponentConfig::number("boiler_temperature").with_value(60.0))
            .unwrap();
        let heater = registry
            .create_component(ComponentConfig::number("heater_output").with_units("%"))
            .unwrap();

        let mut pid = PidResource::new(
            &factory,
            bundle,
            "boiler",
            Some("boiler_temperature"),
            Some("heater_output"),
        )
        .unwrap();
        assert_eq!(pid.assignment().as_deref(), Some("heater_output"));
        pid.setpoint().set(70.0).unwrap();

        let start = Instant::now();
        pid.process(start);
        assert_eq!(pid.output().read(), Value::Number(0.0), "disabled loop is idle");

        pid.enable().set(true).unwrap();
        pid.process(start + Duration::from_secs(1));
        assert_eq!(pid.output().read(), Value::Number(10.0));
        assert_eq!(heater.read(), Value::Number(10.0));

        temperature.set(65.0).unwrap();
        pid.process(start + Duration::from_secs(2));
        assert_eq!(heater.read(), Value::Number(5.0));

        pid.enable().set(false).unwrap();
        assert_eq!(pid.output().read(), Value::Number(0.0));
        assert_eq!(pid.integral().read(), Value::Number(0.0));
        assert_eq!(heater.read(), Value::Number(0.0));

        pid.process(start + Duration::from_secs(3));
        assert_eq!(heater.read(), Value::Number(0.0));
    }

    #[test]
    fn test_disable_resets_integral() {
        let (runtime, factory, bundle) = runtime();
        let registry = runtime.registry();
        registry
            .create_component(ComponentConfig::number("pv").with_value(0.0))
            .unwrap();
        let mut pid = PidResource::new(&factory, bundle, "loop", Some("pv"), None).unwrap();
        pid.setpoint().set(10.0).unwrap();

        let kp = pid.kp.clone();
        let ki = pid.ki.clone();
        kp.set(0.0).unwrap();
        ki.set(1.0).unwrap();
        pid.enable().set(true).unwrap();

        let start = Instant::now();
        pid.process(start);
        pid.process(start + Duration::from_secs(2));
        assert_eq!(pid.integral().read(), Value::Number(20.0));

        pid.enable().set(false).unwrap();
        assert_eq!(pid.integral().read(), Value::Number(0.0));

        pid.enable().set(true).unwrap();
        pid.process(start + Duration::from_secs(3));
        assert_eq!(pid.integral().read(), Value::Number(10.0));
    }

    #[test]
    fn test_process_reference_change_is_re_resolved() {
        let (runtime, factory, bundle) = runtime();
        let registry = runtime.registry();
        registry
            .create_component(ComponentConfig::number("a").with_value(0.0))
            .unwrap();
        let b = registry
            .create_component(ComponentConfig::number("b").with_value(8.0))
            .unwrap();

        let mut pid = PidResource::new(&factory, bundle, "loop", Some("a"), None).unwrap();
        pid.setpoint().set(10.0).unwrap();
        pid.enable().set(true).unwrap();

        pid.process(Instant::now());
        assert_eq!(pid.output().read(), Value::Number(10.0));

        pid.process_name().set("b").unwrap();
        pid.process(Instant::now());
        assert_eq!(b.read(), Value::Number(8.0));
        assert_eq!(pid.output().read(), Value::Number(2.0));
    }
}
