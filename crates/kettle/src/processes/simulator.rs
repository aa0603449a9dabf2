//! Simulated hardware
//!
//! Creates one component per hardware channel for every configured name,
//! plus the per-kind name lists the binder draws from. Each step applies a
//! crude plant model: probes drift toward a temperature set by how many
//! relays are on, and enabled steppers walk toward their target.

use async_trait::async_trait;
use tracing::debug;

use kettle_runtime::{Component, Process, ProcessContext, ProcessResult, ProcessSpec};
use kettle_types::{ComponentConfig, ComponentType, Value};

use crate::binder::{ChannelMode, PoolKind};
use crate::config::SimulatorConfig;

const AMBIENT: f64 = 20.0;
const FULL_HEAT: f64 = 100.0;
/// Fraction of the remaining gap a probe closes per step
const PROBE_RATE: f64 = 0.1;
/// Steps per tick
const STEPPER_RATE: f64 = 50.0;
const PRESSURE: f64 = 1013.25;
const DISTANCE: f64 = 100.0;

/// Publishes simulated hardware
pub struct Simulator {
    config: SimulatorConfig,
    plant: Plant,
}

#[derive(Default)]
struct Plant {
    relays: Vec<Component>,
    probes: Vec<Component>,
    /// (enable, target, position)
    steppers: Vec<(Component, Component, Component)>,
    barometer_temperatures: Vec<Component>,
}

impl Plant {
    fn add(&mut self, pool: PoolKind, channels: Vec<(&str, Component)>) {
        let find = |suffix: &str| {
            channels
                .iter()
                .find(|(s, _)| *s == suffix)
                .map(|(_, c)| c.clone())
        };

        match pool {
            PoolKind::Relay => self.relays.extend(find("")),
            PoolKind::Temperature => self.probes.extend(find("")),
            PoolKind::Barometer => self.barometer_temperatures.extend(find("_temperature")),
            PoolKind::Stepper => {
                if let (Some(enable), Some(target), Some(position)) =
                    (find("_enable"), find("_target"), find("_position"))
                {
                    self.steppers.push((enable, target, position));
                }
            }
            _ => {}
        }
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            plant: Plant::default(),
        }
    }

    fn names(&self, pool: PoolKind) -> &[String] {
        match pool {
            PoolKind::Relay => &self.config.relays,
            PoolKind::Dac => &self.config.dacs,
            PoolKind::Stepper => &self.config.steppers,
            PoolKind::BitIn => &self.config.bit_ins,
            PoolKind::BitOut => &self.config.bit_outs,
            PoolKind::Distance => &self.config.distances,
            PoolKind::Temperature => &self.config.probes,
            PoolKind::Barometer => &self.config.barometers,
        }
    }

    fn initial_value(pool: PoolKind, suffix: &str, component_type: ComponentType) -> Value {
        match (pool, suffix) {
            (PoolKind::Temperature, _) | (PoolKind::Barometer, "_temperature") => {
                Value::Number(AMBIENT)
            }
            (PoolKind::Barometer, "_pressure") => Value::Number(PRESSURE),
            (PoolKind::Distance, _) => Value::Number(DISTANCE),
            _ => component_type.safe_default(),
        }
    }
}

#[async_trait]
impl Process for Simulator {
    fn spec(&self) -> ProcessSpec {
        ProcessSpec::new("Simulator").with_description("Simulated relays, probes and actuators")
    }

    async fn setup(&mut self, ctx: &mut ProcessContext) -> ProcessResult<()> {
        for pool in PoolKind::ALL {
            let names = self.names(pool).to_vec();

            for name in &names {
                let mut created = Vec::new();
                for channel in pool.hardware_channels() {
                    let suffix = channel.hardware.unwrap_or_default();
                    let component = ctx.create_component(
                        ComponentConfig::new(format!("{}{}", name, suffix))
                            .with_type(channel.component_type)
                            .with_units(channel.units)
                            .with_group(name.clone())
                            .with_class(pool.to_string())
                            .read_only(channel.mode == ChannelMode::FromHardware)
                            .with_value(Self::initial_value(pool, suffix, channel.component_type)),
                    )?;
                    created.push((suffix, component));
                }
                self.plant.add(pool, created);
            }

            ctx.create_component(
                ComponentConfig::text(pool.list_component())
                    .with_class("hardware")
                    .read_only(true)
                    .with_value(names.join(" ")),
            )?;
        }

        ctx.log().info(format!(
            "Simulating {} relays, {} probes, {} steppers",
            self.plant.relays.len(),
            self.plant.probes.len(),
            self.plant.steppers.len()
        ));
        Ok(())
    }

    async fn step(&mut self, _ctx: &mut ProcessContext) -> ProcessResult<()> {
        let plant = &self.plant;

        let heating = if plant.relays.is_empty() {
            0.0
        } else {
            let on = plant.relays.iter().filter(|r| r.read().is_truthy()).count();
            on as f64 / plant.relays.len() as f64
        };
        let target = AMBIENT + (FULL_HEAT - AMBIENT) * heating;

        for probe in &plant.probes {
            let current = probe.read().as_f64().unwrap_or(AMBIENT);
            let next = current + (target - current) * PROBE_RATE;
            probe.set((next * 100.0).round() / 100.0)?;
        }
        for thermometer in &plant.barometer_temperatures {
            thermometer.set(AMBIENT)?;
        }

        for (enable, target, position) in &plant.steppers {
            if !enable.read().is_truthy() {
                continue;
            }
            let (Some(goal), Some(at)) = (target.read().as_f64(), position.read().as_f64()) else {
                continue;
            };
            let next = at + (goal - at).clamp(-STEPPER_RATE, STEPPER_RATE);
            if next != at {
                position.set(next)?;
            }
        }

        debug!(heating, target, "Simulator step");
        Ok(())
    }
}
