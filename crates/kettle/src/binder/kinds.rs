//! Resource kinds and their channel tables
//!
//! Every hardware-backed kind draws names from one [`PoolKind`] and exposes a
//! fixed set of channels. A channel pairs a front-facing component
//! (`<instance><front>`) with a hardware component (`<name><hardware>`).

use serde::{Deserialize, Serialize};

use kettle_types::ComponentType;

// ─────────────────────────────────────────────────────────────────────────────
// Pools
// ─────────────────────────────────────────────────────────────────────────────

/// A shared pool of hardware names, sourced from one list component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Relay,
    Dac,
    Stepper,
    BitIn,
    BitOut,
    Distance,
    Temperature,
    Barometer,
}

impl PoolKind {
    pub const ALL: [PoolKind; 8] = [
        PoolKind::Relay,
        PoolKind::Dac,
        PoolKind::Stepper,
        PoolKind::BitIn,
        PoolKind::BitOut,
        PoolKind::Distance,
        PoolKind::Temperature,
        PoolKind::Barometer,
    ];

    /// Id of the published list component holding this pool's names
    pub fn list_component(&self) -> &'static str {
        match self {
            PoolKind::Relay => "relay_names",
            PoolKind::Dac => "dac_names",
            PoolKind::Stepper => "stepper_names",
            PoolKind::BitIn => "bit_in_names",
            PoolKind::BitOut => "bit_out_names",
            PoolKind::Distance => "distance_names",
            PoolKind::Temperature => "temperature_names",
            PoolKind::Barometer => "barometer_names",
        }
    }

    /// Hardware side of every channel a name in this pool provides
    pub fn hardware_channels(&self) -> Vec<&'static ChannelSpec> {
        let kind = match self {
            PoolKind::Relay => ResourceKind::Relay,
            PoolKind::Dac => ResourceKind::Dac,
            PoolKind::Stepper => ResourceKind::Stepper,
            PoolKind::BitIn => ResourceKind::BitIn,
            PoolKind::BitOut => ResourceKind::BitOut,
            PoolKind::Distance => ResourceKind::Distance,
            PoolKind::Temperature => ResourceKind::Temperature,
            PoolKind::Barometer => ResourceKind::Barometer,
        };
        kind.channels()
            .iter()
            .filter(|c| c.hardware.is_some())
            .collect()
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.list_component();
        write!(f, "{}", name.trim_end_matches("_names"))
    }
}

/// Split a published name list on whitespace and commas
pub fn parse_name_list(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// How a channel moves values once wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Mirrors in both directions
    Both,
    /// Hardware drives the front component only
    FromHardware,
    /// Front component with no hardware counterpart
    Local,
}

/// One front-facing component and its hardware counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSpec {
    /// Suffix appended to the instance id
    pub front: &'static str,
    /// Suffix appended to the hardware name, `None` for local channels
    pub hardware: Option<&'static str>,
    pub component_type: ComponentType,
    pub units: &'static str,
    pub mode: ChannelMode,
    /// Restored from settings across restarts
    pub persist: bool,
    /// Reset to the type's safe default on unassign
    pub reset: bool,
}

const fn wired(
    front: &'static str,
    hardware: &'static str,
    component_type: ComponentType,
    units: &'static str,
    mode: ChannelMode,
) -> ChannelSpec {
    ChannelSpec {
        front,
        hardware: Some(hardware),
        component_type,
        units,
        mode,
        persist: false,
        reset: true,
    }
}

const fn local(
    front: &'static str,
    component_type: ComponentType,
    units: &'static str,
    persist: bool,
    reset: bool,
) -> ChannelSpec {
    ChannelSpec {
        front,
        hardware: None,
        component_type,
        units,
        mode: ChannelMode::Local,
        persist,
        reset,
    }
}

use ChannelMode::{Both, FromHardware};
use ComponentType::{Boolean, Number};

const RELAY: &[ChannelSpec] = &[wired("_enable", "", Boolean, "", Both)];

const DUTY_CYCLE_RELAY: &[ChannelSpec] = &[
    local("_enable", Boolean, "", false, true),
    local("_duty", Number, "%", true, false),
    local("_period", Number, "s", true, false),
    wired("_output", "", Boolean, "", Both),
];

const DAC: &[ChannelSpec] = &[
    wired("_enable", "_enable", Boolean, "", Both),
    wired("_output", "_output", Number, "%", Both),
];

const STEPPER: &[ChannelSpec] = &[
    wired("_enable", "_enable", Boolean, "", Both),
    wired("_target", "_target", Number, "steps", Both),
    wired("_position", "_position", Number, "steps", FromHardware),
];

const BIT_IN: &[ChannelSpec] = &[wired("_state", "", Boolean, "", FromHardware)];

const BIT_OUT: &[ChannelSpec] = &[wired("_state", "", Boolean, "", Both)];

const DISTANCE: &[ChannelSpec] = &[wired("_distance", "", Number, "cm", FromHardware)];

const TEMPERATURE: &[ChannelSpec] = &[wired("_temperature", "", Number, "C", FromHardware)];

const BAROMETER: &[ChannelSpec] = &[
    wired("_pressure", "_pressure", Number, "hPa", FromHardware),
    wired("_temperature", "_temperature", Number, "C", FromHardware),
];

// ─────────────────────────────────────────────────────────────────────────────
// Resource Kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Every soft resource kind the `resources` process can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Relay,
    DutyCycleRelay,
    Dac,
    Stepper,
    BitIn,
    BitOut,
    Distance,
    Temperature,
    Barometer,
    Pid,
    Variable,
    Function,
}

impl ResourceKind {
    /// Pool this kind draws hardware names from
    pub fn pool(&self) -> Option<PoolKind> {
        match self {
            ResourceKind::Relay | ResourceKind::DutyCycleRelay => Some(PoolKind::Relay),
            ResourceKind::Dac => Some(PoolKind::Dac),
            ResourceKind::Stepper => Some(PoolKind::Stepper),
            ResourceKind::BitIn => Some(PoolKind::BitIn),
            ResourceKind::BitOut => Some(PoolKind::BitOut),
            ResourceKind::Distance => Some(PoolKind::Distance),
            ResourceKind::Temperature => Some(PoolKind::Temperature),
            ResourceKind::Barometer => Some(PoolKind::Barometer),
            ResourceKind::Pid | ResourceKind::Variable | ResourceKind::Function => None,
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.pool().is_some()
    }

    /// Channel table for hardware-backed kinds, empty otherwise
    pub fn channels(&self) -> &'static [ChannelSpec] {
        match self {
            ResourceKind::Relay => RELAY,
            ResourceKind::DutyCycleRelay => DUTY_CYCLE_RELAY,
            ResourceKind::Dac => DAC,
            ResourceKind::Stepper => STEPPER,
            ResourceKind::BitIn => BIT_IN,
            ResourceKind::BitOut => BIT_OUT,
            ResourceKind::Distance => DISTANCE,
            ResourceKind::Temperature => TEMPERATURE,
            ResourceKind::Barometer => BAROMETER,
            ResourceKind::Pid | ResourceKind::Variable | ResourceKind::Function => &[],
        }
    }

    /// Class tag put on front-facing components
    pub fn class(&self) -> &'static str {
        match self {
            ResourceKind::Relay => "relay",
            ResourceKind::DutyCycleRelay => "duty_cycle_relay",
            ResourceKind::Dac => "dac",
            ResourceKind::Stepper => "stepper",
            ResourceKind::BitIn => "bit_in",
            ResourceKind::BitOut => "bit_out",
            ResourceKind::Distance => "distance",
            ResourceKind::Temperature => "temperature",
            ResourceKind::Barometer => "barometer",
            ResourceKind::Pid => "pid",
            ResourceKind::Variable => "variable",
            ResourceKind::Function => "function",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.class())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_list() {
        assert_eq!(
            parse_name_list("RELAY_1A_0, RELAY_1A_1\nRELAY_1B_0"),
            vec!["RELAY_1A_0", "RELAY_1A_1", "RELAY_1B_0"]
        );
        assert!(parse_name_list("  ,, ").is_empty());
    }

    #[test]
    fn test_duty_cycle_relay_shares_relay_pool() {
        assert_eq!(ResourceKind::DutyCycleRelay.pool(), Some(PoolKind::Relay));
        assert!(!ResourceKind::Pid.is_hardware());
        assert!(ResourceKind::Function.channels().is_empty());
    }

    #[test]
    fn test_hardware_channels() {
        let suffixes: Vec<&str> = PoolKind::Barometer
            .hardware_channels()
            .iter()
            .filter_map(|c| c.hardware)
            .collect();
        assert_eq!(suffixes, vec!["_pressure", "_temperature"]);
        assert_eq!(PoolKind::Relay.hardware_channels().len(), 1);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(PoolKind::BitIn.to_string(), "bit_in");
        assert_eq!(ResourceKind::DutyCycleRelay.to_string(), "duty_cycle_relay");
        let kind: ResourceKind = serde_json::from_str("\"duty_cycle_relay\"").unwrap();
        assert_eq!(kind, ResourceKind::DutyCycleRelay);
    }
}
