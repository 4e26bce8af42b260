use serde::Serialize;

use crate::message::{DeviceType, Mode, Presets, RfAddress};
use crate::temperature::Temperature;

/// Capability-specific readings. Each variant carries only the fields that
/// device kind actually reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceState {
    /// Radiator thermostat (plain or plus).
    Thermostat {
        mode: Option<Mode>,
        target_temperature: Option<Temperature>,
        actual_temperature: Option<f64>,
        valve_position: Option<u8>,
        presets: Option<Presets>,
    },
    WallThermostat {
        mode: Option<Mode>,
        target_temperature: Option<Temperature>,
        actual_temperature: Option<f64>,
        presets: Option<Presets>,
    },
    WindowShutter {
        is_open: bool,
    },
    EcoSwitch,
}

/// One device as of a particular snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub rf_address: RfAddress,
    pub serial: String,
    pub name: String,
    pub room_id: u8,
    pub device_type: DeviceType,
    pub battery_low: bool,
    pub link_error: bool,
    pub panel_locked: bool,
    pub state: DeviceState,
}

impl Device {
    pub fn is_thermostat(&self) -> bool {
        matches!(self.state, DeviceState::Thermostat { .. })
    }

    pub fn is_wall_thermostat(&self) -> bool {
        matches!(self.state, DeviceState::WallThermostat { .. })
    }

    pub fn is_window_shutter(&self) -> bool {
        matches!(self.state, DeviceState::WindowShutter { .. })
    }

    /// Thermostats and wall thermostats take mode/temperature commands.
    pub fn accepts_commands(&self) -> bool {
        self.is_thermostat() || self.is_wall_thermostat()
    }

    pub fn mode(&self) -> Option<Mode> {
        match self.state {
            DeviceState::Thermostat { mode, .. } | DeviceState::WallThermostat { mode, .. } => mode,
            _ => None,
        }
    }

    pub fn target_temperature(&self) -> Option<Temperature> {
        match self.state {
            DeviceState::Thermostat {
                target_temperature, ..
            }
            | DeviceState::WallThermostat {
                target_temperature, ..
            } => target_temperature,
            _ => None,
        }
    }

    pub fn actual_temperature(&self) -> Option<f64> {
        match self.state {
            DeviceState::Thermostat {
                actual_temperature, ..
            }
            | DeviceState::WallThermostat {
                actual_temperature, ..
            } => actual_temperature,
            _ => None,
        }
    }

    /// Valve opening in percent; thermostats only.
    pub fn valve_position(&self) -> Option<u8> {
        match self.state {
            DeviceState::Thermostat { valve_position, .. } => valve_position,
            _ => None,
        }
    }

    pub fn presets(&self) -> Option<&Presets> {
        match &self.state {
            DeviceState::Thermostat { presets, .. } | DeviceState::WallThermostat { presets, .. } => {
                presets.as_ref()
            }
            _ => None,
        }
    }

    /// `Some(open)` for window shutters.
    pub fn is_open(&self) -> Option<bool> {
        match self.state {
            DeviceState::WindowShutter { is_open } => Some(is_open),
            _ => None,
        }
    }
}
