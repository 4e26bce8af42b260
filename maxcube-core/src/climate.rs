//! HVAC-style view of thermostats.
//!
//! Pure, best-effort functions over a snapshot. None of this is part of
//! the wire protocol: the gateway knows modes and setpoints only, and the
//! mapping to HVAC modes and presets is a presentation choice.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Error;
use crate::message::Mode;
use crate::model::{Device, Gateway};
use crate::temperature::Temperature;

/// Lowest setpoint offered for normal use; 4.5 °C is reserved for "off".
pub const USABLE_MIN: f64 = 5.0;
/// Highest setpoint offered for normal use; 30.5 °C is reserved for "on".
pub const USABLE_MAX: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Auto,
    Heat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Off,
    Heating,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Boost,
    Comfort,
    Eco,
    Away,
    On,
}

/// Mode and setpoint to send for an HVAC mode or preset change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateCommand {
    pub mode: Mode,
    pub temperature: Option<f64>,
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HvacMode::Off => "off",
            HvacMode::Auto => "auto",
            HvacMode::Heat => "heat",
        })
    }
}

impl FromStr for HvacMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(HvacMode::Off),
            "auto" => Ok(HvacMode::Auto),
            "heat" => Ok(HvacMode::Heat),
            other => Err(Error::UnsupportedOperation(format!("unknown hvac mode {other:?}"))),
        }
    }
}

impl fmt::Display for HvacAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HvacAction::Off => "off",
            HvacAction::Heating => "heating",
            HvacAction::Idle => "idle",
        })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Preset::Boost => "boost",
            Preset::Comfort => "comfort",
            Preset::Eco => "eco",
            Preset::Away => "away",
            Preset::On => "on",
        })
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "boost" => Ok(Preset::Boost),
            "comfort" => Ok(Preset::Comfort),
            "eco" => Ok(Preset::Eco),
            "away" => Ok(Preset::Away),
            "on" => Ok(Preset::On),
            other => Err(Error::UnsupportedOperation(format!("unknown preset {other:?}"))),
        }
    }
}

// ── Derivation ───────────────────────────────────────────────────

/// `None` for devices without a reported mode.
pub fn hvac_mode(device: &Device) -> Option<HvacMode> {
    let mode = device.mode()?;
    Some(match mode {
        Mode::Manual if device.target_temperature().is_some_and(Temperature::is_off) => HvacMode::Off,
        Mode::Manual => HvacMode::Heat,
        Mode::Automatic | Mode::Vacation | Mode::Boost => HvacMode::Auto,
    })
}

/// Whether the radiator valves are open. Wall thermostats report the
/// widest valve among the thermostats sharing their room.
pub fn hvac_action(gateway: &Gateway, device: &Device) -> Option<HvacAction> {
    if !device.accepts_commands() {
        return None;
    }
    let valve = if device.is_wall_thermostat() {
        gateway.max_valve_in_room(device.room_id).unwrap_or(0)
    } else {
        device.valve_position().unwrap_or(0)
    };
    Some(match hvac_mode(device) {
        Some(HvacMode::Off) => HvacAction::Off,
        _ if valve > 0 => HvacAction::Heating,
        _ => HvacAction::Idle,
    })
}

/// Best-effort preset for the device's current state.
///
/// A manual setpoint matching more than one preset yields `None`.
pub fn preset(device: &Device) -> Option<Preset> {
    match device.mode()? {
        Mode::Boost => Some(Preset::Boost),
        Mode::Vacation => Some(Preset::Away),
        Mode::Automatic => None,
        Mode::Manual => {
            let target = device.target_temperature()?;
            let presets = device.presets();
            let candidates = [
                (Preset::Comfort, presets.map(|p| p.comfort)),
                (Preset::Eco, presets.map(|p| p.eco)),
                (Preset::On, Some(Temperature::ON)),
            ];
            let mut matches = candidates
                .iter()
                .filter(|(_, t)| *t == Some(target))
                .map(|(p, _)| *p);
            match (matches.next(), matches.next()) {
                (Some(only), None) => Some(only),
                _ => None,
            }
        }
    }
}

/// `[max(device min, 5.0), min(device max, 30.0)]`.
pub fn usable_range(device: &Device) -> (f64, f64) {
    match device.presets() {
        Some(p) => (
            p.min.celsius().max(USABLE_MIN),
            p.max.celsius().min(USABLE_MAX),
        ),
        None => (USABLE_MIN, USABLE_MAX),
    }
}

pub fn clamp_setpoint(device: &Device, celsius: f64) -> f64 {
    let (min, max) = usable_range(device);
    celsius.max(min).min(max)
}

/// Setpoint worth showing: `None` when off, or when a schedule governs
/// and the raw value is a sentinel. Manual mode falls back to comfort.
pub fn display_target(device: &Device) -> Option<f64> {
    let mode = hvac_mode(device)?;
    if mode == HvacMode::Off {
        return None;
    }
    let (min, max) = usable_range(device);
    match device.target_temperature().map(Temperature::celsius) {
        Some(t) if (min..=max).contains(&t) => Some(t),
        _ if mode == HvacMode::Auto => None,
        _ => device.presets().map(|p| p.comfort.celsius()),
    }
}

// ── Commands ─────────────────────────────────────────────────────

pub fn preset_command(device: &Device, preset: Preset) -> Result<ClimateCommand, Error> {
    let (mode, temperature) = match preset {
        Preset::Boost => (Mode::Boost, None),
        Preset::Away => (Mode::Vacation, None),
        Preset::Comfort => (Mode::Manual, Some(preset_value(device, |p| p.comfort)?)),
        Preset::Eco => (Mode::Manual, Some(preset_value(device, |p| p.eco)?)),
        Preset::On => (Mode::Manual, Some(Temperature::ON.celsius())),
    };
    Ok(ClimateCommand { mode, temperature })
}

pub fn hvac_command(device: &Device, hvac: HvacMode) -> Result<ClimateCommand, Error> {
    let (mode, temperature) = match hvac {
        HvacMode::Off => (Mode::Manual, Some(Temperature::OFF.celsius())),
        HvacMode::Auto => (Mode::Automatic, None),
        HvacMode::Heat => {
            let current = display_target(device).filter(|t| *t > Temperature::OFF.celsius());
            let base = match current {
                Some(t) => t,
                None => preset_value(device, |p| p.comfort)?,
            };
            (Mode::Manual, Some(base.max(usable_range(device).0)))
        }
    };
    Ok(ClimateCommand { mode, temperature })
}

fn preset_value(device: &Device, pick: fn(&crate::message::Presets) -> Temperature) -> Result<f64, Error> {
    device
        .presets()
        .map(|p| pick(p).celsius())
        .ok_or_else(|| Error::UnsupportedOperation(format!("{} has no stored presets", device.rf_address)))
}
