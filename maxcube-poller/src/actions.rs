//! One-shot operations behind the CLI subcommands.
//!
//! Each call opens its own session, does one thing and disconnects.

use std::fmt::Write as _;

use tracing::info;

use maxcube_core::climate::{self, ClimateCommand, HvacMode, Preset};
use maxcube_core::message::GatewayInfo;
use maxcube_core::{Ack, CubePoller, Device, DeviceState, Error, Gateway, Mode, RfAddress, Session};

use crate::config::PollerConfig;

/// What to change on a single device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Raw mode/temperature, validated but not clamped.
    Set { mode: Mode, temperature: Option<f64> },
    /// Manual setpoint, clamped to the device's usable range.
    Temperature(f64),
    Preset(Preset),
    Hvac(HvacMode),
}

/// Take one snapshot and disconnect.
pub async fn snapshot(config: &PollerConfig) -> Result<std::sync::Arc<Gateway>, Error> {
    let poller = CubePoller::connect(config.connector(), config.to_session_config()).await?;
    poller.disconnect().await;
    poller
        .snapshot()
        .ok_or(Error::InvalidState("refresh succeeded without a snapshot"))
}

/// Connect, read the gateway's identity, disconnect.
pub async fn check(config: &PollerConfig) -> Result<GatewayInfo, Error> {
    let mut session = Session::new(config.connector(), config.to_session_config());
    session.connect().await?;
    let info = session
        .gateway_info()
        .cloned()
        .ok_or_else(|| Error::Protocol("handshake carried no H frame".into()));
    session.disconnect().await;
    info
}

/// Resolve `action` against the device's current state and send it.
pub async fn apply(config: &PollerConfig, rf_address: RfAddress, action: Action) -> Result<Ack, Error> {
    let poller = CubePoller::connect(config.connector(), config.to_session_config()).await?;
    let result = async {
        let snapshot = poller
            .snapshot()
            .ok_or(Error::InvalidState("no snapshot available yet"))?;
        let device = snapshot.find_by_rf_address(rf_address)?;
        let command = resolve(device, action)?;
        info!(
            device = %snapshot.display_name(device),
            mode = %command.mode,
            temperature = ?command.temperature,
            "applying"
        );
        poller
            .send_command(rf_address, command.temperature, command.mode)
            .await
    }
    .await;
    poller.disconnect().await;
    result
}

pub fn resolve(device: &Device, action: Action) -> Result<ClimateCommand, Error> {
    match action {
        Action::Set { mode, temperature } => Ok(ClimateCommand { mode, temperature }),
        Action::Temperature(celsius) => Ok(ClimateCommand {
            mode: Mode::Manual,
            temperature: Some(climate::clamp_setpoint(device, celsius)),
        }),
        Action::Preset(preset) => climate::preset_command(device, preset),
        Action::Hvac(hvac) => climate::hvac_command(device, hvac),
    }
}

// ── Rendering ────────────────────────────────────────────────────

/// Human-readable status report, grouped by room.
pub fn render_status(gateway: &Gateway) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Cube {} ({}) firmware {}",
        gateway.serial, gateway.rf_address, gateway.firmware_version
    );
    if let (Some(duty), Some(slots)) = (gateway.duty_cycle, gateway.free_memory_slots) {
        let _ = writeln!(out, "duty cycle {duty}%, {slots} free memory slots");
    }

    for room in &gateway.rooms {
        let _ = writeln!(out, "\n[{}] {}", room.id, room.name);
        for device in gateway.devices_in_room(room.id) {
            let _ = writeln!(out, "  {}", render_device(gateway, device));
        }
    }
    out
}

fn render_device(gateway: &Gateway, device: &Device) -> String {
    let mut line = format!("{:<20} {} {:<15}", device.name, device.rf_address, device.device_type);
    match &device.state {
        DeviceState::Thermostat { .. } | DeviceState::WallThermostat { .. } => {
            if let Some(mode) = device.mode() {
                let _ = write!(line, " {mode}");
            }
            if let Some(target) = device.target_temperature() {
                let _ = write!(line, " target {target}");
            }
            if let Some(actual) = device.actual_temperature() {
                let _ = write!(line, " actual {actual:.1}°C");
            }
            if let Some(valve) = device.valve_position() {
                let _ = write!(line, " valve {valve}%");
            }
            if let Some(hvac) = climate::hvac_mode(device) {
                let _ = write!(line, " hvac {hvac}");
            }
            if let Some(action) = climate::hvac_action(gateway, device) {
                let _ = write!(line, "/{action}");
            }
            if let Some(preset) = climate::preset(device) {
                let _ = write!(line, " preset {preset}");
            }
        }
        DeviceState::WindowShutter { is_open } => {
            line.push_str(if *is_open { " open" } else { " closed" });
        }
        DeviceState::EcoSwitch => {}
    }
    if device.battery_low {
        line.push_str(" [battery low]");
    }
    if device.link_error {
        line.push_str(" [link error]");
    }
    line
}
