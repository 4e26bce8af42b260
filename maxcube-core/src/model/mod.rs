//! In-memory gateway model.
//!
//! [`apply_snapshot`] turns the frames of one full-state read into a fresh
//! [`Gateway`]. Nothing carries over from the previous snapshot; devices are
//! matched across refreshes by [`RfAddress`](crate::message::RfAddress) only.

mod device;
mod gateway;
mod room;

pub use device::{Device, DeviceState};
pub use gateway::Gateway;
pub use room::Room;

use std::collections::HashMap;

use tracing::debug;

use crate::error::Error;
use crate::flags::StatusFlags;
use crate::message::{DeviceConfig, DeviceRecord, DeviceType, LiveRecord, Message, RfAddress};
use crate::payload;

/// Build a complete gateway from one snapshot's decoded frames.
///
/// Requires an `H:` frame, a complete set of `M:` parts and at least one
/// `L:` frame. Later `C:` and `L:` records for the same address override
/// earlier ones. Devices appear in metadata order; rooms in metadata order,
/// followed by placeholders for room ids the metadata does not list.
pub fn apply_snapshot(messages: &[Message]) -> Result<Gateway, Error> {
    let mut hello = None;
    let mut parts = Vec::new();
    let mut configs: HashMap<RfAddress, &DeviceConfig> = HashMap::new();
    let mut live: HashMap<RfAddress, &LiveRecord> = HashMap::new();
    let mut saw_live = false;
    let mut last_ack = None;

    for message in messages {
        match message {
            Message::Hello(info) => {
                // A new handshake restarts the structural picture.
                hello = Some(info);
                parts.clear();
            }
            Message::Metadata(part) => parts.push(part),
            Message::Configuration(config) => {
                configs.insert(config.rf_address, config);
            }
            Message::LiveData(records) => {
                saw_live = true;
                for record in records {
                    live.insert(record.rf_address, record);
                }
            }
            Message::Ack(ack) => last_ack = Some(ack),
            Message::SetCommand(_) => {}
        }
    }

    let hello = hello.ok_or_else(|| Error::Protocol("snapshot has no H frame".into()))?;
    if parts.is_empty() {
        return Err(Error::Protocol("snapshot has no M frame".into()));
    }
    if !saw_live {
        return Err(Error::Protocol("snapshot has no L frame".into()));
    }
    let metadata = payload::assemble_metadata(&parts)?;

    let mut rooms: Vec<Room> = metadata
        .rooms
        .iter()
        .map(|r| Room {
            id: r.id,
            name: r.name.clone(),
            rf_address: r.rf_address,
            devices: Vec::new(),
        })
        .collect();

    let mut devices = Vec::with_capacity(metadata.devices.len());
    for record in &metadata.devices {
        if record.device_type == DeviceType::Cube {
            continue;
        }
        let device = build_device(
            record,
            configs.get(&record.rf_address).copied(),
            live.get(&record.rf_address).copied(),
        );

        let room = match rooms.iter().position(|r| r.id == device.room_id) {
            Some(index) => &mut rooms[index],
            None => {
                debug!(room = device.room_id, device = %device.rf_address, "device in unlisted room");
                rooms.push(Room::placeholder(device.room_id));
                let last = rooms.len() - 1;
                &mut rooms[last]
            }
        };
        room.devices.push(device.rf_address);
        devices.push(device);
    }

    let (duty_cycle, free_memory_slots) = match last_ack {
        Some(ack) => (Some(ack.duty_cycle), Some(ack.free_memory_slots)),
        None => (hello.duty_cycle, hello.free_memory_slots),
    };

    Ok(Gateway {
        serial: hello.serial.clone(),
        rf_address: hello.rf_address,
        firmware_version: hello.firmware_version.clone(),
        duty_cycle,
        free_memory_slots,
        address: String::new(),
        persistent: false,
        rooms,
        devices,
    })
}

fn build_device(record: &DeviceRecord, config: Option<&DeviceConfig>, live: Option<&LiveRecord>) -> Device {
    let flags = live.map(|l| l.flags).unwrap_or_else(StatusFlags::empty);
    let presets = config.and_then(|c| c.presets);
    let mode = live.map(|l| l.flags.mode());
    let target_temperature = live.and_then(|l| l.target_temperature);
    let actual_temperature = live.and_then(|l| l.actual_temperature);

    let state = match record.device_type {
        DeviceType::Thermostat | DeviceType::ThermostatPlus => DeviceState::Thermostat {
            mode,
            target_temperature,
            actual_temperature,
            valve_position: live.and_then(|l| l.valve_position),
            presets,
        },
        DeviceType::WallThermostat => DeviceState::WallThermostat {
            mode,
            target_temperature,
            actual_temperature,
            presets,
        },
        DeviceType::WindowShutter => DeviceState::WindowShutter {
            is_open: flags.shutter_open(),
        },
        DeviceType::EcoSwitch | DeviceType::Cube => DeviceState::EcoSwitch,
    };

    Device {
        rf_address: record.rf_address,
        serial: record.serial.clone(),
        name: record.name.clone(),
        room_id: record.room_id,
        device_type: record.device_type,
        battery_low: flags.contains(StatusFlags::BATTERY_LOW),
        // No live record means the gateway has not heard from the device.
        link_error: live.is_none() || flags.contains(StatusFlags::LINK_ERROR),
        panel_locked: flags.contains(StatusFlags::PANEL_LOCKED),
        state,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Mode;
    use crate::temperature::Temperature;
    use crate::test_support::*;

    fn mixed_lines() -> Vec<String> {
        vec![
            HELLO.to_string(),
            metadata_line(
                &[(1, "Living Room", ROOM_RF), (2, "Bath", [0x0A, 0x0B, 0x0D])],
                &[
                    DeviceSpec {
                        device_type: DeviceType::Thermostat,
                        rf: THERMOSTAT_RF,
                        serial: "KEQ0000001",
                        name: "Radiator",
                        room_id: 1,
                    },
                    DeviceSpec {
                        device_type: DeviceType::WallThermostat,
                        rf: WALL_RF,
                        serial: "KEQ0000002",
                        name: "Wall",
                        room_id: 1,
                    },
                    DeviceSpec {
                        device_type: DeviceType::WindowShutter,
                        rf: SHUTTER_RF,
                        serial: "KEQ0000003",
                        name: "Window",
                        room_id: 2,
                    },
                ],
            ),
            config_line(THERMOSTAT_RF, DeviceType::Thermostat, 1, "KEQ0000001"),
            config_line(WALL_RF, DeviceType::WallThermostat, 1, "KEQ0000002"),
            config_line(SHUTTER_RF, DeviceType::WindowShutter, 2, "KEQ0000003"),
            live_line(&[
                thermostat_record(THERMOSTAT_RF, Mode::Manual, 42, 40, 203),
                wall_record(WALL_RF, Mode::Automatic, 43, 260),
                basic_record(SHUTTER_RF, 0x92),
            ]),
        ]
    }

    #[test]
    fn living_room_scenario() {
        let gateway = apply_snapshot(&decode_all(&scenario_lines(42, Mode::Manual))).unwrap();
        assert_eq!(gateway.serial, "KEQ0523864");
        assert_eq!(gateway.rooms.len(), 1);
        assert_eq!(gateway.rooms[0].name, "Living Room");
        assert_eq!(gateway.rooms[0].devices, vec![RfAddress::new(THERMOSTAT_RF)]);

        let device = gateway.find_by_rf_address(RfAddress::new(THERMOSTAT_RF)).unwrap();
        assert_eq!(device.mode(), Some(Mode::Manual));
        assert_eq!(device.target_temperature().unwrap().celsius(), 21.0);
        assert_eq!(device.valve_position(), Some(40));
        assert_eq!(device.actual_temperature(), Some(20.3));
        assert_eq!(device.presets().unwrap().eco.celsius(), 16.5);
        assert!(!device.link_error);
        assert_eq!(gateway.display_name(device), "Living Room Radiator");
    }

    #[test]
    fn capability_variants() {
        let gateway = apply_snapshot(&decode_all(&mixed_lines())).unwrap();
        assert_eq!(gateway.devices.len(), 3);

        let wall = gateway.find_by_rf_address(RfAddress::new(WALL_RF)).unwrap();
        assert!(wall.is_wall_thermostat());
        assert_eq!(wall.actual_temperature(), Some(26.0));
        assert_eq!(wall.valve_position(), None);

        let shutter = gateway.find_by_rf_address(RfAddress::new(SHUTTER_RF)).unwrap();
        assert_eq!(shutter.is_open(), Some(true));
        assert!(shutter.battery_low);
        assert!(!shutter.accepts_commands());
        assert_eq!(shutter.presets(), None);

        assert_eq!(gateway.devices_in_room(1).count(), 2);
        assert_eq!(gateway.max_valve_in_room(1), Some(40));
        assert_eq!(gateway.max_valve_in_room(2), None);
    }

    #[test]
    fn idempotent() {
        let messages = decode_all(&mixed_lines());
        let a = apply_snapshot(&messages).unwrap();
        let b = apply_snapshot(&messages).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rf_address_identity_across_refreshes() {
        let before = apply_snapshot(&decode_all(&scenario_lines(42, Mode::Manual))).unwrap();

        // The device keeps its address but the gateway reports a new serial.
        let mut lines = scenario_lines(9, Mode::Manual);
        lines[1] = metadata_line(
            &[(1, "Living Room", ROOM_RF)],
            &[DeviceSpec {
                device_type: DeviceType::Thermostat,
                rf: THERMOSTAT_RF,
                serial: "KEQ9999999",
                name: "Radiator",
                room_id: 1,
            }],
        );
        let after = apply_snapshot(&decode_all(&lines)).unwrap();

        let rf = RfAddress::new(THERMOSTAT_RF);
        let old = before.find_by_rf_address(rf).unwrap();
        let new = after.find_by_rf_address(rf).unwrap();
        assert_ne!(old.serial, new.serial);
        assert_eq!(new.target_temperature(), Some(Temperature::OFF));
        assert_eq!(old.target_temperature().unwrap().celsius(), 21.0);
    }

    #[test]
    fn dropped_devices_disappear() {
        let before = apply_snapshot(&decode_all(&mixed_lines())).unwrap();
        let after = apply_snapshot(&decode_all(&scenario_lines(42, Mode::Manual))).unwrap();
        assert!(before.find_by_rf_address(RfAddress::new(SHUTTER_RF)).is_ok());
        assert!(matches!(
            after.find_by_rf_address(RfAddress::new(SHUTTER_RF)),
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[test]
    fn later_live_frames_win() {
        let mut lines = scenario_lines(42, Mode::Manual);
        lines.push(live_line(&[thermostat_record(THERMOSTAT_RF, Mode::Automatic, 40, 0, 199)]));
        let gateway = apply_snapshot(&decode_all(&lines)).unwrap();
        let device = gateway.find_by_rf_address(RfAddress::new(THERMOSTAT_RF)).unwrap();
        assert_eq!(device.mode(), Some(Mode::Automatic));
        assert_eq!(device.valve_position(), Some(0));
    }

    #[test]
    fn device_without_live_record() {
        let mut lines = scenario_lines(42, Mode::Manual);
        lines[3] = live_line(&[]);
        let gateway = apply_snapshot(&decode_all(&lines)).unwrap();
        let device = &gateway.devices[0];
        assert!(device.link_error);
        assert_eq!(device.mode(), None);
        assert_eq!(device.target_temperature(), None);
    }

    #[test]
    fn unlisted_room_gets_placeholder() {
        let mut lines = scenario_lines(42, Mode::Manual);
        lines[1] = metadata_line(
            &[(1, "Living Room", ROOM_RF)],
            &[DeviceSpec {
                device_type: DeviceType::Thermostat,
                rf: THERMOSTAT_RF,
                serial: "KEQ0000001",
                name: "Radiator",
                room_id: 7,
            }],
        );
        let gateway = apply_snapshot(&decode_all(&lines)).unwrap();
        assert_eq!(gateway.rooms.len(), 2);
        let room = gateway.room_by_id(7).unwrap();
        assert_eq!(room.name, "Room 7");
        assert!(room.contains(RfAddress::new(THERMOSTAT_RF)));
    }

    #[test]
    fn ack_overrides_hello_counters() {
        let mut lines = scenario_lines(42, Mode::Manual);
        lines.push("S:11,0,2a".to_string());
        let gateway = apply_snapshot(&decode_all(&lines)).unwrap();
        assert_eq!(gateway.duty_cycle, Some(0x11));
        assert_eq!(gateway.free_memory_slots, Some(0x2A));
    }

    #[test]
    fn incomplete_snapshots_are_protocol_errors() {
        let lines = scenario_lines(42, Mode::Manual);
        let all = decode_all(&lines);
        for skip in [0usize, 1, 3] {
            let partial: Vec<Message> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, m)| m.clone())
                .collect();
            assert!(matches!(apply_snapshot(&partial), Err(Error::Protocol(_))));
        }
    }

    #[test]
    fn serializes_to_json() {
        let gateway = apply_snapshot(&decode_all(&scenario_lines(42, Mode::Manual))).unwrap();
        let json = serde_json::to_value(&gateway).unwrap();
        assert_eq!(json["devices"][0]["rf_address"], "1234AB");
        assert_eq!(json["devices"][0]["state"]["kind"], "thermostat");
        assert_eq!(json["devices"][0]["state"]["target_temperature"], 21.0);
        assert_eq!(json["rooms"][0]["name"], "Living Room");
    }
}
