use serde::Serialize;

use crate::error::Error;
use crate::message::RfAddress;

use super::{Device, Room};

/// Immutable picture of one gateway, rebuilt from scratch on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gateway {
    pub serial: String,
    pub rf_address: RfAddress,
    pub firmware_version: String,
    pub duty_cycle: Option<u8>,
    pub free_memory_slots: Option<u8>,
    /// `host:port` the snapshot was read from; empty when unknown.
    pub address: String,
    /// Whether the session keeps its connection between polls.
    pub persistent: bool,
    pub rooms: Vec<Room>,
    pub devices: Vec<Device>,
}

impl Gateway {
    /// Look a device up by radio address, the only identity stable
    /// across refreshes.
    pub fn find_by_rf_address(&self, rf_address: RfAddress) -> Result<&Device, Error> {
        self.devices
            .iter()
            .find(|d| d.rf_address == rf_address)
            .ok_or_else(|| Error::DeviceNotFound(rf_address.to_string()))
    }

    pub fn room_by_id(&self, id: u8) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    pub fn devices_in_room(&self, room_id: u8) -> impl Iterator<Item = &Device> + '_ {
        self.devices.iter().filter(move |d| d.room_id == room_id)
    }

    /// `"<room> <device>"`, or just the device name when the room is unknown.
    pub fn display_name(&self, device: &Device) -> String {
        match self.room_by_id(device.room_id) {
            Some(room) => format!("{} {}", room.name, device.name),
            None => device.name.clone(),
        }
    }

    /// Highest valve opening among the radiator thermostats in a room.
    pub fn max_valve_in_room(&self, room_id: u8) -> Option<u8> {
        self.devices_in_room(room_id)
            .filter_map(Device::valve_position)
            .max()
    }
}
