//! Wire fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;
use crate::message::{DeviceType, Message, Mode};
use crate::network::Connector;
use crate::payload::encode_base64;

pub const ROOM_RF: [u8; 3] = [0x0A, 0x0B, 0x0C];
pub const THERMOSTAT_RF: [u8; 3] = [0x12, 0x34, 0xAB];
pub const WALL_RF: [u8; 3] = [0x0A, 0x00, 0x01];
pub const SHUTTER_RF: [u8; 3] = [0x00, 0x00, 0x02];

pub const HELLO: &str = "H:KEQ0523864,097f2c,0113,00000000,477719c0,00,32,0d0c09,1404,03,0000";

pub struct DeviceSpec {
    pub device_type: DeviceType,
    pub rf: [u8; 3],
    pub serial: &'static str,
    pub name: &'static str,
    pub room_id: u8,
}

pub fn metadata_line(rooms: &[(u8, &str, [u8; 3])], devices: &[DeviceSpec]) -> String {
    let mut b = vec![0x56, 0x02, rooms.len() as u8];
    for (id, name, rf) in rooms {
        b.push(*id);
        b.push(name.len() as u8);
        b.extend_from_slice(name.as_bytes());
        b.extend_from_slice(rf);
    }
    b.push(devices.len() as u8);
    for d in devices {
        b.push(d.device_type as u8);
        b.extend_from_slice(&d.rf);
        b.extend_from_slice(d.serial.as_bytes());
        b.push(d.name.len() as u8);
        b.extend_from_slice(d.name.as_bytes());
        b.push(d.room_id);
    }
    b.push(0x01);
    format!("M:00,01,{}", encode_base64(&b))
}

/// Configuration with comfort 21.0, eco 16.5, max 30.5, min 4.5.
pub fn config_line(rf: [u8; 3], device_type: DeviceType, room_id: u8, serial: &str) -> String {
    let mut b = vec![0, rf[0], rf[1], rf[2], device_type as u8, room_id, 0x10, 0];
    b.extend_from_slice(serial.as_bytes());
    if device_type.has_presets() {
        b.extend_from_slice(&[42, 33, 61, 9, 7, 24, 3]);
    }
    b[0] = (b.len() - 1) as u8;
    format!("C:{:02x}{:02x}{:02x},{}", rf[0], rf[1], rf[2], encode_base64(&b))
}

pub fn thermostat_record(rf: [u8; 3], mode: Mode, target_halves: u8, valve: u8, actual_tenths: u16) -> Vec<u8> {
    vec![
        11,
        rf[0],
        rf[1],
        rf[2],
        0x09,
        0x12,
        0x18 | mode.bits(),
        valve,
        target_halves,
        (actual_tenths >> 8) as u8,
        actual_tenths as u8,
        0x00,
    ]
}

pub fn wall_record(rf: [u8; 3], mode: Mode, target_halves: u8, actual_tenths: u16) -> Vec<u8> {
    let high = ((actual_tenths >> 1) & 0x80) as u8;
    vec![
        12,
        rf[0],
        rf[1],
        rf[2],
        0x09,
        0x12,
        0x18 | mode.bits(),
        0,
        high | target_halves,
        0,
        0,
        0,
        actual_tenths as u8,
    ]
}

pub fn basic_record(rf: [u8; 3], flags2: u8) -> Vec<u8> {
    vec![6, rf[0], rf[1], rf[2], 0x09, 0x12, flags2]
}

pub fn live_line(records: &[Vec<u8>]) -> String {
    let joined: Vec<u8> = records.concat();
    format!("L:{}", encode_base64(&joined))
}

/// One room "Living Room" (id 1) with one thermostat at 1234AB in manual
/// mode, target 21.0, valve 40 %, actual 20.3.
pub fn scenario_lines(target_halves: u8, mode: Mode) -> Vec<String> {
    vec![
        HELLO.to_string(),
        metadata_line(
            &[(1, "Living Room", ROOM_RF)],
            &[DeviceSpec {
                device_type: DeviceType::Thermostat,
                rf: THERMOSTAT_RF,
                serial: "KEQ0000001",
                name: "Radiator",
                room_id: 1,
            }],
        ),
        config_line(THERMOSTAT_RF, DeviceType::Thermostat, 1, "KEQ0000001"),
        live_line(&[thermostat_record(THERMOSTAT_RF, mode, target_halves, 40, 203)]),
    ]
}

pub fn to_wire(lines: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

pub fn decode_all(lines: &[String]) -> Vec<Message> {
    lines
        .iter()
        .map(|l| crate::codec::decode_frame(l).unwrap())
        .collect()
}

// ── Scripted connector ───────────────────────────────────────────

/// Hands out pre-built streams in order; refuses once they run out.
pub struct ScriptedConnector<S> {
    streams: Mutex<VecDeque<S>>,
}

impl<S> ScriptedConnector<S> {
    pub fn new(streams: impl IntoIterator<Item = S>) -> Self {
        Self {
            streams: Mutex::new(streams.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

#[async_trait]
impl<S> Connector for ScriptedConnector<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    async fn connect(&self) -> Result<S, Error> {
        self.streams.lock().unwrap().pop_front().ok_or_else(|| {
            Error::Connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no scripted stream left",
            ))
        })
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
