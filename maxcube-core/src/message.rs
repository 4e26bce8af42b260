//! Protocol message types and the typed records they carry.
//!
//! Uses proper enums with `TryFrom`; no panics on unknown values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;
use crate::flags::StatusFlags;
use crate::temperature::Temperature;

// ── RfAddress ────────────────────────────────────────────────────

/// Three-byte radio address; the only identity that survives a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RfAddress([u8; 3]);

impl RfAddress {
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }
}

impl fmt::Display for RfAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for RfAddress {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 6 || !s.is_ascii() {
            return Err(FormatError::InvalidField {
                field: "rf address",
                value: s.to_string(),
            });
        }
        let mut bytes = [0u8; 3];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| FormatError::InvalidEncoding("rf address"))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for RfAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RfAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Mode ─────────────────────────────────────────────────────────

/// Operating mode of a thermostat, as carried in the two low mode bits.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The weekly schedule governs the setpoint.
    Automatic = 0,
    /// A fixed setpoint chosen by the user.
    Manual = 1,
    /// A fixed setpoint until a given date.
    Vacation = 2,
    /// Valve fully open for the configured boost duration.
    Boost = 3,
}

impl Mode {
    /// Decode the two mode bits; higher bits are ignored.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Mode::Automatic,
            1 => Mode::Manual,
            2 => Mode::Vacation,
            _ => Mode::Boost,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Automatic => write!(f, "automatic"),
            Mode::Manual => write!(f, "manual"),
            Mode::Vacation => write!(f, "vacation"),
            Mode::Boost => write!(f, "boost"),
        }
    }
}

impl FromStr for Mode {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" | "automatic" => Ok(Mode::Automatic),
            "manual" => Ok(Mode::Manual),
            "vacation" | "away" => Ok(Mode::Vacation),
            "boost" => Ok(Mode::Boost),
            _ => Err(FormatError::InvalidField {
                field: "mode",
                value: s.to_string(),
            }),
        }
    }
}

// ── DeviceType ───────────────────────────────────────────────────

/// Device type code as listed in the room/device metadata.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Cube = 0,
    Thermostat = 1,
    ThermostatPlus = 2,
    WallThermostat = 3,
    WindowShutter = 4,
    EcoSwitch = 5,
}

impl TryFrom<u8> for DeviceType {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceType::Cube),
            1 => Ok(DeviceType::Thermostat),
            2 => Ok(DeviceType::ThermostatPlus),
            3 => Ok(DeviceType::WallThermostat),
            4 => Ok(DeviceType::WindowShutter),
            5 => Ok(DeviceType::EcoSwitch),
            _ => Err(FormatError::InvalidField {
                field: "device type",
                value: value.to_string(),
            }),
        }
    }
}

impl DeviceType {
    /// Radiator thermostats, with or without the plus firmware.
    pub fn is_thermostat(self) -> bool {
        matches!(self, DeviceType::Thermostat | DeviceType::ThermostatPlus)
    }

    pub fn is_wall_thermostat(self) -> bool {
        self == DeviceType::WallThermostat
    }

    pub fn is_window_shutter(self) -> bool {
        self == DeviceType::WindowShutter
    }

    /// Types whose configuration frame carries comfort/eco/min/max setpoints.
    pub fn has_presets(self) -> bool {
        self.is_thermostat() || self.is_wall_thermostat()
    }

    /// Human-readable model name.
    pub fn model_name(self) -> &'static str {
        match self {
            DeviceType::Cube => "Cube",
            DeviceType::Thermostat => "Thermostat",
            DeviceType::ThermostatPlus => "Thermostat+",
            DeviceType::WallThermostat => "Wall Thermostat",
            DeviceType::WindowShutter => "Window Shutter",
            DeviceType::EcoSwitch => "Eco Switch",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.model_name())
    }
}

// ── Tag ──────────────────────────────────────────────────────────

/// The single-character prefix identifying a line's message kind.
///
/// Upper case tags flow from the gateway, lower case tags are requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Hello,
    Metadata,
    Configuration,
    LiveData,
    Ack,
    SetRequest,
    LiveRequest,
    Quit,
}

impl Tag {
    pub fn as_char(self) -> char {
        match self {
            Tag::Hello => 'H',
            Tag::Metadata => 'M',
            Tag::Configuration => 'C',
            Tag::LiveData => 'L',
            Tag::Ack => 'S',
            Tag::SetRequest => 's',
            Tag::LiveRequest => 'l',
            Tag::Quit => 'q',
        }
    }
}

impl TryFrom<&str> for Tag {
    type Error = FormatError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "H" => Ok(Tag::Hello),
            "M" => Ok(Tag::Metadata),
            "C" => Ok(Tag::Configuration),
            "L" => Ok(Tag::LiveData),
            "S" => Ok(Tag::Ack),
            "s" => Ok(Tag::SetRequest),
            "l" => Ok(Tag::LiveRequest),
            "q" => Ok(Tag::Quit),
            other => Err(FormatError::UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.as_char())
    }
}

// ── Records ──────────────────────────────────────────────────────

/// Identity of the gateway itself, from the `H:` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInfo {
    pub serial: String,
    pub rf_address: RfAddress,
    pub firmware_version: String,
    pub duty_cycle: Option<u8>,
    pub free_memory_slots: Option<u8>,
}

/// One `M:` line; large installations split the metadata across several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPart {
    pub index: u8,
    pub count: u8,
    pub payload: Vec<u8>,
}

/// Room and device lists after all metadata parts are joined.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    pub rooms: Vec<RoomRecord>,
    pub devices: Vec<DeviceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: u8,
    pub name: String,
    pub rf_address: RfAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_type: DeviceType,
    pub rf_address: RfAddress,
    pub serial: String,
    pub name: String,
    pub room_id: u8,
}

/// Setpoint presets stored on a thermostat or wall thermostat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presets {
    pub comfort: Temperature,
    pub eco: Temperature,
    pub max: Temperature,
    pub min: Temperature,
}

/// One `C:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub rf_address: RfAddress,
    pub device_type: DeviceType,
    pub room_id: u8,
    pub firmware: u8,
    pub serial: String,
    pub presets: Option<Presets>,
}

/// One device's entry inside an `L:` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRecord {
    pub rf_address: RfAddress,
    pub flags: StatusFlags,
    pub valve_position: Option<u8>,
    pub target_temperature: Option<Temperature>,
    pub actual_temperature: Option<f64>,
}

/// The gateway's answer to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub duty_cycle: u8,
    pub accepted: bool,
    pub free_memory_slots: u8,
}

/// A set-mode/set-temperature request addressed to one device.
///
/// `temperature: None` is encoded as zero half-degrees, which the gateway
/// reads as "keep the schedule / preset value".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCommand {
    pub rf_address: RfAddress,
    pub room_id: u8,
    pub mode: Mode,
    pub temperature: Option<Temperature>,
}

// ── Message ──────────────────────────────────────────────────────

/// A decoded line.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(GatewayInfo),
    Metadata(MetadataPart),
    Configuration(DeviceConfig),
    LiveData(Vec<LiveRecord>),
    Ack(Ack),
    /// An outgoing `s:` request read back, e.g. from a capture.
    SetCommand(SetCommand),
}

impl Message {
    pub fn tag(&self) -> Tag {
        match self {
            Message::Hello(_) => Tag::Hello,
            Message::Metadata(_) => Tag::Metadata,
            Message::Configuration(_) => Tag::Configuration,
            Message::LiveData(_) => Tag::LiveData,
            Message::Ack(_) => Tag::Ack,
            Message::SetCommand(_) => Tag::SetRequest,
        }
    }

    /// `L:` closes every full-state dump.
    pub fn is_end_of_dump(&self) -> bool {
        matches!(self, Message::LiveData(_))
    }

    /// Frames describing structure rather than live state; a persistent
    /// session keeps these from its handshake.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Message::Hello(_) | Message::Metadata(_) | Message::Configuration(_)
        )
    }
}

// ── Request ──────────────────────────────────────────────────────

/// Everything the client may write to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `l:`: ask for a fresh live-status frame.
    LiveData,
    /// `s:`: set mode and temperature.
    Set(SetCommand),
    /// `q:`: polite goodbye before closing.
    Quit,
}
