//! Binary payloads carried base64-encoded inside `M:`, `C:`, `L:` and `s:` lines.
//!
//! # Layouts
//!
//! ```text
//! M  56 02 | rooms  | room:   id name_len name.. group_rf(3)
//!          | devs   | device: type rf(3) serial(10) name_len name.. room_id
//!
//! C  len rf(3) type room fw test serial(10) | comfort eco max min ...
//!
//! L  [len rf(3) ?? flags1 flags2 | valve target b9 b10 b11 | b12]*
//!                                 `- thermostats (len 11)    `- wall (len 12)
//!
//! s  00 04 40 00 00 00 rf(3) room (mode << 6 | half_degrees)
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;

use crate::error::FormatError;
use crate::flags::StatusFlags;
use crate::message::{
    DeviceConfig, DeviceRecord, DeviceType, LiveRecord, Metadata, MetadataPart, Mode, Presets,
    RfAddress, RoomRecord, SetCommand,
};
use crate::temperature::Temperature;

/// Length of the serial number field in `M` and `C` payloads.
pub const SERIAL_LENGTH: usize = 10;

/// Size of an encoded `s:` command.
pub const SET_COMMAND_LENGTH: usize = 11;

const SET_COMMAND_PREFIX: [u8; 6] = [0x00, 0x04, 0x40, 0x00, 0x00, 0x00];
const CONFIG_PRESETS_END: usize = 22;
const LIVE_BASIC_LENGTH: usize = 6;
const LIVE_THERMOSTAT_LENGTH: usize = 11;
const LIVE_WALL_THERMOSTAT_LENGTH: usize = 12;

// ── base64 ───────────────────────────────────────────────────────

pub fn decode_base64(text: &str, what: &'static str) -> Result<Vec<u8>, FormatError> {
    Base64Standard
        .decode(text.trim())
        .map_err(|_| FormatError::InvalidEncoding(what))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    Base64Standard.encode(bytes)
}

// ── Reader ───────────────────────────────────────────────────────

/// Bounds-checked cursor; every short read becomes `FormatError::Truncated`.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { bytes, pos: 0, what }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(FormatError::Truncated {
                what: self.what,
                needed: end,
                actual: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    fn rf(&mut self) -> Result<RfAddress, FormatError> {
        let b = self.take(3)?;
        Ok(RfAddress::new([b[0], b[1], b[2]]))
    }

    fn text(&mut self, n: usize) -> Result<String, FormatError> {
        Ok(String::from_utf8_lossy(self.take(n)?).into_owned())
    }

    fn short_text(&mut self) -> Result<String, FormatError> {
        let len = self.u8()? as usize;
        self.text(len)
    }
}

// ── M ────────────────────────────────────────────────────────────

/// Join metadata parts in index order and parse the result.
///
/// Fails when a part is missing, duplicated, or the parts disagree on
/// the total count.
pub fn assemble_metadata(parts: &[&MetadataPart]) -> Result<Metadata, FormatError> {
    let Some(first) = parts.first() else {
        return Err(FormatError::Truncated {
            what: "M parts",
            needed: 1,
            actual: 0,
        });
    };
    let count = first.count as usize;
    if parts.len() != count || parts.iter().any(|p| p.count as usize != count) {
        return Err(FormatError::LengthMismatch {
            what: "M parts",
            declared: count,
            actual: parts.len(),
        });
    }

    let mut ordered: Vec<&MetadataPart> = parts.to_vec();
    ordered.sort_by_key(|p| p.index);
    let mut joined = Vec::new();
    for (expected, part) in ordered.iter().enumerate() {
        if part.index as usize != expected {
            return Err(FormatError::InvalidField {
                field: "M part index",
                value: part.index.to_string(),
            });
        }
        joined.extend_from_slice(&part.payload);
    }
    parse_metadata(&joined)
}

pub fn parse_metadata(bytes: &[u8]) -> Result<Metadata, FormatError> {
    let mut r = Reader::new(bytes, "M payload");
    r.take(2)?;

    let room_count = r.u8()?;
    let mut rooms = Vec::with_capacity(room_count as usize);
    for _ in 0..room_count {
        let id = r.u8()?;
        let name = r.short_text()?;
        let rf_address = r.rf()?;
        rooms.push(RoomRecord { id, name, rf_address });
    }

    let device_count = r.u8()?;
    let mut devices = Vec::with_capacity(device_count as usize);
    for _ in 0..device_count {
        let device_type = DeviceType::try_from(r.u8()?)?;
        let rf_address = r.rf()?;
        let serial = r.text(SERIAL_LENGTH)?;
        let name = r.short_text()?;
        let room_id = r.u8()?;
        devices.push(DeviceRecord {
            device_type,
            rf_address,
            serial,
            name,
            room_id,
        });
    }

    Ok(Metadata { rooms, devices })
}

// ── C ────────────────────────────────────────────────────────────

/// Parse a configuration payload announced for `line_rf`.
pub fn parse_config(line_rf: RfAddress, bytes: &[u8]) -> Result<DeviceConfig, FormatError> {
    let Some((&declared, rest)) = bytes.split_first() else {
        return Err(FormatError::Truncated {
            what: "C payload",
            needed: 1,
            actual: 0,
        });
    };
    if declared as usize != rest.len() {
        return Err(FormatError::LengthMismatch {
            what: "C payload",
            declared: declared as usize,
            actual: rest.len(),
        });
    }

    let mut r = Reader::new(bytes, "C payload");
    r.u8()?;
    let rf_address = r.rf()?;
    if rf_address != line_rf {
        return Err(FormatError::InvalidField {
            field: "C rf address",
            value: format!("{rf_address} (line says {line_rf})"),
        });
    }
    let device_type = DeviceType::try_from(r.u8()?)?;
    let room_id = r.u8()?;
    let firmware = r.u8()?;
    r.u8()?;
    let serial = r.text(SERIAL_LENGTH)?;

    let presets = if device_type.has_presets() {
        let p = r.take(CONFIG_PRESETS_END - r.pos)?;
        Some(Presets {
            comfort: Temperature::from_half_degrees(p[0]),
            eco: Temperature::from_half_degrees(p[1]),
            max: Temperature::from_half_degrees(p[2]),
            min: Temperature::from_half_degrees(p[3]),
        })
    } else {
        None
    };

    Ok(DeviceConfig {
        rf_address,
        device_type,
        room_id,
        firmware,
        serial,
        presets,
    })
}

// ── L ────────────────────────────────────────────────────────────

pub fn parse_live(bytes: &[u8]) -> Result<Vec<LiveRecord>, FormatError> {
    let mut records = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = bytes[pos] as usize;
        let end = pos + 1 + len;
        if end > bytes.len() {
            return Err(FormatError::LengthMismatch {
                what: "L record",
                declared: len,
                actual: bytes.len() - pos - 1,
            });
        }
        records.push(parse_live_record(&bytes[pos..end])?);
        pos = end;
    }
    Ok(records)
}

/// `rec[0]` is the record's own length byte.
fn parse_live_record(rec: &[u8]) -> Result<LiveRecord, FormatError> {
    let len = rec.len() - 1;
    if len < LIVE_BASIC_LENGTH {
        return Err(FormatError::Truncated {
            what: "L record",
            needed: LIVE_BASIC_LENGTH,
            actual: len,
        });
    }

    let rf_address = RfAddress::new([rec[1], rec[2], rec[3]]);
    let flags = StatusFlags::from_byte(rec[6]);
    let mut record = LiveRecord {
        rf_address,
        flags,
        valve_position: None,
        target_temperature: None,
        actual_temperature: None,
    };

    match len {
        LIVE_BASIC_LENGTH => {}
        LIVE_THERMOSTAT_LENGTH => {
            record.valve_position = Some(rec[7]);
            record.target_temperature = Some(Temperature::from_half_degrees(rec[8] & 0x7F));
            // In vacation/boost these bytes hold the "until" date instead.
            if matches!(flags.mode(), Mode::Automatic | Mode::Manual) {
                let tenths = ((rec[9] as u16 & 0x01) << 8) | rec[10] as u16;
                record.actual_temperature = tenths_to_celsius(tenths);
            }
        }
        LIVE_WALL_THERMOSTAT_LENGTH => {
            record.valve_position = Some(rec[7]);
            record.target_temperature = Some(Temperature::from_half_degrees(rec[8] & 0x7F));
            let tenths = ((rec[8] as u16 & 0x80) << 1) | rec[12] as u16;
            record.actual_temperature = tenths_to_celsius(tenths);
        }
        other if other < LIVE_THERMOSTAT_LENGTH => {
            return Err(FormatError::Truncated {
                what: "L thermostat record",
                needed: LIVE_THERMOSTAT_LENGTH,
                actual: other,
            });
        }
        other => {
            return Err(FormatError::InvalidField {
                field: "L record length",
                value: other.to_string(),
            });
        }
    }

    Ok(record)
}

fn tenths_to_celsius(tenths: u16) -> Option<f64> {
    (tenths != 0).then(|| tenths as f64 / 10.0)
}

// ── s ────────────────────────────────────────────────────────────

/// Build the 11-byte `s:` payload. The temperature field is six bits wide,
/// so setpoints outside the commandable range are refused.
pub fn build_set_command(command: &SetCommand) -> Result<[u8; SET_COMMAND_LENGTH], FormatError> {
    let halves = match command.temperature {
        Some(t) if !t.is_commandable() => {
            return Err(FormatError::InvalidField {
                field: "s temperature",
                value: t.to_string(),
            });
        }
        Some(t) => t.half_degrees(),
        None => 0,
    };
    let rf = command.rf_address.bytes();
    let mut out = [0u8; SET_COMMAND_LENGTH];
    out[..6].copy_from_slice(&SET_COMMAND_PREFIX);
    out[6..9].copy_from_slice(&rf);
    out[9] = command.room_id;
    out[10] = (command.mode.bits() << 6) | (halves & 0x3F);
    Ok(out)
}

pub fn parse_set_command(bytes: &[u8]) -> Result<SetCommand, FormatError> {
    if bytes.len() != SET_COMMAND_LENGTH {
        return Err(FormatError::LengthMismatch {
            what: "s payload",
            declared: SET_COMMAND_LENGTH,
            actual: bytes.len(),
        });
    }
    if bytes[2] != SET_COMMAND_PREFIX[2] {
        return Err(FormatError::InvalidField {
            field: "s command type",
            value: format!("{:#04x}", bytes[2]),
        });
    }
    let halves = bytes[10] & 0x3F;
    Ok(SetCommand {
        rf_address: RfAddress::new([bytes[6], bytes[7], bytes[8]]),
        room_id: bytes[9],
        mode: Mode::from_bits(bytes[10] >> 6),
        temperature: (halves != 0).then(|| Temperature::from_half_degrees(halves)),
    })
}

// ── Tests ────────────────────────────────────────────────────────
