//! Line-level decoding and encoding.
//!
//! `decode_frame` turns one line (terminator already stripped) into a typed
//! [`Message`]; `encode_command` and [`encode_request`] produce the bytes
//! written to the gateway, terminator included.

use crate::error::FormatError;
use crate::message::{Ack, GatewayInfo, Message, MetadataPart, Request, RfAddress, SetCommand, Tag};
use crate::payload;

pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Decode a single protocol line.
pub fn decode_frame(line: &str) -> Result<Message, FormatError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some((tag, body)) = line.split_once(':') else {
        return Err(FormatError::UnknownTag(line.chars().take(8).collect()));
    };

    match Tag::try_from(tag)? {
        Tag::Hello => decode_hello(body).map(Message::Hello),
        Tag::Metadata => decode_metadata(body).map(Message::Metadata),
        Tag::Configuration => decode_config(body).map(Message::Configuration),
        Tag::LiveData => {
            let bytes = payload::decode_base64(body, "L payload")?;
            payload::parse_live(&bytes).map(Message::LiveData)
        }
        Tag::Ack => decode_ack(body).map(Message::Ack),
        Tag::SetRequest => {
            let bytes = payload::decode_base64(body, "s payload")?;
            payload::parse_set_command(&bytes).map(Message::SetCommand)
        }
        // Requests without a body carry nothing worth decoding.
        other @ (Tag::LiveRequest | Tag::Quit) => Err(FormatError::UnknownTag(other.to_string())),
    }
}

/// Encode a set-mode/set-temperature command as a complete `s:` line.
pub fn encode_command(command: &SetCommand) -> Result<Vec<u8>, FormatError> {
    let body = payload::encode_base64(&payload::build_set_command(command)?);
    Ok(line(Tag::SetRequest, &body))
}

/// Encode any outgoing request as a complete line.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, FormatError> {
    match request {
        Request::LiveData => Ok(line(Tag::LiveRequest, "")),
        Request::Set(command) => encode_command(command),
        Request::Quit => Ok(line(Tag::Quit, "")),
    }
}

fn line(tag: Tag, body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(tag.to_string().as_bytes());
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(LINE_TERMINATOR);
    out
}

// ── Field helpers ────────────────────────────────────────────────

fn fields<'a>(body: &'a str, what: &'static str, min: usize) -> Result<Vec<&'a str>, FormatError> {
    let parts: Vec<&str> = body.split(',').map(str::trim).collect();
    if parts.len() < min || parts[..min].iter().any(|p| p.is_empty()) {
        return Err(FormatError::Truncated {
            what,
            needed: min,
            actual: parts.iter().filter(|p| !p.is_empty()).count(),
        });
    }
    Ok(parts)
}

fn hex_u8(value: &str, field: &'static str) -> Result<u8, FormatError> {
    u8::from_str_radix(value, 16).map_err(|_| FormatError::InvalidField {
        field,
        value: value.to_string(),
    })
}

// ── Per-tag decoders ─────────────────────────────────────────────

fn decode_hello(body: &str) -> Result<GatewayInfo, FormatError> {
    let f = fields(body, "H line", 3)?;
    let optional = |i: usize, field| match f.get(i) {
        Some(v) if !v.is_empty() => hex_u8(v, field).map(Some),
        _ => Ok(None),
    };
    Ok(GatewayInfo {
        serial: f[0].to_string(),
        rf_address: f[1].parse()?,
        firmware_version: f[2].to_string(),
        duty_cycle: optional(5, "H duty cycle")?,
        free_memory_slots: optional(6, "H free memory slots")?,
    })
}

fn decode_metadata(body: &str) -> Result<MetadataPart, FormatError> {
    let f = fields(body, "M line", 3)?;
    let index = hex_u8(f[0], "M part index")?;
    let count = hex_u8(f[1], "M part count")?;
    if count == 0 || index >= count {
        return Err(FormatError::InvalidField {
            field: "M part index",
            value: format!("{index}/{count}"),
        });
    }
    Ok(MetadataPart {
        index,
        count,
        payload: payload::decode_base64(f[2], "M payload")?,
    })
}

fn decode_config(body: &str) -> Result<crate::message::DeviceConfig, FormatError> {
    let f = fields(body, "C line", 2)?;
    let rf: RfAddress = f[0].parse()?;
    let bytes = payload::decode_base64(f[1], "C payload")?;
    payload::parse_config(rf, &bytes)
}

fn decode_ack(body: &str) -> Result<Ack, FormatError> {
    let f = fields(body, "S line", 3)?;
    Ok(Ack {
        duty_cycle: hex_u8(f[0], "S duty cycle")?,
        accepted: f[1] == "0",
        free_memory_slots: hex_u8(f[2], "S free memory slots")?,
    })
}
