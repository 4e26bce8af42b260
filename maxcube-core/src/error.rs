//! Domain-specific error types for the MAX! Cube core.
//!
//! All fallible operations return `Result<T, Error>`.
//! No panics on gateway input. Every error is typed and recoverable,
//! and none of them is fatal to the hosting process.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for gateway sessions, commands and refreshes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection Errors ────────────────────────────────────────
    /// Socket establishment failed, or an open socket was reset or half-closed.
    #[error("connection error: {0}")]
    Connect(#[from] std::io::Error),

    /// No response arrived before the deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Data Errors ──────────────────────────────────────────────
    /// The gateway sent well-formed frames in an order or combination
    /// that the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A single frame could not be decoded.
    #[error("malformed frame: {0}")]
    Format(#[from] FormatError),

    // ── Command Errors ───────────────────────────────────────────
    /// The caller asked for a command the target device cannot accept.
    /// Raised before any I/O takes place.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The gateway answered a command with a negative acknowledgement.
    #[error("command rejected by gateway (duty cycle {duty_cycle}%, {free_slots} free slots)")]
    CommandRejected { duty_cycle: u8, free_slots: u8 },

    /// No device with the given rf address exists in the current snapshot.
    #[error("device {0} not found")]
    DeviceNotFound(String),

    // ── Orchestration Errors ─────────────────────────────────────
    /// A refresh failed; the previous snapshot stays in place.
    #[error("refresh failed: {0}")]
    RefreshFailed(#[source] Box<Error>),

    /// A session phase transition was attempted from the wrong phase.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Returns `true` for socket-level failures (refused, reset, half-closed).
    ///
    /// These are the only failures the poller retries, and only once.
    pub fn is_connect(&self) -> bool {
        match self {
            Error::Connect(_) => true,
            Error::RefreshFailed(inner) => inner.is_connect(),
            _ => false,
        }
    }

    /// Returns `true` when the frame content itself was corrupt or unexpected.
    pub fn is_data_corruption(&self) -> bool {
        matches!(self, Error::Format(_) | Error::Protocol(_))
    }

    /// Build a `Connect` error for a socket the gateway closed on us.
    pub fn closed_by_peer() -> Self {
        Error::Connect(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by gateway",
        ))
    }
}

// ── FormatError ──────────────────────────────────────────────────

/// Typed decode failure for a single line of the gateway protocol.
///
/// None of these are retried; they surface as data corruption and the
/// session tears the connection down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The line or its binary payload ended before a required field.
    #[error("truncated {what}: need {needed} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        needed: usize,
        actual: usize,
    },

    /// The payload is not valid base64 (or the header field is not valid hex).
    #[error("invalid encoding in {0}")]
    InvalidEncoding(&'static str),

    /// The line does not start with a known `X:` tag.
    #[error("unrecognized tag: {0:?}")]
    UnknownTag(String),

    /// A declared length disagrees with the bytes actually present.
    #[error("length mismatch in {what}: declared {declared}, actual {actual}")]
    LengthMismatch {
        what: &'static str,
        declared: usize,
        actual: usize,
    },

    /// A field holds a value outside its domain.
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    /// The line exceeded the framing limit before a terminator arrived.
    #[error("line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },
}

// ── Tests ────────────────────────────────────────────────────────
