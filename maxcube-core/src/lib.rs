//! # maxcube-core
//!
//! Session, codec and polling core for the eQ-3 MAX! Cube LAN gateway.
//!
//! This crate contains:
//! - **Wire codec**: `decode_frame` / `encode_command` and the `CubeCodec` line framer
//! - **Payloads**: base64 binary layouts of the `M`, `C`, `L` and `s` frames
//! - **Network**: the `Connector` seam and its TCP implementation
//! - **Session**: `Session` with its `SessionPhase` state machine and connection policies
//! - **Model**: immutable `Gateway` / `Room` / `Device` snapshots built by `apply_snapshot`
//! - **Command**: validation and dispatch of set-mode/set-temperature requests
//! - **Poller**: `CubePoller`, serializing refreshes and commands over one session
//! - **Climate**: best-effort HVAC mode, action and preset derivation
//! - **Error**: `Error` / `FormatError`, typed, `thiserror`-based error hierarchy

pub mod climate;
pub mod codec;
pub mod command;
pub mod error;
pub mod flags;
pub mod message;
pub mod model;
pub mod network;
pub mod payload;
pub mod poller;
pub mod session;
pub mod temperature;

#[cfg(test)]
mod test_support;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{CubeCodec, decode_frame, encode_command};
pub use command::set_mode_and_temperature;
pub use error::{Error, FormatError};
pub use flags::StatusFlags;
pub use message::{Ack, DeviceType, Message, Mode, Presets, Request, RfAddress, SetCommand, Tag};
pub use model::{Device, DeviceState, Gateway, Room, apply_snapshot};
pub use network::{ConnectionInfo, Connector, DEFAULT_PORT, TcpConnector};
pub use poller::{CubePoller, SnapshotReceiver};
pub use session::{CommandReply, ConnectionPolicy, Session, SessionConfig, SessionPhase};
pub use temperature::Temperature;
