//! Session lifecycle state machine.
//!
//! Provides a `SessionPhase` enum that models the full lifecycle of one
//! gateway connection, with validated transitions that return `Result`
//! instead of panicking.

use std::time::{Duration, Instant};

use crate::error::Error;

/// The current phase of a gateway session.
///
/// ```text
///  Disconnected ──► Connecting ──► Handshaking ──► Ready ◄──► Busy
///       ▲                │               │           │         │
///       └────────────────┴───────────────┴───────────┴─────────┘
///                         (failure / disconnect)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No socket. Initial / terminal state.
    #[default]
    Disconnected,

    /// Waiting for the connector to hand over a stream.
    Connecting,

    /// Socket is up; reading the gateway's initial dump.
    Handshaking,

    /// Idle connection, ready for the next operation.
    Ready {
        /// When the handshake completed.
        since: Instant,
    },

    /// A request/response exchange is on the wire.
    Busy {
        /// When the handshake completed.
        since: Instant,
    },
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Ready { .. } => write!(f, "Ready"),
            Self::Busy { .. } => write!(f, "Busy"),
        }
    }
}

impl SessionPhase {
    /// Returns `true` when an idle connection can take a request.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the current connection has been established.
    ///
    /// Returns `None` before the handshake completes.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Ready { since } | Self::Busy { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), Error> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(Error::InvalidState("cannot connect: not in Disconnected state")),
        }
    }

    /// Valid from: `Connecting`.
    pub fn begin_handshake(&mut self) -> Result<(), Error> {
        match self {
            Self::Connecting => {
                *self = Self::Handshaking;
                Ok(())
            }
            _ => Err(Error::InvalidState("cannot handshake: not in Connecting state")),
        }
    }

    /// Valid from: `Handshaking`.
    pub fn complete_handshake(&mut self) -> Result<(), Error> {
        match self {
            Self::Handshaking => {
                *self = Self::Ready {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(Error::InvalidState(
                "cannot complete handshake: not in Handshaking state",
            )),
        }
    }

    /// Valid from: `Ready`.
    pub fn begin_operation(&mut self) -> Result<(), Error> {
        match *self {
            Self::Ready { since } => {
                *self = Self::Busy { since };
                Ok(())
            }
            _ => Err(Error::InvalidState("cannot start operation: session not Ready")),
        }
    }

    /// Valid from: `Busy`.
    pub fn finish_operation(&mut self) -> Result<(), Error> {
        match *self {
            Self::Busy { since } => {
                *self = Self::Ready { since };
                Ok(())
            }
            _ => Err(Error::InvalidState("cannot finish operation: session not Busy")),
        }
    }

    /// Drop back to `Disconnected` from any phase.
    ///
    /// Used for every failure and for explicit disconnects.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_operate_disconnect() {
        let mut phase = SessionPhase::Disconnected;

        phase.begin_connect().unwrap();
        assert_eq!(phase, SessionPhase::Connecting);

        phase.begin_handshake().unwrap();
        assert_eq!(phase, SessionPhase::Handshaking);

        phase.complete_handshake().unwrap();
        assert!(phase.is_ready());
        assert!(phase.connected_duration().is_some());

        phase.begin_operation().unwrap();
        assert!(phase.is_busy());
        phase.finish_operation().unwrap();
        assert!(phase.is_ready());

        phase.force_disconnect();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn busy_keeps_connection_age() {
        let since = Instant::now();
        let mut phase = SessionPhase::Ready { since };
        phase.begin_operation().unwrap();
        assert_eq!(phase, SessionPhase::Busy { since });
    }

    #[test]
    fn connect_while_ready_is_rejected() {
        let mut phase = SessionPhase::Ready {
            since: Instant::now(),
        };
        assert!(phase.begin_connect().is_err());
    }

    #[test]
    fn handshake_requires_connecting() {
        let mut phase = SessionPhase::Disconnected;
        assert!(phase.begin_handshake().is_err());
    }

    #[test]
    fn invalid_operation_while_busy() {
        let mut phase = SessionPhase::Busy {
            since: Instant::now(),
        };
        assert!(phase.begin_operation().is_err());
    }

    #[test]
    fn finish_without_start() {
        let mut phase = SessionPhase::Disconnected;
        assert!(phase.finish_operation().is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionPhase::Disconnected.to_string(), "Disconnected");
        assert_eq!(SessionPhase::Handshaking.to_string(), "Handshaking");
        assert_eq!(
            SessionPhase::Busy {
                since: Instant::now()
            }
            .to_string(),
            "Busy"
        );
    }

    #[test]
    fn starts_disconnected() {
        assert!(SessionPhase::default().is_disconnected());
    }
}
