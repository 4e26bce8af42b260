//! Gateway session manager.
//!
//! A [`Session`] owns at most one connection to the gateway and drives the
//! half-duplex exchange over it: write one request, read frames until the
//! terminal frame for that request arrives. It is not shareable; the
//! [`CubePoller`](crate::poller::CubePoller) serializes access to it.
//!
//! Any socket-level failure, timeout or malformed frame tears the
//! connection down and leaves the session `Disconnected`. Nothing here
//! reconnects behind the caller's back.
//!
//! Dropping an operation's future closes the exchange too: the next call
//! finds the session stuck mid-phase and discards that connection first.

mod phase;

pub use phase::SessionPhase;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::CubeCodec;
use crate::error::Error;
use crate::message::{Ack, GatewayInfo, Message, Request, SetCommand};
use crate::network::Connector;

/// Default overall deadline for a full-state read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for a command acknowledgement.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll intervals up to this length keep the connection open under
/// [`ConnectionPolicy::Auto`].
pub const PERSISTENT_INTERVAL_LIMIT: Duration = Duration::from_secs(300);

const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

// ── ConnectionPolicy ─────────────────────────────────────────────

/// Whether the socket stays open between operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionPolicy {
    /// Persistent for short poll intervals, per-call for long ones.
    #[default]
    Auto,
    Persistent,
    PerCall,
}

impl ConnectionPolicy {
    pub fn is_persistent(self, poll_interval: Duration) -> bool {
        match self {
            ConnectionPolicy::Auto => poll_interval <= PERSISTENT_INTERVAL_LIMIT,
            ConnectionPolicy::Persistent => true,
            ConnectionPolicy::PerCall => false,
        }
    }
}

impl std::str::FromStr for ConnectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ConnectionPolicy::Auto),
            "persistent" => Ok(ConnectionPolicy::Persistent),
            "per-call" | "per_call" => Ok(ConnectionPolicy::PerCall),
            other => Err(format!("unknown connection policy {other:?}")),
        }
    }
}

// ── SessionConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Keep the socket open across operations.
    pub persistent: bool,
    /// Overall deadline for reading a complete dump.
    pub read_timeout: Duration,
    /// Deadline for the acknowledgement of a command.
    pub command_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persistent: true,
            read_timeout: DEFAULT_READ_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Resolve `policy` against the expected poll interval.
    pub fn for_policy(policy: ConnectionPolicy, poll_interval: Duration) -> Self {
        Self {
            persistent: policy.is_persistent(poll_interval),
            ..Self::default()
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

/// What came back for a command: the acknowledgement and any status frames
/// the gateway emitted ahead of it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub ack: Ack,
    pub frames: Vec<Message>,
}

// ── Session ──────────────────────────────────────────────────────

pub struct Session<C: Connector> {
    connector: C,
    config: SessionConfig,
    phase: SessionPhase,
    transport: Option<Framed<C::Stream, CubeCodec>>,
    // Structural frames (H/M/C) of the last handshake.
    handshake: Vec<Message>,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            phase: SessionPhase::Disconnected,
            transport: None,
            handshake: Vec::new(),
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns `true` while an idle connection is open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some() && self.phase.is_ready()
    }

    /// Gateway identity from the most recent handshake, with duty cycle and
    /// free slots refreshed by later acknowledgements.
    pub fn gateway_info(&self) -> Option<&GatewayInfo> {
        self.handshake.iter().find_map(|m| match m {
            Message::Hello(info) => Some(info),
            _ => None,
        })
    }

    /// Open a connection and read the gateway's initial dump.
    ///
    /// Returns every frame of the dump, ending with the `L:` frame.
    pub async fn connect(&mut self) -> Result<Vec<Message>, Error> {
        self.discard_interrupted();
        self.phase.begin_connect()?;
        info!(gateway = %self.connector.describe(), "connecting to gateway");

        let stream = match self.connector.connect().await {
            Ok(stream) => stream,
            Err(e) => return Err(self.teardown(e)),
        };
        self.phase.begin_handshake()?;

        let mut transport = Framed::new(stream, CubeCodec::new());
        let frames = match read_dump(&mut transport, None, self.config.read_timeout).await {
            Ok(frames) => frames,
            Err(e) => return Err(self.teardown(e)),
        };

        self.transport = Some(transport);
        self.handshake = frames.iter().filter(|m| m.is_structural()).cloned().collect();
        self.phase.complete_handshake()?;
        info!(
            gateway = %self.connector.describe(),
            frames = frames.len(),
            "handshake complete"
        );
        Ok(frames)
    }

    /// Read a complete state dump.
    ///
    /// Reuses an open connection by asking for fresh live data; otherwise
    /// connects and takes the handshake dump. In per-call mode the
    /// connection is closed again before returning.
    pub async fn read_full_state(&mut self) -> Result<Vec<Message>, Error> {
        self.discard_interrupted();
        match self.phase {
            SessionPhase::Disconnected => {
                let frames = self.connect().await?;
                if !self.config.persistent {
                    self.disconnect().await;
                }
                Ok(frames)
            }
            SessionPhase::Ready { .. } => self.reread().await,
            _ => Err(Error::InvalidState("cannot read state: session not idle")),
        }
    }

    async fn reread(&mut self) -> Result<Vec<Message>, Error> {
        self.phase.begin_operation()?;
        let limit = self.config.read_timeout;
        let result = match self.transport.as_mut() {
            Some(transport) => read_dump(transport, Some(Request::LiveData), limit).await,
            None => Err(Error::InvalidState("ready session without a transport")),
        };
        let frames = match result {
            Ok(frames) => frames,
            Err(e) => return Err(self.teardown(e)),
        };
        self.phase.finish_operation()?;

        if frames.iter().any(|m| matches!(m, Message::Hello(_))) {
            // The gateway re-sent its whole dump.
            self.handshake = frames.iter().filter(|m| m.is_structural()).cloned().collect();
            return Ok(frames);
        }
        let mut snapshot = self.handshake.clone();
        snapshot.extend(frames);
        Ok(snapshot)
    }

    /// Write a set command and wait for the gateway's acknowledgement.
    ///
    /// Connects first when no connection is open. A missing acknowledgement
    /// within the command timeout is [`Error::Timeout`]. A negative
    /// acknowledgement is returned as-is; interpreting it is up to the caller.
    pub async fn send_command(&mut self, command: SetCommand) -> Result<CommandReply, Error> {
        self.discard_interrupted();
        if self.phase.is_disconnected() {
            self.connect().await?;
        }
        self.phase.begin_operation()?;
        debug!(
            rf = %command.rf_address,
            mode = %command.mode,
            temperature = ?command.temperature,
            "sending set command"
        );

        let limit = self.config.command_timeout;
        let result = match self.transport.as_mut() {
            Some(transport) => {
                match timeout(limit, exchange(transport, Request::Set(command), is_ack)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(limit)),
                }
            }
            None => Err(Error::InvalidState("ready session without a transport")),
        };
        let mut frames = match result {
            Ok(frames) => frames,
            Err(e) => return Err(self.teardown(e)),
        };
        let ack = match frames.pop() {
            Some(Message::Ack(ack)) => ack,
            _ => {
                let e = Error::Protocol("command exchange ended without an acknowledgement".into());
                return Err(self.teardown(e));
            }
        };

        self.record_ack(&ack);
        self.phase.finish_operation()?;
        if !self.config.persistent {
            self.disconnect().await;
        }
        Ok(CommandReply { ack, frames })
    }

    /// Close the connection if one is open. Never fails; safe to repeat.
    pub async fn disconnect(&mut self) {
        self.phase.force_disconnect();
        if let Some(mut transport) = self.transport.take() {
            // The gateway may already be gone.
            let _ = timeout(QUIT_TIMEOUT, transport.send(Request::Quit)).await;
            info!(gateway = %self.connector.describe(), "disconnected from gateway");
        }
    }

    fn record_ack(&mut self, ack: &Ack) {
        for message in &mut self.handshake {
            if let Message::Hello(info) = message {
                info.duty_cycle = Some(ack.duty_cycle);
                info.free_memory_slots = Some(ack.free_memory_slots);
            }
        }
    }

    /// A previous operation was dropped before it finished. Whatever it left
    /// on the wire is unknown, so the connection goes.
    fn discard_interrupted(&mut self) {
        if self.phase.is_disconnected() || self.phase.is_ready() {
            return;
        }
        let _ = self.teardown(Error::InvalidState("previous operation was cancelled"));
    }

    fn teardown(&mut self, err: Error) -> Error {
        warn!(
            gateway = %self.connector.describe(),
            phase = %self.phase,
            error = %err,
            "dropping gateway connection"
        );
        self.transport = None;
        self.phase.force_disconnect();
        err
    }
}

impl<C: Connector> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("gateway", &self.connector.describe())
            .field("phase", &self.phase)
            .field("config", &self.config)
            .finish()
    }
}

// ── Wire helpers ─────────────────────────────────────────────────

fn is_ack(message: &Message) -> bool {
    matches!(message, Message::Ack(_))
}

/// Optionally write `request`, then read until an `L:` frame. Running out
/// of time is a protocol failure: the gateway owes us the terminal frame.
async fn read_dump<S>(
    transport: &mut Framed<S, CubeCodec>,
    request: Option<Request>,
    limit: Duration,
) -> Result<Vec<Message>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let read = async move {
        match request {
            Some(request) => exchange(transport, request, Message::is_end_of_dump).await,
            None => read_until(transport, Message::is_end_of_dump).await,
        }
    };
    match timeout(limit, read).await {
        Ok(result) => result,
        Err(_) => Err(Error::Protocol(format!(
            "end of dump not received within {limit:?}"
        ))),
    }
}

async fn exchange<S>(
    transport: &mut Framed<S, CubeCodec>,
    request: Request,
    done: fn(&Message) -> bool,
) -> Result<Vec<Message>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    transport.send(request).await?;
    read_until(transport, done).await
}

async fn read_until<S>(
    transport: &mut Framed<S, CubeCodec>,
    done: fn(&Message) -> bool,
) -> Result<Vec<Message>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frames = Vec::new();
    loop {
        let Some(frame) = transport.next().await else {
            return Err(Error::closed_by_peer());
        };
        let frame = frame?;
        debug!(tag = %frame.tag(), "frame received");
        let last = done(&frame);
        frames.push(frame);
        if last {
            return Ok(frames);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
