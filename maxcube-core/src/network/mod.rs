//! Transport seam between the session and the socket.
//!
//! The session never opens sockets itself; it asks a [`Connector`] for a
//! fresh byte stream. Production code uses [`TcpConnector`], tests hand out
//! in-memory duplex pipes or scripted mocks.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::Error;

/// Default TCP port of the MAX! Cube.
pub const DEFAULT_PORT: u16 = 62910;

/// Default deadline for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces connected byte streams to one gateway.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new stream. Refusal, DNS failure and timeout all map to
    /// [`Error::Connect`].
    async fn connect(&self) -> Result<Self::Stream, Error>;

    /// Where this connector points, for logging.
    fn describe(&self) -> String;
}

// ── ConnectionInfo ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── TcpConnector ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TcpConnector {
    info: ConnectionInfo,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream, Error> {
        let addr = (self.info.host.as_str(), self.info.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::Connect(e)),
            Err(_) => Err(Error::Connect(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {} timed out after {:?}", self.info, self.connect_timeout),
            ))),
        }
    }

    fn describe(&self) -> String {
        self.info.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn connection_info_display() {
        let info = ConnectionInfo::new("192.168.0.20", DEFAULT_PORT);
        assert_eq!(info.to_string(), "192.168.0.20:62910");
    }

    #[tokio::test]
    async fn tcp_connect_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connector = TcpConnector::new(ConnectionInfo::new("127.0.0.1", port));
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        connector.connect().await.unwrap();
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_connect_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = TcpConnector::new(ConnectionInfo::new("127.0.0.1", port))
            .with_connect_timeout(Duration::from_secs(2));
        let err = connector.connect().await.unwrap_err();
        assert!(err.is_connect());
    }
}
