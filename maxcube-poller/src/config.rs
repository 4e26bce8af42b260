//! Configuration for the poller service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use maxcube_core::network::DEFAULT_PORT;
use maxcube_core::{ConnectionInfo, ConnectionPolicy, SessionConfig, TcpConnector};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Where the gateway lives.
    pub gateway: GatewayConfig,
    /// Poll cadence and connection policy.
    pub polling: PollingConfig,
    /// Network deadlines.
    pub timeouts: TimeoutConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host name or IP address of the Cube. Required.
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between full refreshes.
    pub interval_secs: u64,
    /// "auto", "persistent" or "per-call".
    pub connection: ConnectionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    /// Overall deadline for one full-state read.
    pub read_ms: u64,
    /// Deadline for a command acknowledgement.
    pub command_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            connection: ConnectionPolicy::Auto,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            read_ms: 10_000,
            command_ms: 5_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl PollerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_secs.max(1))
    }

    /// Resolve the connection policy and timeouts into session settings.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig::for_policy(self.polling.connection, self.poll_interval())
            .with_read_timeout(Duration::from_millis(self.timeouts.read_ms.max(1)))
            .with_command_timeout(Duration::from_millis(self.timeouts.command_ms.max(1)))
    }

    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(ConnectionInfo::new(self.gateway.host.clone(), self.gateway.port))
            .with_connect_timeout(Duration::from_millis(self.timeouts.connect_ms.max(1)))
    }
}

// ── Tests ────────────────────────────────────────────────────────
