//! Poll orchestrator.
//!
//! [`CubePoller`] owns the single [`Session`] behind a FIFO-fair async
//! mutex, so a refresh and a command never share the wire. Snapshots are
//! published through a `watch` channel: readers hold `Arc<Gateway>` handles
//! that stay valid after the next refresh replaces them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command;
use crate::error::Error;
use crate::message::{Ack, Mode, RfAddress};
use crate::model::{Gateway, apply_snapshot};
use crate::network::{ConnectionInfo, Connector, TcpConnector};
use crate::session::{Session, SessionConfig, SessionPhase};

pub type SnapshotReceiver = watch::Receiver<Option<Arc<Gateway>>>;

pub struct CubePoller<C: Connector> {
    session: Mutex<Session<C>>,
    snapshot: watch::Sender<Option<Arc<Gateway>>>,
    follow_up: Notify,
}

impl<C: Connector> CubePoller<C> {
    pub fn new(connector: C, config: SessionConfig) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            session: Mutex::new(Session::new(connector, config)),
            snapshot,
            follow_up: Notify::new(),
        }
    }

    /// Create a poller and take the first snapshot.
    ///
    /// Fails with the underlying cause, not [`Error::RefreshFailed`]: there
    /// is no earlier snapshot to fall back on.
    pub async fn connect(connector: C, config: SessionConfig) -> Result<Self, Error> {
        let poller = Self::new(connector, config);
        match poller.refresh().await {
            Ok(_) => Ok(poller),
            Err(Error::RefreshFailed(cause)) => Err(*cause),
            Err(e) => Err(e),
        }
    }

    /// The latest successful snapshot, if any.
    pub fn snapshot(&self) -> Option<Arc<Gateway>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshot.subscribe()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.session.lock().await.phase().clone()
    }

    /// Read a full snapshot and publish it.
    ///
    /// On failure the previous snapshot stays published and the cause is
    /// wrapped in [`Error::RefreshFailed`].
    pub async fn refresh(&self) -> Result<Arc<Gateway>, Error> {
        let result = {
            let mut session = self.session.lock().await;
            refresh_locked(&mut session).await
        };

        match result {
            Ok(gateway) => {
                let gateway = Arc::new(gateway);
                debug!(
                    devices = gateway.devices.len(),
                    rooms = gateway.rooms.len(),
                    "snapshot published"
                );
                self.snapshot.send_replace(Some(Arc::clone(&gateway)));
                Ok(gateway)
            }
            Err(e) => {
                warn!(error = %e, "refresh failed, keeping previous snapshot");
                Err(Error::RefreshFailed(Box::new(e)))
            }
        }
    }

    /// Set mode and temperature on the device at `rf_address`.
    ///
    /// The request is checked against the current snapshot before the
    /// session lock is taken. On success a follow-up refresh is requested
    /// from the poll loop.
    pub async fn send_command(
        &self,
        rf_address: RfAddress,
        temperature: Option<f64>,
        mode: Mode,
    ) -> Result<Ack, Error> {
        let snapshot = self
            .snapshot()
            .ok_or(Error::InvalidState("no snapshot available yet"))?;
        let device = snapshot.find_by_rf_address(rf_address)?;
        command::validate(device, mode, temperature)?;

        let ack = {
            let mut session = self.session.lock().await;
            let reused = session.is_connected();
            match command::set_mode_and_temperature(&mut session, device, temperature, mode).await {
                Err(e) if may_retry(&e, reused, &session) => {
                    warn!(error = %e, "idle connection dropped, retrying command once");
                    command::set_mode_and_temperature(&mut session, device, temperature, mode).await
                }
                other => other,
            }
        }?;

        self.follow_up.notify_one();
        Ok(ack)
    }

    /// Close the session's connection, if any.
    pub async fn disconnect(&self) {
        self.session.lock().await.disconnect().await;
    }

    /// Refresh every `interval` and after each acknowledged command until
    /// `cancel` fires, then disconnect.
    ///
    /// Cancellation is observed between operations only.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?interval, "poll loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.follow_up.notified() => debug!("follow-up refresh after command"),
                _ = ticker.tick() => {}
            }
            // Failures are logged by refresh(); the loop carries on.
            let _ = self.refresh().await;
        }

        self.disconnect().await;
        info!("poll loop stopped");
    }
}

impl CubePoller<TcpConnector> {
    /// Connect to `host:port` over TCP and take the first snapshot.
    pub async fn connect_tcp(host: &str, port: u16, config: SessionConfig) -> Result<Self, Error> {
        Self::connect(TcpConnector::new(ConnectionInfo::new(host, port)), config).await
    }
}

async fn refresh_locked<C: Connector>(session: &mut Session<C>) -> Result<Gateway, Error> {
    let reused = session.is_connected();
    let frames = match session.read_full_state().await {
        Err(e) if may_retry(&e, reused, session) => {
            warn!(error = %e, "idle connection dropped, reconnecting once");
            session.read_full_state().await?
        }
        other => other?,
    };

    match apply_snapshot(&frames) {
        Ok(mut gateway) => {
            gateway.address = session.connector().describe();
            gateway.persistent = session.config().persistent;
            Ok(gateway)
        }
        Err(e) => {
            session.disconnect().await;
            Err(e)
        }
    }
}

/// A connection found dead after sitting idle in persistent mode earns
/// exactly one fresh attempt.
fn may_retry<C: Connector>(err: &Error, reused: bool, session: &Session<C>) -> bool {
    err.is_connect() && reused && session.config().persistent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SetCommand;
    use crate::temperature::Temperature;
    use crate::test_support::*;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio_test::io::Builder;

    fn reset() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")
    }

    fn boost_line() -> Vec<u8> {
        crate::codec::encode_command(&SetCommand {
            rf_address: RfAddress::new(THERMOSTAT_RF),
            room_id: 1,
            mode: Mode::Boost,
            temperature: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn connect_publishes_first_snapshot() {
        let mock = Builder::new()
            .read(&to_wire(&scenario_lines(42, Mode::Manual)))
            .build();
        let poller = CubePoller::connect(ScriptedConnector::new([mock]), SessionConfig::default())
            .await
            .unwrap();

        let snapshot = poller.snapshot().unwrap();
        assert_eq!(snapshot.devices.len(), 1);
        assert_eq!(snapshot.address, "scripted");
        assert!(snapshot.persistent);
        assert!(poller.subscribe().borrow().is_some());
    }

    #[tokio::test]
    async fn connect_reports_the_underlying_cause() {
        let connector: ScriptedConnector<DuplexStream> = ScriptedConnector::new([]);
        let err = CubePoller::connect(connector, SessionConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Connect(_)));
    }

    #[tokio::test]
    async fn reconnects_once_after_idle_drop() {
        let first = Builder::new()
            .read(&to_wire(&scenario_lines(42, Mode::Manual)))
            .write(b"l:\r\n")
            .read_error(reset())
            .build();
        let second = Builder::new()
            .read(&to_wire(&scenario_lines(9, Mode::Manual)))
            .build();
        let poller = CubePoller::connect(ScriptedConnector::new([first, second]), SessionConfig::default())
            .await
            .unwrap();

        let gateway = poller.refresh().await.unwrap();
        assert_eq!(gateway.devices[0].target_temperature(), Some(Temperature::OFF));
        assert!(poller.phase().await.is_ready());
    }

    #[tokio::test]
    async fn retry_happens_at_most_once() {
        let first = Builder::new()
            .read(&to_wire(&scenario_lines(42, Mode::Manual)))
            .write(b"l:\r\n")
            .read_error(reset())
            .build();
        let poller = CubePoller::connect(ScriptedConnector::new([first]), SessionConfig::default())
            .await
            .unwrap();
        let before = poller.snapshot().unwrap();

        let err = poller.refresh().await.unwrap_err();
        assert!(matches!(err, Error::RefreshFailed(_)));
        assert!(err.is_connect());
        assert!(Arc::ptr_eq(&before, &poller.snapshot().unwrap()));
    }

    #[tokio::test]
    async fn per_call_does_not_retry() {
        let connector: ScriptedConnector<DuplexStream> = ScriptedConnector::new([]);
        let config = SessionConfig {
            persistent: false,
            ..SessionConfig::default()
        };
        let poller = CubePoller::new(connector, config);
        let err = poller.refresh().await.unwrap_err();
        assert!(err.is_connect());
        assert!(poller.snapshot().is_none());
    }

    #[tokio::test]
    async fn protocol_error_keeps_snapshot_and_is_not_retried() {
        let first = Builder::new()
            .read(&to_wire(&scenario_lines(42, Mode::Manual)))
            .write(b"l:\r\n")
            .read(b"Z:junk\r\n")
            .build();
        let poller = CubePoller::connect(ScriptedConnector::new([first]), SessionConfig::default())
            .await
            .unwrap();
        let before = poller.snapshot().unwrap();

        let err = poller.refresh().await.unwrap_err();
        let Error::RefreshFailed(cause) = err else {
            panic!("expected RefreshFailed");
        };
        assert!(cause.is_data_corruption());
        assert!(poller.phase().await.is_disconnected());
        assert_eq!(*before, *poller.snapshot().unwrap());
    }

    #[tokio::test]
    async fn command_needs_snapshot_and_known_device() {
        let connector: ScriptedConnector<DuplexStream> = ScriptedConnector::new([]);
        let poller = CubePoller::new(connector, SessionConfig::default());
        let rf = RfAddress::new(THERMOSTAT_RF);
        assert!(matches!(
            poller.send_command(rf, Some(20.0), Mode::Manual).await,
            Err(Error::InvalidState(_))
        ));

        let mock = Builder::new()
            .read(&to_wire(&scenario_lines(42, Mode::Manual)))
            .build();
        let poller = CubePoller::connect(ScriptedConnector::new([mock]), SessionConfig::default())
            .await
            .unwrap();
        assert!(matches!(
            poller.send_command(RfAddress::new([9, 9, 9]), Some(20.0), Mode::Manual).await,
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            poller.send_command(rf, Some(20.0), Mode::Automatic).await,
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn acknowledged_command_requests_follow_up() {
        let rf = RfAddress::new(THERMOSTAT_RF);
        let mock = Builder::new()
            .read(&to_wire(&scenario_lines(42, Mode::Manual)))
            .write(&boost_line())
            .read(b"S:00,0,31\r\n")
            .build();
        let poller = CubePoller::connect(ScriptedConnector::new([mock]), SessionConfig::default())
            .await
            .unwrap();

        poller.send_command(rf, None, Mode::Boost).await.unwrap();
        tokio::time::timeout(Duration::from_millis(50), poller.follow_up.notified())
            .await
            .expect("follow-up requested");
        // The cached snapshot is unchanged until the next refresh.
        assert_eq!(poller.snapshot().unwrap().devices[0].mode(), Some(Mode::Manual));
    }

    #[tokio::test]
    async fn command_reconnects_once_after_idle_drop() {
        let dump = to_wire(&scenario_lines(42, Mode::Manual));
        let first = Builder::new()
            .read(&dump)
            .write(&boost_line())
            .read_error(reset())
            .build();
        let second = Builder::new()
            .read(&dump)
            .write(&boost_line())
            .read(b"S:00,0,31\r\n")
            .build();
        let poller = CubePoller::connect(ScriptedConnector::new([first, second]), SessionConfig::default())
            .await
            .unwrap();

        let ack = poller
            .send_command(RfAddress::new(THERMOSTAT_RF), None, Mode::Boost)
            .await
            .unwrap();
        assert!(ack.accepted);
        assert_eq!(ack.free_memory_slots, 0x31);
        assert_eq!(poller.session.lock().await.connector().remaining(), 0);
        assert!(poller.phase().await.is_ready());
    }

    #[tokio::test]
    async fn command_retry_happens_at_most_once() {
        let dump = to_wire(&scenario_lines(42, Mode::Manual));
        let first = Builder::new()
            .read(&dump)
            .write(&boost_line())
            .read_error(reset())
            .build();
        let second = Builder::new()
            .read(&dump)
            .write(&boost_line())
            .read_error(reset())
            .build();
        let untouched = Builder::new().build();
        let poller = CubePoller::connect(
            ScriptedConnector::new([first, second, untouched]),
            SessionConfig::default(),
        )
        .await
        .unwrap();

        let err = poller
            .send_command(RfAddress::new(THERMOSTAT_RF), None, Mode::Boost)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
        assert_eq!(poller.session.lock().await.connector().remaining(), 1);
        assert!(poller.phase().await.is_disconnected());
    }

    #[tokio::test]
    async fn dropped_refresh_does_not_wedge_the_session() {
        let (first, mut first_server) = tokio::io::duplex(4096);
        let (second, mut second_server) = tokio::io::duplex(4096);
        first_server
            .write_all(&to_wire(&scenario_lines(42, Mode::Manual)))
            .await
            .unwrap();
        second_server
            .write_all(&to_wire(&scenario_lines(9, Mode::Manual)))
            .await
            .unwrap();
        let poller = CubePoller::connect(ScriptedConnector::new([first, second]), SessionConfig::default())
            .await
            .unwrap();

        // The first gateway never answers `l:`.
        let cancelled = tokio::time::timeout(Duration::from_millis(50), poller.refresh()).await;
        assert!(cancelled.is_err());
        assert!(matches!(poller.phase().await, SessionPhase::Busy { .. }));

        let gateway = poller.refresh().await.unwrap();
        assert_eq!(gateway.devices[0].target_temperature(), Some(Temperature::OFF));
        assert!(poller.phase().await.is_ready());
        assert_eq!(poller.session.lock().await.connector().remaining(), 0);
        drop((first_server, second_server));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let connector: ScriptedConnector<DuplexStream> = ScriptedConnector::new([]);
        let poller = CubePoller::new(connector, SessionConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), poller.run(Duration::from_secs(30), cancel))
            .await
            .expect("loop exits");
        assert!(poller.phase().await.is_disconnected());
    }
}
