//! Long-running poll service.
//!
//! Owns a [`CubePoller`] and keeps it refreshing until stopped, logging a
//! summary of every snapshot it publishes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use maxcube_core::climate;
use maxcube_core::{CubePoller, Gateway, TcpConnector};

use crate::config::PollerConfig;

// ── PollerService ────────────────────────────────────────────────

pub struct PollerService {
    config: PollerConfig,
    cancel: CancellationToken,
}

impl PollerService {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle that stops the service from another task.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Poll until stopped.
    ///
    /// A gateway that is unreachable at startup is not fatal: the loop
    /// keeps trying on every tick.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let session = self.config.to_session_config();
        let poller: Arc<CubePoller<TcpConnector>> =
            Arc::new(CubePoller::new(self.config.connector(), session));
        info!(
            gateway = %self.config.connector().info(),
            persistent = session.persistent,
            interval = ?self.config.poll_interval(),
            "poll service starting"
        );

        let reporter = tokio::spawn(report_snapshots(Arc::clone(&poller), self.cancel.clone()));
        poller.run(self.config.poll_interval(), self.cancel.clone()).await;

        if let Err(e) = reporter.await {
            warn!("snapshot reporter ended abnormally: {e}");
        }
        info!("poll service stopped");
        Ok(())
    }
}

async fn report_snapshots(poller: Arc<CubePoller<TcpConnector>>, cancel: CancellationToken) {
    let mut updates = poller.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        let snapshot = updates.borrow_and_update().clone();
        if let Some(gateway) = snapshot {
            log_snapshot(&gateway);
        }
    }
}

fn log_snapshot(gateway: &Gateway) {
    info!(
        serial = %gateway.serial,
        rooms = gateway.rooms.len(),
        devices = gateway.devices.len(),
        duty_cycle = ?gateway.duty_cycle,
        "gateway refreshed"
    );
    for device in &gateway.devices {
        debug!(
            device = %gateway.display_name(device),
            rf = %device.rf_address,
            mode = ?device.mode(),
            target = ?device.target_temperature().map(|t| t.celsius()),
            actual = ?device.actual_temperature(),
            valve = ?device.valve_position(),
            action = ?climate::hvac_action(gateway, device),
            battery_low = device.battery_low,
            "device state"
        );
        if device.battery_low {
            warn!(device = %gateway.display_name(device), "battery low");
        }
    }
}
