//! Command dispatcher.
//!
//! Validates a mode/temperature request against the target device before
//! any I/O, encodes it and hands it to the session. The cached model is
//! never touched: the effect becomes visible with the next refresh.

use tracing::{info, warn};

use crate::error::Error;
use crate::message::{Ack, Mode, SetCommand};
use crate::model::Device;
use crate::network::Connector;
use crate::session::Session;
use crate::temperature::Temperature;

/// Check a request and turn it into a wire command.
///
/// - only thermostats and wall thermostats accept commands
/// - `Automatic` takes no temperature
/// - `Manual` needs a temperature in [4.5, 30.5]
/// - `Boost` and `Vacation` take an optional temperature
///
/// Temperatures are rounded to the nearest half degree.
pub fn validate(device: &Device, mode: Mode, temperature: Option<f64>) -> Result<SetCommand, Error> {
    if !device.accepts_commands() {
        return Err(Error::UnsupportedOperation(format!(
            "{} {} is read-only",
            device.device_type, device.rf_address
        )));
    }

    let temperature = match (mode, temperature) {
        (Mode::Automatic, Some(t)) => {
            return Err(Error::UnsupportedOperation(format!(
                "automatic mode follows the schedule; got temperature {t}"
            )));
        }
        (Mode::Manual, None) => {
            return Err(Error::UnsupportedOperation(
                "manual mode requires a temperature".into(),
            ));
        }
        (_, Some(t)) => Some(commandable(t)?),
        (_, None) => None,
    };

    Ok(SetCommand {
        rf_address: device.rf_address,
        room_id: device.room_id,
        mode,
        temperature,
    })
}

fn commandable(celsius: f64) -> Result<Temperature, Error> {
    let min = Temperature::MIN_COMMAND.celsius();
    let max = Temperature::MAX_COMMAND.celsius();
    if !(min..=max).contains(&celsius) {
        return Err(Error::UnsupportedOperation(format!(
            "temperature {celsius} outside [{min}, {max}]"
        )));
    }
    Temperature::from_celsius(celsius)
        .filter(|t| t.is_commandable())
        .ok_or_else(|| Error::UnsupportedOperation(format!("temperature {celsius} not representable")))
}

/// Validate, send and wait for the acknowledgement.
///
/// A negative acknowledgement becomes [`Error::CommandRejected`].
pub async fn set_mode_and_temperature<C: Connector>(
    session: &mut Session<C>,
    device: &Device,
    temperature: Option<f64>,
    mode: Mode,
) -> Result<Ack, Error> {
    let command = validate(device, mode, temperature)?;
    let reply = session.send_command(command).await?;
    if !reply.ack.accepted {
        warn!(
            rf = %device.rf_address,
            duty_cycle = reply.ack.duty_cycle,
            "gateway rejected command"
        );
        return Err(Error::CommandRejected {
            duty_cycle: reply.ack.duty_cycle,
            free_slots: reply.ack.free_memory_slots,
        });
    }
    info!(
        rf = %device.rf_address,
        %mode,
        temperature = ?command.temperature,
        "command acknowledged"
    );
    Ok(reply.ack)
}
