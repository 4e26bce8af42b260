//! Half-degree fixed-point setpoints.
//!
//! The gateway stores every setpoint as an integer count of 0.5 °C steps.
//! Keeping that integer as the canonical representation means a value read
//! from the wire and written back is bit-for-bit identical.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A setpoint in half-degree units.
///
/// The codec never clamps: values decoded from the gateway are kept as-is,
/// including the 4.5 °C "off" and 30.5 °C "always on" sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub struct Temperature(u8);

impl Temperature {
    /// 4.5 °C: the valve is closed.
    pub const OFF: Temperature = Temperature(9);
    /// 30.5 °C: the valve is fully open.
    pub const ON: Temperature = Temperature(61);
    /// Lowest setpoint a command may carry.
    pub const MIN_COMMAND: Temperature = Temperature::OFF;
    /// Highest setpoint a command may carry.
    pub const MAX_COMMAND: Temperature = Temperature::ON;

    /// Wrap a raw half-degree count as read from the wire.
    pub const fn from_half_degrees(raw: u8) -> Self {
        Self(raw)
    }

    /// Convert a Celsius value, rounding to the nearest half degree.
    ///
    /// Returns `None` for non-finite or negative input, or values that do
    /// not fit the wire's 8-bit field.
    pub fn from_celsius(celsius: f64) -> Option<Self> {
        if !celsius.is_finite() || celsius < 0.0 {
            return None;
        }
        let halves = (celsius * 2.0).round();
        if halves > u8::MAX as f64 {
            return None;
        }
        Some(Self(halves as u8))
    }

    pub fn half_degrees(self) -> u8 {
        self.0
    }

    pub fn celsius(self) -> f64 {
        self.0 as f64 / 2.0
    }

    /// Returns `true` when this value may be sent in a command.
    pub fn is_commandable(self) -> bool {
        (Self::MIN_COMMAND..=Self::MAX_COMMAND).contains(&self)
    }

    pub fn is_off(self) -> bool {
        self == Self::OFF
    }

    pub fn is_on(self) -> bool {
        self == Self::ON
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.celsius())
    }
}

impl From<Temperature> for f64 {
    fn from(t: Temperature) -> f64 {
        t.celsius()
    }
}

impl TryFrom<f64> for Temperature {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Temperature::from_celsius(value).ok_or_else(|| format!("temperature out of range: {value}"))
    }
}
