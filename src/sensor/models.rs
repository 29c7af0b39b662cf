use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serial::Reading;

/// Serial port a sensor is attached to (`/dev/ttyACM0`, `COM3`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self(port_name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(port_name: &str) -> Self {
        Self::new(port_name)
    }
}

impl From<String> for DeviceAddress {
    fn from(port_name: String) -> Self {
        Self(port_name)
    }
}

impl AsRef<str> for DeviceAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Model, firmware version and user-assigned name of a sensor. A field is
/// `None` when the sensor did not answer in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub model: Option<String>,
    pub version: Option<String>,
    pub name: Option<String>,
}

impl fmt::Display for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |field: &Option<String>| field.clone().unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "model: {}, version: {}, name: {}",
            show(&self.model),
            show(&self.version),
            show(&self.name)
        )
    }
}

/// Timestamped temperature/humidity pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub port: DeviceAddress,
    pub taken_at: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// Result of [`UsbSensor::send_raw`](super::UsbSensor::send_raw).
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Read(Reading),
    /// Whether the sensor acknowledged the write.
    Write(bool),
}
