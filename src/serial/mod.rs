pub mod gate;
pub mod interface;
pub mod mock;
pub mod protocol;

pub use gate::TransportGate;
pub use interface::{NativePortOpener, PortOpener, SerialInterface, SerialLink};
pub use protocol::{AggregateReading, Command, DeviceName, FieldValue, NumericPolicy, RawResponse, Reading};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};

/// One serial-capable port as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Line settings used for every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub timeout: Duration,
}

/// 115200 8N1, 100ms read timeout.
pub const SERIAL_SETTINGS: SerialSettings = SerialSettings {
    baud_rate: 115_200,
    data_bits: DataBits::Eight,
    parity: Parity::None,
    stop_bits: StopBits::One,
    timeout: Duration::from_millis(100),
};

impl Default for SerialSettings {
    fn default() -> Self {
        SERIAL_SETTINGS
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed response to {command}: {response:?}")]
    MalformedResponse {
        command: &'static str,
        response: String,
    },

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("A transaction is already in progress on this thread")]
    AlreadyInTransaction,
}

impl SensorError {
    /// True for errors raised by the byte stream itself rather than by the
    /// caller or the decoder.
    pub fn is_transport(&self) -> bool {
        matches!(self, SensorError::TransportFailure(_))
    }
}

impl From<std::io::Error> for SensorError {
    fn from(err: std::io::Error) -> Self {
        SensorError::TransportFailure(err.to_string())
    }
}

impl From<serialport::Error> for SensorError {
    fn from(err: serialport::Error) -> Self {
        SensorError::TransportFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SensorError>;
