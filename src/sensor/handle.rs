use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use super::{CommandOutcome, DeviceAddress, Identification, Measurement};
use crate::serial::{
    AggregateReading, Command, DeviceName, NativePortOpener, PortOpener, Reading, Result,
    SensorError, SerialSettings, TransportGate, SERIAL_SETTINGS,
};

/// Handle to one USB sensor.
///
/// The handle keeps no port open: every accessor runs a complete
/// open/write/read/close transaction under the shared [`TransportGate`].
/// With `read_light` enabled, every read lights the sensor's indicator for
/// the duration of the transaction.
#[derive(Clone)]
pub struct UsbSensor {
    pub(super) port: DeviceAddress,
    pub(super) read_light: bool,
    location: Option<String>,
    pub(super) gate: Arc<TransportGate>,
    pub(super) opener: Arc<dyn PortOpener>,
    pub(super) settings: SerialSettings,
}

impl UsbSensor {
    /// Handle on a real port, sharing the process-wide gate.
    pub fn new(port: impl Into<DeviceAddress>, read_light: bool) -> Self {
        Self::builder(port).read_light(read_light).build()
    }

    pub fn builder(port: impl Into<DeviceAddress>) -> UsbSensorBuilder {
        UsbSensorBuilder::new(port.into())
    }

    pub fn port(&self) -> &DeviceAddress {
        &self.port
    }

    pub fn read_light(&self) -> bool {
        self.read_light
    }

    pub fn set_read_light(&mut self, read_light: bool) {
        self.read_light = read_light;
    }

    /// Free-form label, e.g. "server room". Never sent to the sensor.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn set_location(&mut self, location: Option<String>) {
        self.location = location;
    }

    pub fn gate(&self) -> &Arc<TransportGate> {
        &self.gate
    }

    /// Hardware model string (`GI`).
    pub fn model(&self) -> Result<Option<String>> {
        self.read_text(Command::GetIdentity)
    }

    /// Firmware version (`GV`).
    pub fn version(&self) -> Result<Option<String>> {
        self.read_text(Command::GetVersion)
    }

    /// Temperature in °C. `None` if the sensor did not answer in time.
    pub fn temperature(&self) -> Result<Option<f64>> {
        self.read_number(Command::GetTemperature)
    }

    /// Relative humidity in %.
    pub fn humidity(&self) -> Result<Option<f64>> {
        self.read_number(Command::GetHumidity)
    }

    /// Pressure, USB-PA only.
    pub fn pressure(&self) -> Result<Option<f64>> {
        self.read_number(Command::GetPressure)
    }

    /// User-assigned name (`GN`).
    pub fn name(&self) -> Result<Option<String>> {
        self.read_text(Command::GetName)
    }

    /// Rename the sensor. The name is checked before any I/O; `Ok(false)`
    /// means the sensor refused it.
    pub fn set_name(&self, name: &str) -> Result<bool> {
        let name = DeviceName::new(name)?;
        self.write(Command::SetName(name))
    }

    /// Light status cannot be read back from the hardware.
    pub fn led(&self) -> Result<bool> {
        Err(SensorError::UnsupportedOperation(
            "light status is not available from the sensor",
        ))
    }

    /// Switch the indicator light.
    pub fn set_led(&self, on: bool) -> Result<bool> {
        self.write(Command::SetLight(on))
    }

    /// Model, version and name, read in three transactions.
    pub fn identification(&self) -> Result<Identification> {
        Ok(Identification {
            model: self.model()?,
            version: self.version()?,
            name: self.name()?,
        })
    }

    /// Every value the sensor reports, in one `GJSON` exchange.
    pub fn read_all(&self) -> Result<Option<AggregateReading>> {
        match self.read(Command::GetJson)? {
            Reading::Aggregate(reading) => Ok(Some(reading)),
            Reading::NoData => Ok(None),
            other => Err(unexpected(&Command::GetJson, other)),
        }
    }

    /// Temperature and humidity, stamped with the time the first read
    /// started.
    pub fn measure(&self) -> Result<Measurement> {
        let taken_at = Utc::now();
        Ok(Measurement {
            port: self.port.clone(),
            taken_at,
            temperature: self.temperature()?,
            humidity: self.humidity()?,
        })
    }

    /// Send an untyped opcode/value pair. Unknown opcodes and invalid values
    /// are rejected before the gate is taken.
    pub fn send_raw(&self, opcode: &str, value: Option<&str>) -> Result<CommandOutcome> {
        let command = Command::parse(opcode, value)?;
        self.execute(command)
    }

    pub fn execute(&self, command: Command) -> Result<CommandOutcome> {
        if command.is_write() {
            self.write(command).map(CommandOutcome::Write)
        } else {
            self.read(command).map(CommandOutcome::Read)
        }
    }

    fn read_text(&self, command: Command) -> Result<Option<String>> {
        match self.read(command.clone())? {
            Reading::Text(text) => Ok(Some(text)),
            Reading::NoData => Ok(None),
            other => Err(unexpected(&command, other)),
        }
    }

    fn read_number(&self, command: Command) -> Result<Option<f64>> {
        match self.read(command.clone())? {
            Reading::Number(value) => Ok(Some(value)),
            Reading::NoData => Ok(None),
            other => Err(unexpected(&command, other)),
        }
    }
}

fn unexpected(command: &Command, reading: Reading) -> SensorError {
    SensorError::MalformedResponse {
        command: command.opcode(),
        response: format!("{:?}", reading),
    }
}

impl fmt::Debug for UsbSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbSensor")
            .field("port", &self.port)
            .field("read_light", &self.read_light)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// Builder for [`UsbSensor`]. Defaults: no auto-light, the process-wide
/// gate, real serial ports, [`SERIAL_SETTINGS`].
pub struct UsbSensorBuilder {
    port: DeviceAddress,
    read_light: bool,
    location: Option<String>,
    gate: Option<Arc<TransportGate>>,
    opener: Option<Arc<dyn PortOpener>>,
}

impl UsbSensorBuilder {
    fn new(port: DeviceAddress) -> Self {
        Self {
            port,
            read_light: false,
            location: None,
            gate: None,
            opener: None,
        }
    }

    pub fn read_light(mut self, read_light: bool) -> Self {
        self.read_light = read_light;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn gate(mut self, gate: Arc<TransportGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn opener(mut self, opener: Arc<dyn PortOpener>) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn build(self) -> UsbSensor {
        UsbSensor {
            port: self.port,
            read_light: self.read_light,
            location: self.location,
            gate: self.gate.unwrap_or_else(TransportGate::global),
            opener: self.opener.unwrap_or_else(|| Arc::new(NativePortOpener)),
            settings: SERIAL_SETTINGS,
        }
    }
}
