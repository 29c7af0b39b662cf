//! Discovery and serial protocol driver for DogRatIan USB-TnH / USB-PA
//! environmental sensors.
//!
//! ```no_run
//! use usb_sensors::sensor::{find_sensors, FamilyTable, NativeEnumerator, SensorFamily, UsbSensor};
//!
//! let ports = find_sensors(&NativeEnumerator, &FamilyTable::default());
//! for port in &ports[&SensorFamily::TnH] {
//!     let sensor = UsbSensor::new(port.clone(), true);
//!     println!("{}: {:?} °C", port, sensor.temperature()?);
//! }
//! # Ok::<(), usb_sensors::serial::SensorError>(())
//! ```

pub mod config;
pub mod sensor;
pub mod serial;

pub use config::{ConfigError, SensorConfig};
pub use sensor::{DeviceAddress, Identification, SensorFamily, UsbSensor};
pub use serial::{Result, SensorError, TransportGate};
