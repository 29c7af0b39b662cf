//! Optional JSON configuration.
//!
//! ```json
//! {
//!   "families": { "pa": { "vendor_id": "0x1234", "product_id": "0x5678" } },
//!   "read_light": true,
//!   "locations": { "/dev/ttyACM0": "server room" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sensor::discovery::InvalidUsbId;
use crate::sensor::{DeviceAddress, FamilyTable, UsbId, UsbSensor, UsbSensorBuilder};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidId(#[from] InvalidUsbId),
}

/// Identifier pair as written in the config file (hex strings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbIdConfig {
    pub vendor_id: String,
    pub product_id: String,
}

impl UsbIdConfig {
    pub fn parse(&self) -> Result<UsbId, InvalidUsbId> {
        UsbId::from_hex(&self.vendor_id, &self.product_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FamiliesConfig {
    /// Overrides the built-in USB-TnH identifiers.
    pub tnh: Option<UsbIdConfig>,
    /// USB-PA identifiers. PA discovery is off without them.
    pub pa: Option<UsbIdConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    pub families: FamiliesConfig,
    /// Default auto-light policy for handles built from this config.
    pub read_light: bool,
    /// Location label per port name.
    pub locations: BTreeMap<String, String>,
}

impl SensorConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded sensor config from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SensorConfig = serde_json::from_str(text)?;
        config.family_table()?;
        Ok(config)
    }

    pub fn family_table(&self) -> Result<FamilyTable, ConfigError> {
        let mut table = FamilyTable::default();
        if let Some(tnh) = &self.families.tnh {
            table.tnh = tnh.parse()?;
        }
        if let Some(pa) = &self.families.pa {
            table.pa = Some(pa.parse()?);
        }
        Ok(table)
    }

    pub fn location_of(&self, port: &DeviceAddress) -> Option<&str> {
        self.locations.get(port.as_str()).map(String::as_str)
    }

    /// Builder pre-filled with the configured policy and location.
    pub fn sensor_builder(&self, port: impl Into<DeviceAddress>) -> UsbSensorBuilder {
        let port = port.into();
        let builder = UsbSensor::builder(port.clone()).read_light(self.read_light);
        match self.location_of(&port) {
            Some(location) => builder.location(location),
            None => builder,
        }
    }

    pub fn sensor(&self, port: impl Into<DeviceAddress>) -> UsbSensor {
        self.sensor_builder(port).build()
    }
}
