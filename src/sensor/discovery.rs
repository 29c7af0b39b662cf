use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serialport::SerialPortType;

use super::DeviceAddress;
use crate::serial::{Result, SerialDeviceInfo};

/// USB-TnH (temperature and humidity) identifiers.
pub const USB_TNH_ID: UsbId = UsbId::new(0x03EB, 0x2310);

/// Sensor hardware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorFamily {
    #[serde(rename = "USB-TnH")]
    TnH,
    #[serde(rename = "USB-PA")]
    Pa,
}

impl SensorFamily {
    pub const ALL: [SensorFamily; 2] = [SensorFamily::TnH, SensorFamily::Pa];

    pub fn label(&self) -> &'static str {
        match self {
            SensorFamily::TnH => "USB-TnH",
            SensorFamily::Pa => "USB-PA",
        }
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid USB identifier {0:?}, expected 16-bit hex such as \"0x03EB\"")]
pub struct InvalidUsbId(pub String);

/// USB vendor/product pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbId {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self { vendor_id, product_id }
    }

    /// Parse hex strings, with or without a `0x` prefix.
    pub fn from_hex(vendor_id: &str, product_id: &str) -> std::result::Result<Self, InvalidUsbId> {
        Ok(Self::new(parse_hex_id(vendor_id)?, parse_hex_id(product_id)?))
    }

    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vendor_id == vid && self.product_id == pid
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

pub fn parse_hex_id(text: &str) -> std::result::Result<u16, InvalidUsbId> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u16::from_str_radix(digits, 16).map_err(|_| InvalidUsbId(text.to_string()))
}

/// Identifier table used to classify ports.
///
/// USB-PA has no published identifier, so it has to be supplied by the
/// caller; until then no port is ever classified as PA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyTable {
    pub tnh: UsbId,
    pub pa: Option<UsbId>,
}

impl Default for FamilyTable {
    fn default() -> Self {
        Self {
            tnh: USB_TNH_ID,
            pa: None,
        }
    }
}

impl FamilyTable {
    pub fn with_pa(mut self, id: UsbId) -> Self {
        self.pa = Some(id);
        self
    }

    pub fn id_of(&self, family: SensorFamily) -> Option<UsbId> {
        match family {
            SensorFamily::TnH => Some(self.tnh),
            SensorFamily::Pa => self.pa,
        }
    }

    pub fn family_of(&self, vid: u16, pid: u16) -> Option<SensorFamily> {
        SensorFamily::ALL
            .into_iter()
            .find(|family| self.id_of(*family).is_some_and(|id| id.matches(vid, pid)))
    }
}

/// Source of serial port listings.
pub trait PortEnumerator: Send + Sync {
    /// USB serial ports currently visible to the host.
    fn available_ports(&self) -> Result<Vec<SerialDeviceInfo>>;
}

/// Lists ports through `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEnumerator;

impl PortEnumerator for NativeEnumerator {
    fn available_ports(&self) -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let mut devices = Vec::new();

        for port in ports {
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                devices.push(SerialDeviceInfo {
                    port_name: port.port_name,
                    vid: usb_info.vid,
                    pid: usb_info.pid,
                    serial_number: usb_info.serial_number,
                    manufacturer: usb_info.manufacturer,
                    product: usb_info.product,
                });
            }
        }

        Ok(devices)
    }
}

/// Ports per family. Every family has an entry, possibly empty.
pub type SensorPorts = BTreeMap<SensorFamily, Vec<DeviceAddress>>;

/// Classify every visible port by family. Never fails: if the host cannot
/// list its ports the result simply has no addresses.
pub fn find_sensors(enumerator: &dyn PortEnumerator, families: &FamilyTable) -> SensorPorts {
    let mut found: SensorPorts = SensorFamily::ALL
        .into_iter()
        .map(|family| (family, Vec::new()))
        .collect();

    let ports = match enumerator.available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            log::warn!("Cannot enumerate serial ports: {}", e);
            return found;
        }
    };

    for port in ports {
        if let Some(family) = families.family_of(port.vid, port.pid) {
            log::info!("Found {} sensor on {}", family, port.port_name);
            found
                .entry(family)
                .or_default()
                .push(DeviceAddress::new(port.port_name));
        } else {
            log::debug!(
                "Ignoring {} ({:04x}:{:04x})",
                port.port_name,
                port.vid,
                port.pid
            );
        }
    }

    found
}

pub fn find_tnh_sensors(enumerator: &dyn PortEnumerator, families: &FamilyTable) -> Vec<DeviceAddress> {
    find_sensors(enumerator, families)
        .remove(&SensorFamily::TnH)
        .unwrap_or_default()
}

pub fn find_pa_sensors(enumerator: &dyn PortEnumerator, families: &FamilyTable) -> Vec<DeviceAddress> {
    find_sensors(enumerator, families)
        .remove(&SensorFamily::Pa)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x03EB").unwrap(), 0x03EB);
        assert_eq!(parse_hex_id("2310").unwrap(), 0x2310);
        assert_eq!(parse_hex_id("0Xbeef").unwrap(), 0xBEEF);
        assert!(parse_hex_id("0xBADCAFE").is_err());
        assert!(parse_hex_id("zz").is_err());
        assert!(parse_hex_id("").is_err());
    }

    #[test]
    fn test_family_table_defaults() {
        let table = FamilyTable::default();
        assert_eq!(table.family_of(0x03EB, 0x2310), Some(SensorFamily::TnH));
        assert_eq!(table.family_of(0x2E8A, 0xA02F), None);
        assert_eq!(table.id_of(SensorFamily::Pa), None);
    }

    #[test]
    fn test_family_table_with_pa() {
        let table = FamilyTable::default().with_pa(UsbId::new(0x1234, 0x5678));
        assert_eq!(table.family_of(0x1234, 0x5678), Some(SensorFamily::Pa));
        assert_eq!(table.family_of(0x03EB, 0x2310), Some(SensorFamily::TnH));
    }

    #[test]
    fn test_usb_id_display() {
        assert_eq!(USB_TNH_ID.to_string(), "03eb:2310");
        assert_eq!(SensorFamily::Pa.to_string(), "USB-PA");
    }
}
