pub mod discovery;
pub mod handle;
pub mod models;
mod transaction;

pub use discovery::{
    find_pa_sensors, find_sensors, find_tnh_sensors, FamilyTable, NativeEnumerator, PortEnumerator,
    SensorFamily, SensorPorts, UsbId, USB_TNH_ID,
};
pub use handle::{UsbSensor, UsbSensorBuilder};
pub use models::*;
