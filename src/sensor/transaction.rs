//! Read and write transactions for UsbSensor.

use super::UsbSensor;
use crate::serial::interface::{read_frame, send_frame};
use crate::serial::protocol::{decode_read, decode_write};
use crate::serial::{Command, Reading, Result, SerialLink};

impl UsbSensor {
    /// One read transaction.
    ///
    /// With auto-light on, the light is switched on and off inside the same
    /// session as the read, and switched off even when decoding fails. If
    /// the transport faults after the light went on, the dead session is
    /// closed and a fresh write transaction tries to switch it off; that
    /// attempt is logged and never replaces the original error.
    pub(super) fn read(&self, command: Command) -> Result<Reading> {
        let mut light_engaged = false;

        let result = self.gate.with_exclusive_transaction(|| {
            let mut session = self.opener.open(self.port.as_str(), &self.settings)?;
            let link = session.as_mut();

            if self.read_light {
                light_engaged = true;
                if !exchange_write(link, &Command::SetLight(true))? {
                    log::warn!("Sensor on {} did not acknowledge light on", self.port);
                }
            }

            send_frame(link, &command.encode())?;
            let raw = read_frame(link)?;
            let decoded = decode_read(&command, &raw);

            if light_engaged {
                if !exchange_write(link, &Command::SetLight(false))? {
                    log::warn!("Sensor on {} did not acknowledge light off", self.port);
                }
                light_engaged = false;
            }

            decoded
        });

        if let Err(e) = &result {
            if e.is_transport() {
                log::error!(
                    "Cannot execute read command {} on {}: {}",
                    command.opcode(),
                    self.port,
                    e
                );
                if light_engaged {
                    self.light_off_best_effort();
                }
            }
        }

        result
    }

    /// One write transaction: send `CMD=value`, read the acknowledgement.
    pub(super) fn write(&self, command: Command) -> Result<bool> {
        let result = self.gate.with_exclusive_transaction(|| {
            let mut session = self.opener.open(self.port.as_str(), &self.settings)?;
            exchange_write(session.as_mut(), &command)
        });

        match &result {
            Ok(true) => log::debug!("{} acknowledged {}", self.port, command),
            Ok(false) => log::warn!("{} rejected {}", self.port, command),
            Err(e) => log::error!(
                "Cannot execute write command {} on {}: {}",
                command.opcode(),
                self.port,
                e
            ),
        }

        result
    }

    fn light_off_best_effort(&self) {
        match self.write(Command::SetLight(false)) {
            Ok(true) => log::debug!("Light switched off on {} after fault", self.port),
            Ok(false) => log::warn!("Sensor on {} refused light off after fault", self.port),
            Err(e) => log::warn!("Best-effort light off on {} failed: {}", self.port, e),
        }
    }
}

fn exchange_write(link: &mut dyn SerialLink, command: &Command) -> Result<bool> {
    send_frame(link, &command.encode())?;
    let raw = read_frame(link)?;
    Ok(decode_write(&raw))
}
