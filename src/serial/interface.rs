use std::io::{ErrorKind, Read, Write};

use serialport::{ClearBuffer, SerialPort};

use super::{Result, SensorError, SerialSettings};

/// Upper bound for one response frame.
pub const MAX_RESPONSE_LEN: usize = 64;

/// A byte stream to one sensor, alive for a single transaction.
pub trait SerialLink: Send {
    /// Write the whole buffer and flush it.
    fn send_data(&mut self, data: &[u8]) -> Result<usize>;

    /// Read whatever is available. `Ok(0)` means the read timed out
    /// without data, which is not a fault.
    fn read_data(&mut self, buffer: &mut [u8]) -> Result<usize>;
}

/// Opens a [`SerialLink`] for a port name. Sensor handles hold one of these
/// instead of a live connection.
pub trait PortOpener: Send + Sync {
    fn open(&self, port_name: &str, settings: &SerialSettings) -> Result<Box<dyn SerialLink>>;
}

/// `serialport`-backed link.
pub struct SerialInterface {
    port: Box<dyn SerialPort>,
    port_name: String,
}

impl SerialInterface {
    /// Open `port_name` with the given line settings.
    pub fn open(port_name: &str, settings: &SerialSettings) -> Result<Self> {
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| SensorError::TransportFailure(format!("Cannot open {}: {}", port_name, e)))?;

        // Stale acknowledgements from an earlier session would otherwise be
        // read as this transaction's response.
        if let Err(e) = port.clear(ClearBuffer::Input) {
            log::debug!("Could not clear input buffer on {}: {}", port_name, e);
        }

        log::debug!("Opened {} at {} baud", port_name, settings.baud_rate);
        Ok(Self {
            port,
            port_name: port_name.to_string(),
        })
    }
}

impl SerialLink for SerialInterface {
    fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn read_data(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.port.read(buffer) {
            Ok(bytes_read) => Ok(bytes_read),
            Err(ref e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for SerialInterface {
    fn drop(&mut self) {
        log::trace!("Closing {}", self.port_name);
    }
}

/// Opens real serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePortOpener;

impl PortOpener for NativePortOpener {
    fn open(&self, port_name: &str, settings: &SerialSettings) -> Result<Box<dyn SerialLink>> {
        Ok(Box::new(SerialInterface::open(port_name, settings)?))
    }
}

/// Send one already-encoded frame.
pub fn send_frame(link: &mut dyn SerialLink, frame: &[u8]) -> Result<()> {
    log::trace!("-> {}", frame.escape_ascii());
    link.send_data(frame)?;
    Ok(())
}

/// Read one response frame: stops at the first `\n`, when
/// [`MAX_RESPONSE_LEN`] bytes have arrived, or when a read times out.
///
/// A frame cut at the length cap has the rest of its line discarded, so the
/// next exchange on the same link starts on a fresh line.
pub fn read_frame(link: &mut dyn SerialLink) -> Result<Vec<u8>> {
    let mut buffer = [0u8; MAX_RESPONSE_LEN];
    let mut total_read = 0;
    let mut terminated = false;

    while total_read < MAX_RESPONSE_LEN {
        let bytes_read = link.read_data(&mut buffer[total_read..])?;
        if bytes_read == 0 {
            terminated = true;
            break;
        }
        let chunk_start = total_read;
        total_read += bytes_read;
        if buffer[chunk_start..total_read].contains(&b'\n') {
            terminated = true;
            break;
        }
    }

    log::trace!("<- {}", buffer[..total_read].escape_ascii());
    if !terminated {
        discard_line_tail(link)?;
    }
    Ok(buffer[..total_read].to_vec())
}

/// Read and drop bytes up to the next `\n` or timeout, one byte at a time
/// so nothing after the newline is consumed.
fn discard_line_tail(link: &mut dyn SerialLink) -> Result<()> {
    let mut byte = [0u8; 1];
    let mut discarded = 0usize;
    while link.read_data(&mut byte)? == 1 {
        discarded += 1;
        if byte[0] == b'\n' {
            break;
        }
    }
    if discarded > 0 {
        log::debug!("Discarded {} bytes past the {} byte response limit", discarded, MAX_RESPONSE_LEN);
    }
    Ok(())
}
