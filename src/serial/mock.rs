//! Scripted stand-ins for the serial port and the port enumerator, used by
//! the test suites and by anyone driving a [`UsbSensor`](crate::sensor::UsbSensor)
//! without hardware.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::interface::{PortOpener, SerialLink};
use super::{Result, SensorError, SerialDeviceInfo, SerialSettings};
use crate::sensor::discovery::PortEnumerator;

/// What the fake sensor does after receiving a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Queue these bytes for the next reads.
    Frame(Vec<u8>),
    /// Say nothing; reads time out empty.
    Silence,
    /// Kill the session; the next read (and everything after it) fails.
    Fault(String),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        MockReply::Frame(text.as_bytes().to_vec())
    }
}

/// One frame written by a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// 1-based index of the session (one per successful open).
    pub session: usize,
    pub port: String,
    pub frame: Vec<u8>,
}

impl RecordedWrite {
    pub fn frame_text(&self) -> String {
        String::from_utf8_lossy(&self.frame).into_owned()
    }
}

#[derive(Debug, Default)]
struct MockState {
    open_calls: usize,
    sessions: usize,
    closed: usize,
    writes: Vec<RecordedWrite>,
}

type Responder = dyn Fn(&[u8]) -> MockReply + Send + Sync;

/// [`PortOpener`] whose links answer through a responder closure and log
/// every frame written to them.
#[derive(Clone)]
pub struct MockOpener {
    state: Arc<Mutex<MockState>>,
    responder: Arc<Responder>,
    open_failure: Option<String>,
    latency: Duration,
}

impl MockOpener {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[u8]) -> MockReply + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            responder: Arc::new(responder),
            open_failure: None,
            latency: Duration::ZERO,
        }
    }

    /// Answer each known frame with a fixed text; stay silent otherwise.
    pub fn with_replies(replies: &[(&str, &str)]) -> Self {
        let table: Vec<(Vec<u8>, Vec<u8>)> = replies
            .iter()
            .map(|(frame, reply)| (frame.as_bytes().to_vec(), reply.as_bytes().to_vec()))
            .collect();
        Self::new(move |frame| {
            table
                .iter()
                .find(|(known, _)| known.as_slice() == frame)
                .map(|(_, reply)| MockReply::Frame(reply.clone()))
                .unwrap_or(MockReply::Silence)
        })
    }

    /// Every open attempt fails with `message`.
    pub fn failing_open(message: &str) -> Self {
        let mut opener = Self::new(|_| MockReply::Silence);
        opener.open_failure = Some(message.to_string());
        opener
    }

    /// Sleep this long after each write, to widen race windows in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `open` calls, failed ones included.
    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    /// Number of sessions that were opened successfully.
    pub fn sessions(&self) -> usize {
        self.state.lock().sessions
    }

    /// Number of sessions that have been closed (dropped).
    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().writes.clone()
    }

    /// Written frames as text, in wire order.
    pub fn frames(&self) -> Vec<String> {
        self.state.lock().writes.iter().map(RecordedWrite::frame_text).collect()
    }
}

impl PortOpener for MockOpener {
    fn open(&self, port_name: &str, _settings: &SerialSettings) -> Result<Box<dyn SerialLink>> {
        let session = {
            let mut state = self.state.lock();
            state.open_calls += 1;
            if let Some(message) = &self.open_failure {
                return Err(SensorError::TransportFailure(message.clone()));
            }
            state.sessions += 1;
            state.sessions
        };

        Ok(Box::new(MockLink {
            session,
            port: port_name.to_string(),
            state: Arc::clone(&self.state),
            responder: Arc::clone(&self.responder),
            latency: self.latency,
            pending: VecDeque::new(),
            dead: None,
        }))
    }
}

struct MockLink {
    session: usize,
    port: String,
    state: Arc<Mutex<MockState>>,
    responder: Arc<Responder>,
    latency: Duration,
    pending: VecDeque<u8>,
    dead: Option<String>,
}

impl SerialLink for MockLink {
    fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        if let Some(message) = &self.dead {
            return Err(SensorError::TransportFailure(message.clone()));
        }

        self.state.lock().writes.push(RecordedWrite {
            session: self.session,
            port: self.port.clone(),
            frame: data.to_vec(),
        });
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        match (self.responder)(data) {
            MockReply::Frame(bytes) => self.pending.extend(bytes),
            MockReply::Silence => {}
            MockReply::Fault(message) => self.dead = Some(message),
        }
        Ok(data.len())
    }

    fn read_data(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if let Some(message) = &self.dead {
            return Err(SensorError::TransportFailure(message.clone()));
        }
        let count = buffer.len().min(self.pending.len());
        for (slot, byte) in buffer.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.state.lock().closed += 1;
    }
}

/// [`PortEnumerator`] over a fixed device list.
#[derive(Debug, Clone, Default)]
pub struct MockEnumerator {
    devices: Vec<SerialDeviceInfo>,
    failure: Option<String>,
}

impl MockEnumerator {
    pub fn new(devices: Vec<SerialDeviceInfo>) -> Self {
        Self { devices, failure: None }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            devices: Vec::new(),
            failure: Some(message.to_string()),
        }
    }

    /// Shorthand for a USB port entry.
    pub fn usb_port(port_name: &str, vid: u16, pid: u16) -> SerialDeviceInfo {
        SerialDeviceInfo {
            port_name: port_name.to_string(),
            vid,
            pid,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }
}

impl PortEnumerator for MockEnumerator {
    fn available_ports(&self) -> Result<Vec<SerialDeviceInfo>> {
        match &self.failure {
            Some(message) => Err(SensorError::TransportFailure(message.clone())),
            None => Ok(self.devices.clone()),
        }
    }
}
