use std::sync::Arc;
use std::thread;
use std::time::Duration;

use usb_sensors::sensor::UsbSensor;
use usb_sensors::serial::mock::{MockOpener, MockReply, RecordedWrite};
use usb_sensors::serial::{SensorError, TransportGate};

fn responder(frame: &[u8]) -> MockReply {
    match frame {
        b"GT\r\n" => MockReply::text("21.50\r\n"),
        b"GH\r\n" => MockReply::text("40.00\r\n"),
        _ => MockReply::text("OK\n"),
    }
}

/// Frames of one session must form a single contiguous run in the log.
fn assert_sessions_contiguous(writes: &[RecordedWrite]) {
    let mut finished = std::collections::HashSet::new();
    let mut current = None;
    for write in writes {
        if current != Some(write.session) {
            if let Some(previous) = current {
                finished.insert(previous);
            }
            assert!(
                !finished.contains(&write.session),
                "session {} resumed after another session wrote: {:?}",
                write.session,
                writes
            );
            current = Some(write.session);
        }
    }
}

#[test]
fn test_transactions_never_interleave() {
    let opener = MockOpener::new(responder).with_latency(Duration::from_millis(1));
    let gate = Arc::new(TransportGate::new());

    let workers: Vec<_> = ["/dev/ttyACM0", "/dev/ttyACM1"]
        .into_iter()
        .map(|port| {
            let sensor = UsbSensor::builder(port)
                .read_light(true)
                .gate(Arc::clone(&gate))
                .opener(Arc::new(opener.clone()))
                .build();
            thread::spawn(move || {
                for _ in 0..10 {
                    assert_eq!(sensor.temperature().unwrap(), Some(21.5));
                    assert_eq!(sensor.humidity().unwrap(), Some(40.0));
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let writes = opener.writes();
    assert_eq!(writes.len(), 2 * 10 * 2 * 3);
    assert_sessions_contiguous(&writes);
    for session in writes.chunks(3) {
        let frames: Vec<String> = session.iter().map(RecordedWrite::frame_text).collect();
        assert_eq!(frames[0], "I=1\r\n");
        assert_eq!(frames[2], "I=0\r\n");
    }
}

#[test]
fn test_one_handle_shared_between_threads() {
    let opener = MockOpener::new(responder).with_latency(Duration::from_millis(1));
    let sensor = UsbSensor::builder("/dev/ttyACM0")
        .gate(Arc::new(TransportGate::new()))
        .opener(Arc::new(opener.clone()))
        .build();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..5 {
                    assert!(sensor.set_led(true).unwrap());
                }
            });
        }
    });

    let writes = opener.writes();
    assert_eq!(writes.len(), 20);
    assert_sessions_contiguous(&writes);
}

#[test]
fn test_nested_transaction_is_rejected() {
    let opener = MockOpener::new(responder);
    let gate = Arc::new(TransportGate::new());
    let sensor = UsbSensor::builder("/dev/ttyACM0")
        .gate(Arc::clone(&gate))
        .opener(Arc::new(opener.clone()))
        .build();

    let nested = gate.with_exclusive_transaction(|| sensor.temperature());
    assert!(matches!(nested, Err(SensorError::AlreadyInTransaction)));
    assert_eq!(opener.open_calls(), 0);

    assert_eq!(sensor.temperature().unwrap(), Some(21.5));
}
