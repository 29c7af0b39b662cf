use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{Result, SensorError};

static GLOBAL_GATE: Lazy<Arc<TransportGate>> = Lazy::new(|| Arc::new(TransportGate::new()));

/// Serializes transactions on the serial bus.
///
/// Every handle sharing a gate gets a total order over its transactions:
/// no two open/write/read/close sequences overlap. The gate is not
/// reentrant. A thread that starts a transaction from inside another one
/// gets [`SensorError::AlreadyInTransaction`] instead of a deadlock.
#[derive(Debug, Default)]
pub struct TransportGate {
    lock: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

impl TransportGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide gate, created on first use. Handles built without an
    /// explicit gate share this one.
    pub fn global() -> Arc<TransportGate> {
        Arc::clone(&GLOBAL_GATE)
    }

    /// Run `transaction` while holding the gate. The gate is released on
    /// every exit path, panics included.
    pub fn with_exclusive_transaction<T, F>(&self, transaction: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let current = thread::current().id();
        if *self.owner.lock() == Some(current) {
            log::error!("Nested transaction attempted on {:?}", current);
            return Err(SensorError::AlreadyInTransaction);
        }

        let _held = self.lock.lock();
        let _owner = OwnerMark::claim(&self.owner, current);
        transaction()
    }

    /// Whether some transaction currently holds the gate.
    pub fn is_busy(&self) -> bool {
        self.lock.is_locked()
    }
}

struct OwnerMark<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> OwnerMark<'a> {
    fn claim(slot: &'a Mutex<Option<ThreadId>>, owner: ThreadId) -> Self {
        *slot.lock() = Some(owner);
        Self { slot }
    }
}

impl Drop for OwnerMark<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_nested_transaction_is_rejected() {
        let gate = TransportGate::new();
        let result = gate.with_exclusive_transaction(|| {
            gate.with_exclusive_transaction(|| Ok(()))
        });
        assert!(matches!(result, Err(SensorError::AlreadyInTransaction)));
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_released_after_error() {
        let gate = TransportGate::new();
        let result: Result<()> = gate.with_exclusive_transaction(|| {
            Err(SensorError::TransportFailure("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(!gate.is_busy());
        assert_eq!(gate.with_exclusive_transaction(|| Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_released_after_panic() {
        let gate = TransportGate::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = gate.with_exclusive_transaction::<(), _>(|| panic!("sensor exploded"));
        }));
        assert!(outcome.is_err());
        assert!(!gate.is_busy());
        assert!(gate.with_exclusive_transaction(|| Ok(())).is_ok());
    }

    #[test]
    fn test_mutual_exclusion_across_threads() {
        let gate = Arc::new(TransportGate::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                thread::spawn(move || {
                    for _ in 0..10 {
                        gate.with_exclusive_transaction(|| {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(1));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_global_gate_is_shared() {
        assert!(Arc::ptr_eq(&TransportGate::global(), &TransportGate::global()));
    }
}
