//! # ExitEventBus: one kernel channel, many listeners.
//!
//! Multiplexes the single process-event channel to every registered
//! [`ExitListener`]. One instance per process, explicitly constructed and
//! injected into each job rather than reached as ambient global state.
//!
//! ## Invariants
//! - The channel is open **iff** the registry is non-empty; the
//!   open-on-first-register / close-on-last-unregister transition happens
//!   under the registry mutex, so it is atomic with the membership change.
//! - Records are delivered to listeners in registration order, under the same
//!   mutex, on the bus's dedicated reader thread.
//! - The bus does no per-pid routing: listeners filter by pid themselves and
//!   must tolerate events for pids they no longer own.
//!
//! ## Threading
//! The reader thread performs blocking channel reads (with a short timeout so
//! it can observe its stop flag) and must never be the tokio pool: listener
//! callbacks run on it and are expected to do no more than filter and hand
//! off. Teardown requires all listeners to have unregistered first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use crate::error::ObserverError;

use super::channel::{ChannelFactory, EventChannel, ProcConnector};
use super::record::ExitRecord;

/// Consumer of decoded kernel process events.
///
/// `update` runs on the bus's reader thread while the registry lock is held:
/// it must be fast and non-blocking (filter by pid, push to a queue).
pub trait ExitListener: Send + Sync + 'static {
    /// Handles one decoded event.
    fn update(&self, record: &ExitRecord);
}

struct Reader {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    listeners: Vec<Arc<dyn ExitListener>>,
    reader: Option<Reader>,
}

/// Shared multiplexer over the kernel process-event channel.
pub struct ExitEventBus {
    registry: Mutex<Registry>,
    factory: ChannelFactory,
}

impl ExitEventBus {
    /// Creates a bus with a custom channel factory (used by tests).
    pub fn with_factory(factory: ChannelFactory) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry::default()),
            factory,
        })
    }

    /// Creates a bus over the Linux proc connector.
    ///
    /// The channel is not opened until the first listener registers.
    pub fn proc_connector() -> Arc<Self> {
        Self::with_factory(ProcConnector::factory())
    }

    /// Registers a listener.
    ///
    /// The first registration opens the channel and starts listening; if
    /// that fails the error is returned and the registry stays empty.
    /// Registering the same listener twice is rejected.
    pub fn register(self: &Arc<Self>, listener: Arc<dyn ExitListener>) -> Result<(), ObserverError> {
        let mut reg = self.lock_registry();

        if reg.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return Err(ObserverError::AlreadyRegistered);
        }

        if reg.listeners.is_empty() {
            let mut channel = (self.factory)();
            channel.open().map_err(ObserverError::Channel)?;
            if let Err(e) = channel.control(true) {
                channel.close();
                return Err(ObserverError::Channel(e));
            }

            let stop = Arc::new(AtomicBool::new(false));
            let bus = Arc::downgrade(self);
            let flag = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name("exit-bus-reader".into())
                .spawn(move || reader_loop(bus, channel, flag))
                .map_err(ObserverError::Channel)?;
            reg.reader = Some(Reader { stop, handle });
        }

        reg.listeners.push(listener);
        Ok(())
    }

    /// Unregisters a listener.
    ///
    /// Removing the last listener stops listening and closes the channel
    /// (the reader thread sends the stop control record on its way out).
    /// Unregistering an absent listener is rejected.
    pub fn unregister(&self, listener: &Arc<dyn ExitListener>) -> Result<(), ObserverError> {
        let reader = {
            let mut reg = self.lock_registry();
            let pos = reg
                .listeners
                .iter()
                .position(|l| Arc::ptr_eq(l, listener))
                .ok_or(ObserverError::NotRegistered)?;
            reg.listeners.remove(pos);

            if reg.listeners.is_empty() {
                reg.reader.take()
            } else {
                None
            }
        };

        // Join outside the lock: the reader takes the same lock to fan out.
        if let Some(reader) = reader {
            reader.stop.store(true, Ordering::Release);
            if reader.handle.join().is_err() {
                tracing::warn!("exit bus reader thread panicked");
            }
        }
        Ok(())
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock_registry().listeners.len()
    }

    /// True when no listener is registered (and hence the channel is closed).
    pub fn is_empty(&self) -> bool {
        self.lock_registry().listeners.is_empty()
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Drop for ExitEventBus {
    fn drop(&mut self) {
        let reg = self.lock_registry();
        debug_assert!(
            reg.listeners.is_empty(),
            "exit bus dropped with registered listeners"
        );
    }
}

/// Reader loop: decode each inbound payload and fan it out to the current
/// listeners, in registration order, under the registry lock.
fn reader_loop(bus: Weak<ExitEventBus>, mut channel: Box<dyn EventChannel>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        match channel.recv() {
            Ok(Some(payload)) => {
                let record = ExitRecord::decode(&payload);
                let Some(bus) = bus.upgrade() else { break };
                let reg = bus.lock_registry();
                for listener in &reg.listeners {
                    listener.update(&record);
                }
            }
            Ok(None) => {} // receive tick; re-check the stop flag
            Err(e) => {
                tracing::warn!(error = %e, "exit bus channel read failed");
                break;
            }
        }
    }

    if let Err(e) = channel.control(false) {
        tracing::warn!(error = %e, "exit bus stop-listening control failed");
    }
    channel.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::channel::EventChannel;
    use std::io;
    use std::sync::mpsc;
    use std::time::Duration;

    /// What a fake channel observed, for asserting the open/close protocol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Ctl {
        Open,
        Listen,
        Ignore,
        Close,
    }

    struct FakeChannel {
        log: Arc<Mutex<Vec<Ctl>>>,
        rx: mpsc::Receiver<Vec<u8>>,
        fail_open: bool,
    }

    impl EventChannel for FakeChannel {
        fn open(&mut self) -> io::Result<()> {
            if self.fail_open {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "no cap"));
            }
            self.log.lock().unwrap().push(Ctl::Open);
            Ok(())
        }
        fn control(&mut self, listen: bool) -> io::Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(if listen { Ctl::Listen } else { Ctl::Ignore });
            Ok(())
        }
        fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(payload) => Ok(Some(payload)),
                Err(_) => Ok(None),
            }
        }
        fn close(&mut self) {
            self.log.lock().unwrap().push(Ctl::Close);
        }
    }

    struct Harness {
        log: Arc<Mutex<Vec<Ctl>>>,
        tx: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    }

    fn fake_bus(fail_open: bool) -> (Arc<ExitEventBus>, Harness) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tx = Arc::new(Mutex::new(None::<mpsc::Sender<Vec<u8>>>));
        let h = Harness {
            log: Arc::clone(&log),
            tx: Arc::clone(&tx),
        };
        let bus = ExitEventBus::with_factory(Box::new(move || {
            let (sender, rx) = mpsc::channel();
            *tx.lock().unwrap() = Some(sender);
            Box::new(FakeChannel {
                log: Arc::clone(&log),
                rx,
                fail_open,
            })
        }));
        (bus, h)
    }

    struct Collect {
        seen: Mutex<Vec<ExitRecord>>,
    }

    impl Collect {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl ExitListener for Collect {
        fn update(&self, record: &ExitRecord) {
            self.seen.lock().unwrap().push(*record);
        }
    }

    fn exit_payload(pid: u32, code: u32) -> Vec<u8> {
        let mut buf = vec![0u8; 40];
        buf[0..4].copy_from_slice(&0x8000_0000u32.to_ne_bytes());
        buf[16..20].copy_from_slice(&pid.to_ne_bytes());
        buf[20..24].copy_from_slice(&pid.to_ne_bytes());
        buf[24..28].copy_from_slice(&code.to_ne_bytes());
        buf
    }

    #[test]
    fn test_channel_open_iff_registry_non_empty() {
        let (bus, h) = fake_bus(false);
        let a: Arc<dyn ExitListener> = Collect::new();
        let b: Arc<dyn ExitListener> = Collect::new();

        assert!(bus.is_empty());
        assert!(h.log.lock().unwrap().is_empty());

        bus.register(Arc::clone(&a)).unwrap();
        assert_eq!(*h.log.lock().unwrap(), vec![Ctl::Open, Ctl::Listen]);

        // Second registration does not reopen.
        bus.register(Arc::clone(&b)).unwrap();
        assert_eq!(h.log.lock().unwrap().len(), 2);

        bus.unregister(&a).unwrap();
        assert_eq!(h.log.lock().unwrap().len(), 2);

        bus.unregister(&b).unwrap();
        assert_eq!(
            *h.log.lock().unwrap(),
            vec![Ctl::Open, Ctl::Listen, Ctl::Ignore, Ctl::Close]
        );
        assert!(bus.is_empty());
    }

    #[test]
    fn test_reopen_after_full_drain() {
        let (bus, h) = fake_bus(false);
        let a: Arc<dyn ExitListener> = Collect::new();

        bus.register(Arc::clone(&a)).unwrap();
        bus.unregister(&a).unwrap();
        bus.register(Arc::clone(&a)).unwrap();
        bus.unregister(&a).unwrap();

        assert_eq!(
            *h.log.lock().unwrap(),
            vec![
                Ctl::Open,
                Ctl::Listen,
                Ctl::Ignore,
                Ctl::Close,
                Ctl::Open,
                Ctl::Listen,
                Ctl::Ignore,
                Ctl::Close
            ]
        );
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let (bus, _h) = fake_bus(false);
        let a: Arc<dyn ExitListener> = Collect::new();
        bus.register(Arc::clone(&a)).unwrap();
        let err = bus.register(Arc::clone(&a)).unwrap_err();
        assert!(matches!(err, ObserverError::AlreadyRegistered));
        assert_eq!(bus.len(), 1);
        bus.unregister(&a).unwrap();
    }

    #[test]
    fn test_unregister_absent_rejected() {
        let (bus, _h) = fake_bus(false);
        let a: Arc<dyn ExitListener> = Collect::new();
        let err = bus.unregister(&a).unwrap_err();
        assert!(matches!(err, ObserverError::NotRegistered));
    }

    #[test]
    fn test_failed_open_leaves_registry_empty() {
        let (bus, h) = fake_bus(true);
        let a: Arc<dyn ExitListener> = Collect::new();
        let err = bus.register(Arc::clone(&a)).unwrap_err();
        assert!(matches!(err, ObserverError::Channel(_)));
        assert!(bus.is_empty());
        assert!(h.log.lock().unwrap().is_empty());
        // The bus is still usable if a working channel appears later; nothing
        // was left half-open.
        let err = bus.unregister(&a).unwrap_err();
        assert!(matches!(err, ObserverError::NotRegistered));
    }

    #[test]
    fn test_fan_out_in_registration_order() {
        let (bus, h) = fake_bus(false);
        let first = Collect::new();
        let second = Collect::new();
        let a: Arc<dyn ExitListener> = Arc::clone(&first) as Arc<dyn ExitListener>;
        let b: Arc<dyn ExitListener> = Arc::clone(&second) as Arc<dyn ExitListener>;

        bus.register(Arc::clone(&a)).unwrap();
        bus.register(Arc::clone(&b)).unwrap();

        let tx = h.tx.lock().unwrap().clone().unwrap();
        tx.send(exit_payload(1234, 0)).unwrap();
        tx.send(exit_payload(1234, 256)).unwrap();

        // Wait for the reader thread to drain the channel.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while second.seen.lock().unwrap().len() < 2 {
            assert!(std::time::Instant::now() < deadline, "fan-out timed out");
            std::thread::sleep(Duration::from_millis(10));
        }

        let got = first.seen.lock().unwrap().clone();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].pid, 1234);
        assert_eq!(got[0].exit_code, 0);
        assert_eq!(got[1].exit_code, 256);
        assert_eq!(*second.seen.lock().unwrap(), got);

        bus.unregister(&a).unwrap();
        bus.unregister(&b).unwrap();
    }
}
