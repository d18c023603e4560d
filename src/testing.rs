//! In-memory transport for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::ble::device::DeviceHandle;
use crate::ble::transport::{
    BleTransport, CachedServices, DisconnectCallback, GattSession, SignalAccessor,
};
use crate::ble::uuids::{LIGHT_CHARACTERISTIC_UUID, TIME_CHARACTERISTIC_UUID};
use crate::error::{Error, Result};

pub(crate) const LILO_ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

pub(crate) fn lilo_handle() -> DeviceHandle {
    DeviceHandle::new(LILO_ADDRESS, Some("LILO".to_string()), Some(-70))
}

/// Session whose reads are scripted per characteristic.
pub(crate) struct FakeSession {
    connected: AtomicBool,
    values: Mutex<HashMap<Uuid, std::result::Result<Vec<u8>, String>>>,
    gate: Option<Semaphore>,
    reads: AtomicUsize,
}

impl FakeSession {
    /// Connected session answering `0x0c..` for time and `0x02ff` for light.
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert(TIME_CHARACTERISTIC_UUID, Ok(vec![0x0c, 0x1e, 0x00]));
        values.insert(LIGHT_CHARACTERISTIC_UUID, Ok(vec![0x02, 0xff]));

        Self {
            connected: AtomicBool::new(true),
            values: Mutex::new(values),
            gate: None,
            reads: AtomicUsize::new(0),
        }
    }

    /// Reads block until [`release`](Self::release) hands out permits.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn with_value(self, uuid: Uuid, value: &[u8]) -> Self {
        self.values.lock().insert(uuid, Ok(value.to_vec()));
        self
    }

    pub fn set_value(&self, uuid: Uuid, value: &[u8]) {
        self.values.lock().insert(uuid, Ok(value.to_vec()));
    }

    pub fn set_failure(&self, uuid: Uuid, reason: &str) {
        self.values.lock().insert(uuid, Err(reason.to_string()));
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattSession for FakeSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| Error::NotConnected)?
                .forget();
        }

        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        match self.values.lock().get(&uuid) {
            Some(Ok(value)) => Ok(Bytes::from(value.clone())),
            Some(Err(reason)) => Err(Error::ReadFailed {
                uuid: uuid.to_string(),
                reason: reason.clone(),
            }),
            None => Err(Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            }),
        }
    }

    fn services(&self) -> Option<CachedServices> {
        Some(CachedServices {
            identifier: LILO_ADDRESS.to_string(),
            characteristics: Vec::new(),
        })
    }
}

/// Transport handing out queued sessions and recording what it was given.
pub(crate) struct FakeTransport {
    outcomes: Mutex<VecDeque<std::result::Result<Arc<dyn GattSession>, String>>>,
    scan_result: Mutex<std::result::Result<Vec<DeviceHandle>, String>>,
    establish_delay: Option<Duration>,
    establish_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    fake_sessions: Mutex<Vec<Arc<FakeSession>>>,
    callbacks: Mutex<Vec<DisconnectCallback>>,
    accessors: Mutex<Vec<SignalAccessor>>,
    cached_hints: Mutex<Vec<Option<CachedServices>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            scan_result: Mutex::new(Ok(Vec::new())),
            establish_delay: None,
            establish_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            fake_sessions: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            accessors: Mutex::new(Vec::new()),
            cached_hints: Mutex::new(Vec::new()),
        }
    }

    pub fn with_establish_delay(mut self, delay: Duration) -> Self {
        self.establish_delay = Some(delay);
        self
    }

    pub fn with_scan_result(self, devices: Vec<DeviceHandle>) -> Self {
        *self.scan_result.lock() = Ok(devices);
        self
    }

    pub fn with_scan_error(self, reason: &str) -> Self {
        *self.scan_result.lock() = Err(reason.to_string());
        self
    }

    /// Queue the session returned by the next `establish`.
    pub fn push_session(&self, session: Arc<dyn GattSession>) {
        self.outcomes.lock().push_back(Ok(session));
    }

    /// Queue a fake session that [`drop_link`](Self::drop_link) can later cut.
    pub fn push_fake(&self, session: Arc<FakeSession>) {
        self.fake_sessions.lock().push(session.clone());
        self.outcomes.lock().push_back(Ok(session));
    }

    /// Queue a failure for the next `establish`.
    pub fn push_failure(&self, reason: &str) {
        self.outcomes.lock().push_back(Err(reason.to_string()));
    }

    pub fn establish_calls(&self) -> usize {
        self.establish_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn last_callback(&self) -> Option<DisconnectCallback> {
        self.callbacks.lock().last().cloned()
    }

    pub fn last_accessor(&self) -> Option<SignalAccessor> {
        self.accessors.lock().last().cloned()
    }

    pub fn cached_hints(&self) -> Vec<Option<CachedServices>> {
        self.cached_hints.lock().clone()
    }

    /// Simulate link loss on the most recent fake session.
    pub fn drop_link(&self) {
        if let Some(session) = self.fake_sessions.lock().last() {
            session.set_connected(false);
        }
        if let Some(callback) = self.last_callback() {
            callback();
        }
    }
}

#[async_trait]
impl BleTransport for FakeTransport {
    async fn scan(&self, _name_filter: &str, _window: Duration) -> Result<Vec<DeviceHandle>> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);

        self.scan_result
            .lock()
            .clone()
            .map_err(|reason| Error::ConnectionFailed { reason })
    }

    async fn establish(
        &self,
        _device: &DeviceHandle,
        _client_name: &str,
        on_disconnect: DisconnectCallback,
        cached_services: Option<CachedServices>,
        signal_accessor: SignalAccessor,
    ) -> Result<Arc<dyn GattSession>> {
        self.establish_calls.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().push(on_disconnect);
        self.accessors.lock().push(signal_accessor);
        self.cached_hints.lock().push(cached_services);

        if let Some(delay) = self.establish_delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcomes.lock().pop_front();
        match outcome {
            Some(Ok(session)) => Ok(session),
            Some(Err(reason)) => Err(Error::ConnectionFailed { reason }),
            None => {
                let session = Arc::new(FakeSession::new());
                self.fake_sessions.lock().push(session.clone());
                Ok(session)
            }
        }
    }
}
