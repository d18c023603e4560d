//! BLE connection management.
//!
//! Owns the single GATT session to a LILO: establishes it on demand,
//! serializes concurrent attempts, and tears it down when the transport
//! reports the link lost.
//!
//! One manager per physical device. Two managers bound to the same
//! peripheral will fight over the link.

use bytes::Bytes;
use futures::future::try_join_all;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::ble::device::DeviceHandle;
use crate::ble::transport::{
    BleTransport, CachedServices, DisconnectCallback, GattSession, SignalAccessor,
};
use crate::config::LiloConfig;
use crate::error::{Error, Result};

/// Connection state for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the device.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the device.
    Connected,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The identifier of the bound device, if any.
    pub identifier: Option<String>,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Everything the manager mutates, behind one lock.
struct Link {
    device: Option<DeviceHandle>,
    session: Option<Arc<dyn GattSession>>,
    state: ConnectionState,
    /// Bumped on every establishment attempt and explicit teardown.
    /// Disconnect callbacks from older generations are ignored.
    generation: u64,
    cached_services: Option<CachedServices>,
}

impl Link {
    fn transition(
        &mut self,
        new_state: ConnectionState,
        event_tx: &broadcast::Sender<ConnectionEvent>,
    ) {
        let old_state = std::mem::replace(&mut self.state, new_state);

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = event_tx.send(ConnectionEvent {
                identifier: self.device.as_ref().map(|d| d.identifier.clone()),
                state: new_state,
            });
        }
    }

    fn rssi(&self) -> Option<i16> {
        self.device.as_ref().and_then(|d| d.rssi)
    }
}

/// Manages the connection to a LILO.
pub struct ConnectionManager<T> {
    /// The radio.
    transport: T,
    /// Name reported to the transport for diagnostics.
    client_name: String,
    /// Device, session and state.
    link: Arc<RwLock<Link>>,
    /// Serializes the check-establish-store sequence of `connect`.
    connect_lock: Mutex<()>,
    /// Channel for connection events.
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl<T: BleTransport + 'static> ConnectionManager<T> {
    /// Create a new connection manager with default settings.
    pub fn new(transport: T, device: Option<DeviceHandle>) -> Self {
        Self::with_config(transport, device, &LiloConfig::default())
    }

    /// Create a new connection manager.
    pub fn with_config(transport: T, device: Option<DeviceHandle>, config: &LiloConfig) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            transport,
            client_name: config.client_name.clone(),
            link: Arc::new(RwLock::new(Link {
                device,
                session: None,
                state: ConnectionState::Disconnected,
                generation: 0,
                cached_services: None,
            })),
            connect_lock: Mutex::new(()),
            event_tx,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.read().state
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the bound device handle.
    pub fn device(&self) -> Option<DeviceHandle> {
        self.link.read().device.clone()
    }

    /// Signal strength of the bound device handle.
    pub fn rssi(&self) -> Option<i16> {
        self.link.read().rssi()
    }

    /// Whether a session is currently held.
    pub fn has_session(&self) -> bool {
        self.link.read().session.is_some()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Get the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Bind a (fresher) device handle.
    ///
    /// An open session is left alone. The cached service hint is dropped if
    /// the new handle points at a different peripheral.
    pub fn set_ble_device(&self, device: DeviceHandle) {
        let mut link = self.link.write();

        if link
            .cached_services
            .as_ref()
            .is_some_and(|cache| !cache.matches(&device))
        {
            link.cached_services = None;
        }

        debug!("{}: Bound device {}", self.client_name, device);
        link.device = Some(device);
    }

    /// Drop the session and forget the device.
    ///
    /// Nothing will be connected until [`set_ble_device`](Self::set_ble_device)
    /// is called again.
    pub fn disconnect(&self) {
        let mut link = self.link.write();

        link.generation += 1;
        link.session = None;
        link.transition(ConnectionState::Disconnected, &self.event_tx);
        link.device = None;

        info!("{}: Disconnected and released device", self.client_name);
    }

    /// Make sure the connection is up, establishing it if needed.
    ///
    /// Failures are logged and swallowed; check [`is_connected`](Self::is_connected)
    /// afterwards, or use [`try_connect`](Self::try_connect) to see the error.
    pub async fn connect(&self) {
        match self.try_connect().await {
            Ok(()) => {}
            Err(Error::NoDeviceBound) => {
                debug!("{}: No device bound, nothing to connect to", self.client_name);
            }
            Err(e) => {
                debug!("{}: Error connecting to device: {}", self.client_name, e);
            }
        }
    }

    /// Make sure the connection is up, returning why it is not.
    pub async fn try_connect(&self) -> Result<()> {
        if self.live_session().is_some() {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;

        // Another caller may have connected while we waited for the lock.
        if self.live_session().is_some() {
            return Ok(());
        }

        let (device, generation, cached_services) = {
            let mut link = self.link.write();
            let device = link.device.clone().ok_or(Error::NoDeviceBound)?;
            link.generation += 1;
            let cached_services = link
                .cached_services
                .clone()
                .filter(|cache| cache.matches(&device));
            link.transition(ConnectionState::Connecting, &self.event_tx);
            (device, link.generation, cached_services)
        };

        debug!("{}: Connecting; RSSI: {:?}", self.client_name, device.rssi);

        let result = self
            .transport
            .establish(
                &device,
                &self.client_name,
                self.disconnect_callback(generation),
                cached_services,
                self.signal_accessor(),
            )
            .await;

        let mut link = self.link.write();

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                if link.generation == generation {
                    link.cached_services = None;
                    link.transition(ConnectionState::Disconnected, &self.event_tx);
                }
                return Err(e);
            }
        };

        if link.generation != generation {
            return Err(Error::ConnectionFailed {
                reason: "device released while connecting".to_string(),
            });
        }

        if !session.is_connected() {
            link.transition(ConnectionState::Disconnected, &self.event_tx);
            return Err(Error::ConnectionFailed {
                reason: "link dropped during establishment".to_string(),
            });
        }

        if let Some(services) = session.services() {
            link.cached_services = Some(services);
        }
        link.session = Some(session);
        link.transition(ConnectionState::Connected, &self.event_tx);

        debug!("{}: Connected; RSSI: {:?}", self.client_name, link.rssi());

        Ok(())
    }

    /// Read several characteristics concurrently over the current session.
    ///
    /// Either every read succeeds or the whole batch fails. Each read is
    /// bounded by `timeout`.
    pub async fn read_characteristics(
        &self,
        uuids: &[Uuid],
        timeout: Duration,
    ) -> Result<Vec<Bytes>> {
        let session = self.live_session().ok_or(Error::NotConnected)?;

        let reads = uuids.iter().map(|uuid| {
            let session = session.clone();
            let uuid = *uuid;
            async move {
                let data = tokio::time::timeout(timeout, session.read_characteristic(uuid))
                    .await
                    .map_err(|_| Error::Timeout)??;
                trace!("Read {} bytes from characteristic {}", data.len(), uuid);
                Ok::<_, Error>(data)
            }
        });

        let result = try_join_all(reads).await;

        if result.is_err() {
            // Prune the session if the failure was the link going away.
            let _ = self.live_session();
        }

        result
    }

    /// The session, if it is still up. Drops a dead one.
    fn live_session(&self) -> Option<Arc<dyn GattSession>> {
        let session = self.link.read().session.clone()?;

        if session.is_connected() {
            return Some(session);
        }

        let mut link = self.link.write();
        if link
            .session
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &session))
        {
            debug!("{}: Session no longer connected, dropping it", self.client_name);
            link.session = None;
            link.transition(ConnectionState::Disconnected, &self.event_tx);
        }

        None
    }

    /// Build the callback the transport fires when the link drops.
    fn disconnect_callback(&self, generation: u64) -> DisconnectCallback {
        let link: Weak<RwLock<Link>> = Arc::downgrade(&self.link);
        let event_tx = self.event_tx.clone();
        let client_name = self.client_name.clone();

        Arc::new(move || {
            let Some(link) = link.upgrade() else {
                return;
            };
            let mut link = link.write();

            if link.generation != generation {
                trace!("{}: Ignoring disconnect from a superseded session", client_name);
                return;
            }

            debug!(
                "{}: Disconnected from device; RSSI: {:?}",
                client_name,
                link.rssi()
            );
            link.session = None;
            link.transition(ConnectionState::Disconnected, &event_tx);
        })
    }

    /// Build the accessor the transport uses to see the current handle.
    fn signal_accessor(&self) -> SignalAccessor {
        let link: Weak<RwLock<Link>> = Arc::downgrade(&self.link);

        Arc::new(move || link.upgrade().and_then(|link| link.read().device.clone()))
    }
}
