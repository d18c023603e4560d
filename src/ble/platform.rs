//! btleplug-backed transport.
//!
//! Implements [`BleTransport`] on the host's first Bluetooth adapter,
//! including the retry loop, service-discovery caching and link-loss
//! detection the connection manager relies on.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::device::DeviceHandle;
use crate::ble::transport::{
    BleTransport, CachedServices, DisconnectCallback, GattSession, SignalAccessor,
};
use crate::config::LiloConfig;
use crate::error::{Error, Result};

/// Upper bound on a single link-layer connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// A peripheral with its link up and characteristics known.
struct OpenLink {
    peripheral: Peripheral,
    characteristics: HashMap<Uuid, Characteristic>,
    /// Adapter events, subscribed before the link came up.
    events: Option<EventStream>,
}

/// Transport on top of btleplug.
pub struct BtleplugTransport {
    /// The BLE adapter to use.
    adapter: Adapter,
    /// Peripherals seen during scans, by identifier.
    peripherals: RwLock<HashMap<String, Peripheral>>,
    /// Retry policy.
    config: LiloConfig,
}

impl BtleplugTransport {
    /// Create a transport on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(LiloConfig::default()).await
    }

    /// Create a transport on the first available adapter with a retry policy.
    pub async fn with_config(config: LiloConfig) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter, config))
    }

    /// Create a transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter, config: LiloConfig) -> Self {
        Self {
            adapter,
            peripherals: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Find the peripheral behind a handle.
    async fn resolve(&self, device: &DeviceHandle) -> Result<Peripheral> {
        if let Some(peripheral) = self.peripherals.read().get(&device.identifier).cloned() {
            return Ok(peripheral);
        }

        let peripheral = self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.id().to_string() == device.identifier)
            .ok_or_else(|| Error::DeviceNotFound {
                identifier: device.identifier.clone(),
            })?;

        self.peripherals
            .write()
            .insert(device.identifier.clone(), peripheral.clone());

        Ok(peripheral)
    }

    /// One connection attempt: link up, then characteristics.
    ///
    /// A link brought up by a failed attempt is torn down again.
    async fn connect_once(
        &self,
        device: &DeviceHandle,
        cached_services: Option<&CachedServices>,
    ) -> Result<OpenLink> {
        let peripheral = self.resolve(device).await?;

        // Subscribe first so a drop right after link-up is still seen.
        let events = match self.adapter.events().await {
            Ok(events) => Some(events),
            Err(e) => {
                warn!("Failed to get adapter events, link loss only detected on read: {}", e);
                None
            }
        };

        let characteristics = release_on_failure(
            link_up(&peripheral, device, cached_services),
            || peripheral.disconnect(),
        )
        .await?;
        debug!("Discovered {} characteristics", characteristics.len());

        Ok(OpenLink {
            peripheral,
            characteristics,
            events,
        })
    }
}

/// Bring the link up and collect characteristics, skipping discovery when
/// the cached set is still known to the peripheral.
async fn link_up(
    peripheral: &Peripheral,
    device: &DeviceHandle,
    cached_services: Option<&CachedServices>,
) -> Result<HashMap<Uuid, Characteristic>> {
    if !peripheral.is_connected().await.unwrap_or(false) {
        tokio::time::timeout(CONNECT_TIMEOUT, peripheral.connect())
            .await
            .map_err(|_| Error::ConnectionFailed {
                reason: format!("no link after {:?}", CONNECT_TIMEOUT),
            })??;
    }

    let known = peripheral.characteristics();
    let cache_usable = cached_services.is_some_and(|cache| {
        cache.matches(device)
            && !cache.characteristics.is_empty()
            && cache.characteristics.iter().all(|c| known.contains(c))
    });

    if cache_usable {
        debug!("Reusing cached services for {}", device.display_name());
    } else {
        peripheral.discover_services().await?;
    }

    Ok(peripheral
        .characteristics()
        .into_iter()
        .map(|c| (c.uuid, c))
        .collect())
}

/// Run `setup`, calling `release` if it fails. The setup error is returned.
async fn release_on_failure<T, S, R, F, E>(setup: S, release: R) -> Result<T>
where
    S: Future<Output = Result<T>>,
    R: FnOnce() -> F,
    F: Future<Output = std::result::Result<(), E>>,
    E: fmt::Display,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(release_error) = release().await {
                debug!("Failed to release link: {}", release_error);
            }
            Err(e)
        }
    }
}

/// Try `connect_once` up to `config.connect_attempts` times.
///
/// The handle is re-read through `signal_accessor` before every attempt, and
/// attempts are separated by [`LiloConfig::backoff_for`]. On success the
/// handle the winning attempt used is returned with its result.
async fn retry_establish<L, C, F>(
    config: &LiloConfig,
    client_name: &str,
    device: &DeviceHandle,
    signal_accessor: &SignalAccessor,
    mut connect_once: C,
) -> Result<(DeviceHandle, L)>
where
    C: FnMut(DeviceHandle) -> F,
    F: Future<Output = Result<L>>,
{
    let max_attempts = config.connect_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        // Pick up a handle rebound since the last attempt.
        let current = signal_accessor().unwrap_or_else(|| device.clone());

        debug!(
            "{}: Connection attempt {} of {}; RSSI: {:?}",
            client_name, attempt, max_attempts, current.rssi
        );

        match connect_once(current.clone()).await {
            Ok(link) => return Ok((current, link)),
            Err(e) => {
                warn!("{}: Connection attempt {} failed: {}", client_name, attempt, e);
                last_error = Some(e);

                if attempt < max_attempts {
                    tokio::time::sleep(config.backoff_for(attempt)).await;
                }
            }
        }
    }

    Err(Error::ConnectionFailed {
        reason: match last_error {
            Some(e) => format!("Failed after {} attempts: {}", max_attempts, e),
            None => format!("Failed after {} attempts", max_attempts),
        },
    })
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    async fn scan(&self, name_filter: &str, window: Duration) -> Result<Vec<DeviceHandle>> {
        info!("Starting BLE scan");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        tokio::time::sleep(window).await;

        let peripherals = self.adapter.peripherals().await;

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scan: {}", e);
        }

        let mut found = Vec::new();
        for peripheral in peripherals? {
            let properties = match peripheral.properties().await {
                Ok(Some(p)) => p,
                _ => continue,
            };

            if properties.local_name.as_deref() != Some(name_filter) {
                continue;
            }

            let identifier = peripheral.id().to_string();
            trace!("Matched advertiser {}", identifier);

            self.peripherals
                .write()
                .insert(identifier.clone(), peripheral.clone());
            found.push(DeviceHandle::new(
                identifier,
                properties.local_name,
                properties.rssi,
            ));
        }

        Ok(found)
    }

    async fn establish(
        &self,
        device: &DeviceHandle,
        client_name: &str,
        on_disconnect: DisconnectCallback,
        cached_services: Option<CachedServices>,
        signal_accessor: SignalAccessor,
    ) -> Result<Arc<dyn GattSession>> {
        let cached_services = cached_services.as_ref();

        let (current, link) = retry_establish(
            &self.config,
            client_name,
            device,
            &signal_accessor,
            move |current| async move { self.connect_once(&current, cached_services).await },
        )
        .await?;

        info!("{}: Connected to {}", client_name, current);

        Ok(Arc::new(BtleSession::start(
            link,
            current.identifier,
            on_disconnect,
        )))
    }
}

/// An open btleplug connection.
pub struct BtleSession {
    /// The connected peripheral.
    peripheral: Peripheral,
    /// Identifier the session was opened for.
    identifier: String,
    /// Characteristics by UUID.
    characteristics: HashMap<Uuid, Characteristic>,
    /// Cleared once the link is known to be down.
    connected: Arc<AtomicBool>,
    /// Fired exactly once when `connected` goes false.
    on_disconnect: DisconnectCallback,
    /// Task watching adapter events for our disconnect.
    watcher: Option<tokio::task::JoinHandle<()>>,
}

impl BtleSession {
    fn start(link: OpenLink, identifier: String, on_disconnect: DisconnectCallback) -> Self {
        let OpenLink {
            peripheral,
            characteristics,
            events,
        } = link;
        let connected = Arc::new(AtomicBool::new(true));

        let watcher = events.map(|events| {
            let disconnects = events.filter_map(|event| {
                futures::future::ready(match event {
                    CentralEvent::DeviceDisconnected(id) => Some(id),
                    _ => None,
                })
            });
            tokio::spawn(watch_disconnect(
                disconnects,
                peripheral.id(),
                connected.clone(),
                on_disconnect.clone(),
            ))
        });

        Self {
            peripheral,
            identifier,
            characteristics,
            connected,
            on_disconnect,
            watcher,
        }
    }
}

fn mark_disconnected(connected: &AtomicBool, on_disconnect: &DisconnectCallback) {
    if connected.swap(false, Ordering::SeqCst) {
        on_disconnect();
    }
}

/// Wait for `id` to show up in `disconnects`.
///
/// The end of the stream means the adapter went away, which takes the link
/// with it.
async fn watch_disconnect<S, I>(
    disconnects: S,
    id: I,
    connected: Arc<AtomicBool>,
    on_disconnect: DisconnectCallback,
) where
    S: Stream<Item = I>,
    I: PartialEq + fmt::Debug,
{
    tokio::pin!(disconnects);

    while let Some(event_id) = disconnects.next().await {
        if event_id == id {
            debug!("Device disconnected: {:?}", event_id);
            mark_disconnected(&connected, &on_disconnect);
            return;
        }
    }

    debug!("Adapter event stream ended, treating {:?} as disconnected", id);
    mark_disconnected(&connected, &on_disconnect);
}

#[async_trait]
impl GattSession for BtleSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Bytes> {
        let characteristic =
            self.characteristics
                .get(&uuid)
                .ok_or_else(|| Error::CharacteristicNotFound {
                    uuid: uuid.to_string(),
                })?;

        match self.peripheral.read(characteristic).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => {
                if !self.peripheral.is_connected().await.unwrap_or(false) {
                    mark_disconnected(&self.connected, &self.on_disconnect);
                }
                Err(Error::ReadFailed {
                    uuid: uuid.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn services(&self) -> Option<CachedServices> {
        Some(CachedServices {
            identifier: self.identifier.clone(),
            characteristics: self.characteristics.values().cloned().collect(),
        })
    }
}

impl Drop for BtleSession {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }

        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        // Release the link; dropping the session is the only teardown the manager does.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let peripheral = self.peripheral.clone();
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!("Failed to disconnect: {}", e);
                }
            });
        }
    }
}
