//! Capability interface to the BLE stack.
//!
//! The connection manager and the reading coordinator only talk to the radio
//! through these traits. [`BtleplugTransport`](crate::ble::platform::BtleplugTransport)
//! is the production implementation; tests substitute fakes.

use async_trait::async_trait;
use btleplug::api::Characteristic;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::device::DeviceHandle;
use crate::error::Result;

/// Invoked by the transport when an established link drops.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Returns the freshest known handle for the device being connected.
///
/// Transports call this before every attempt so retry decisions use current
/// signal strength rather than a snapshot from when `establish` was called.
pub type SignalAccessor = Arc<dyn Fn() -> Option<DeviceHandle> + Send + Sync>;

/// Characteristics discovered on a previous connection.
///
/// Only valid for the peripheral it was taken from; transports must ignore a
/// hint whose identifier does not match the device being connected.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedServices {
    /// Identifier of the peripheral the set was discovered on.
    pub identifier: String,
    /// Discovered characteristics.
    pub characteristics: Vec<Characteristic>,
}

impl CachedServices {
    /// Check whether this cache applies to a device.
    pub fn matches(&self, device: &DeviceHandle) -> bool {
        self.identifier == device.identifier
    }
}

/// An established GATT client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GattSession: Send + Sync {
    /// Whether the transport still reports the link as up.
    fn is_connected(&self) -> bool;

    /// Read a characteristic value.
    ///
    /// Must be safe to call concurrently for distinct characteristics.
    async fn read_characteristic(&self, uuid: Uuid) -> Result<Bytes>;

    /// Characteristics discovered for this session, reusable as a hint next time.
    fn services(&self) -> Option<CachedServices>;
}

/// The radio: scanning and connection establishment.
#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Scan for `window` and return every advertiser whose name equals `name_filter`.
    async fn scan(&self, name_filter: &str, window: Duration) -> Result<Vec<DeviceHandle>>;

    /// Establish a GATT client to `device`.
    ///
    /// Retry and backoff policy is the transport's own concern. `on_disconnect`
    /// must be invoked whenever the established link is lost.
    async fn establish(
        &self,
        device: &DeviceHandle,
        client_name: &str,
        on_disconnect: DisconnectCallback,
        cached_services: Option<CachedServices>,
        signal_accessor: SignalAccessor,
    ) -> Result<Arc<dyn GattSession>>;
}

#[async_trait]
impl<T: BleTransport + ?Sized> BleTransport for Arc<T> {
    async fn scan(&self, name_filter: &str, window: Duration) -> Result<Vec<DeviceHandle>> {
        (**self).scan(name_filter, window).await
    }

    async fn establish(
        &self,
        device: &DeviceHandle,
        client_name: &str,
        on_disconnect: DisconnectCallback,
        cached_services: Option<CachedServices>,
        signal_accessor: SignalAccessor,
    ) -> Result<Arc<dyn GattSession>> {
        (**self)
            .establish(
                device,
                client_name,
                on_disconnect,
                cached_services,
                signal_accessor,
            )
            .await
    }
}
