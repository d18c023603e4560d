//! LILO client.
//!
//! Polls the two measurement characteristics over a managed connection and
//! keeps the latest complete reading.

use bytes::Bytes;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ble::connection::{ConnectionManager, ConnectionState};
use crate::ble::device::DeviceHandle;
use crate::ble::transport::BleTransport;
use crate::ble::uuids::MEASUREMENT_CHARACTERISTICS;
use crate::config::LiloConfig;
use crate::error::{Error, Result};
use crate::reading::{Measurement, SensorReading};

/// A LILO indoor garden.
///
/// Meant to be driven by an external loop calling [`gather`](Self::gather);
/// every call is cheap when throttled or unbound, and none of them fail.
///
/// ```rust,no_run
/// use lilo_rust_ble::{discover, BtleplugTransport, Lilo, Result};
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let transport = BtleplugTransport::new().await?;
///     let device = discover(&transport).await;
///     let lilo = Lilo::new(transport, device);
///
///     loop {
///         tokio::time::sleep(std::time::Duration::from_secs(1)).await;
///         println!("{}", lilo.gather().await);
///     }
/// }
/// ```
pub struct Lilo<T> {
    /// Connection to the device.
    connection: ConnectionManager<T>,
    /// Latest complete reading.
    reading: RwLock<SensorReading>,
    /// Start of the last read attempt.
    last_read: Mutex<Option<Instant>>,
    /// Minimum time between read attempts.
    min_read_interval: Duration,
    /// Bound on each characteristic read.
    read_timeout: Duration,
    /// Name used in log lines.
    name: String,
}

impl<T: BleTransport + 'static> Lilo<T> {
    /// Create a client with default settings.
    pub fn new(transport: T, device: Option<DeviceHandle>) -> Self {
        Self::with_config(transport, device, LiloConfig::default())
    }

    /// Create a client.
    pub fn with_config(transport: T, device: Option<DeviceHandle>, config: LiloConfig) -> Self {
        Self {
            connection: ConnectionManager::with_config(transport, device, &config),
            reading: RwLock::new(SensorReading::new()),
            last_read: Mutex::new(None),
            min_read_interval: config.min_read_interval,
            read_timeout: config.read_timeout,
            name: config.client_name,
        }
    }

    /// Get the connection manager.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Latest complete reading, without touching the radio.
    pub fn reading(&self) -> SensorReading {
        *self.reading.read()
    }

    /// Bind a (fresher) device handle. See [`ConnectionManager::set_ble_device`].
    pub fn set_ble_device(&self, device: DeviceHandle) {
        self.connection.set_ble_device(device);
    }

    /// Drop the connection and the device handle.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Make sure the connection is up. Never fails; see [`ConnectionManager::connect`].
    pub async fn connect(&self) {
        self.connection.connect().await;
    }

    /// Read the device and return the latest reading.
    ///
    /// Returns the previous reading unchanged when no device is bound, when
    /// called within the minimum read interval of the last attempt, or when
    /// anything about the read fails.
    pub async fn gather(&self) -> SensorReading {
        match self.try_gather().await {
            Ok(reading) => reading,
            Err(e) if e.is_benign() => {
                trace!("{}: Skipping read: {}", self.name, e);
                self.reading()
            }
            Err(e) => {
                debug!("{}: Not connected to device: {}", self.name, e);
                self.reading()
            }
        }
    }

    /// Read the device, returning why the reading was not updated.
    pub async fn try_gather(&self) -> Result<SensorReading> {
        if self.connection.device().is_none() {
            return Err(Error::NoDeviceBound);
        }

        self.claim_read_slot()?;

        self.connection.try_connect().await?;

        let uuids: Vec<Uuid> = MEASUREMENT_CHARACTERISTICS
            .iter()
            .map(|(uuid, _)| *uuid)
            .collect();
        let values = self
            .connection
            .read_characteristics(&uuids, self.read_timeout)
            .await?;

        let (mut time, mut light) = (None, None);
        for ((uuid, measurement), value) in MEASUREMENT_CHARACTERISTICS.iter().zip(&values) {
            let byte = first_byte(uuid, value)?;
            match measurement {
                Measurement::Time => time = Some(byte),
                Measurement::Light => light = Some(byte),
            }
        }
        let (Some(time), Some(light)) = (time, light) else {
            return Err(Error::InvalidData {
                context: format!("expected {} values, got {}", uuids.len(), values.len()),
            });
        };

        let reading = SensorReading::from_cycle(time, light, Utc::now());

        *self.reading.write() = reading;
        debug!("{}: {}", self.name, reading);

        Ok(reading)
    }

    /// Start a read attempt unless the last one was too recent.
    ///
    /// The slot is spent even if the attempt then fails.
    fn claim_read_slot(&self) -> Result<()> {
        let now = Instant::now();
        let mut last_read = self.last_read.lock();

        if let Some(previous) = *last_read {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.min_read_interval {
                return Err(Error::Throttled {
                    remaining: self.min_read_interval - elapsed,
                });
            }
        }

        *last_read = Some(now);
        Ok(())
    }
}

fn first_byte(uuid: &Uuid, value: &Bytes) -> Result<u8> {
    value.first().copied().ok_or_else(|| Error::InvalidData {
        context: format!("empty payload from characteristic {}", uuid),
    })
}
