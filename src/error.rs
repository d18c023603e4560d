//! Error types for the lilo-rust-ble crate.
//!
//! The public polling surface ([`Lilo::gather`](crate::Lilo::gather) and
//! [`ConnectionManager::connect`](crate::ConnectionManager::connect)) never
//! returns these; they surface through the `try_*` variants and the logs.

use std::time::Duration;

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No device handle is bound to the connection manager.
    #[error("No device bound")]
    NoDeviceBound,

    /// The peripheral behind a device handle is unknown to the transport.
    #[error("Device not found: {identifier}")]
    DeviceNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Operation requires a connection but the device is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Reading a characteristic failed at the transport level.
    #[error("Read of characteristic {uuid} failed: {reason}")]
    ReadFailed {
        /// The characteristic that was being read.
        uuid: String,
        /// Description of the failure.
        reason: String,
    },

    /// Invalid data was received from the device.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// A characteristic read did not complete in time.
    #[error("Read timeout")]
    Timeout,

    /// A gather was requested inside the minimum read interval.
    #[error("Read throttled for another {remaining:?}")]
    Throttled {
        /// Time left until the next read is allowed.
        remaining: Duration,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },
}

impl Error {
    /// Whether this error means there was simply nothing to do.
    ///
    /// Used to pick the log level at the polling boundary.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NoDeviceBound | Self::Throttled { .. })
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
