//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy plumbing for discovering
//! a LILO and keeping a GATT connection to it.

pub mod connection;
pub mod device;
pub mod platform;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use device::DeviceHandle;
pub use platform::{BtleSession, BtleplugTransport};
pub use scanner::{discover, discover_with_config};
pub use transport::{
    BleTransport, CachedServices, DisconnectCallback, GattSession, SignalAccessor,
};
pub use uuids::*;
