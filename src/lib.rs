// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # lilo-rust-ble
//!
//! A Rust library for reading a LILO indoor garden over Bluetooth Low Energy.
//!
//! The LILO exposes two read-only GATT characteristics, a time value and the
//! current lighting program. This crate finds the device, keeps a connection
//! to it alive across radio dropouts, and turns periodic reads into a
//! [`SensorReading`].
//!
//! ## Features
//!
//! - **Discovery**: Find the device by its advertised name
//! - **Resilient Connection**: Reconnects on demand, serializes concurrent
//!   attempts and notices link loss
//! - **Throttled Polling**: At most one physical read per second, however
//!   often [`Lilo::gather`] is called
//! - **Graceful Degradation**: Failures keep the previous reading instead of
//!   returning errors to the poll loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lilo_rust_ble::{discover, BtleplugTransport, Lilo, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = BtleplugTransport::new().await?;
//!     let device = discover(&transport).await;
//!     let lilo = Lilo::new(transport, device);
//!
//!     let reading = lilo.gather().await;
//!     if let Some(mode) = reading.light_mode() {
//!         println!("Light: {}", mode);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod lilo;
pub mod reading;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use ble::connection::{ConnectionManager, ConnectionState};
pub use ble::device::DeviceHandle;
pub use ble::platform::BtleplugTransport;
pub use ble::scanner::{discover, discover_with_config};
pub use ble::transport::{BleTransport, GattSession};
pub use config::LiloConfig;
pub use error::{Error, Result};
pub use lilo::Lilo;
pub use reading::{LightMode, Measurement, SensorReading};
pub use utils::{byte_to_hex_code, hex_code_to_byte};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<Lilo<BtleplugTransport>>();
        let _ = std::any::TypeId::of::<ConnectionManager<BtleplugTransport>>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<SensorReading>();
        let _ = std::any::TypeId::of::<DeviceHandle>();
        let _ = std::any::TypeId::of::<LiloConfig>();
    }

    #[test]
    fn test_light_decode() {
        assert_eq!(LightMode::from_hex_code("01"), Some(LightMode::PhotoMode));
        assert_eq!(byte_to_hex_code(LightMode::Summer.as_byte()), "03");
    }
}
