//! BLE scanning functionality.
//!
//! Finds a LILO by its advertised name.

use tracing::{debug, info, warn};

use crate::ble::device::DeviceHandle;
use crate::ble::transport::BleTransport;
use crate::config::LiloConfig;

/// Scan for a LILO using the default name and scan window.
///
/// Returns the first advertiser named `LILO`, or `None` if nothing matched
/// within the window or the scan itself failed.
pub async fn discover<T: BleTransport + ?Sized>(transport: &T) -> Option<DeviceHandle> {
    discover_with_config(transport, &LiloConfig::default()).await
}

/// Scan for a device named `config.device_name` for `config.scan_timeout`.
pub async fn discover_with_config<T: BleTransport + ?Sized>(
    transport: &T,
    config: &LiloConfig,
) -> Option<DeviceHandle> {
    info!(
        "Scanning {:?} for a device named {:?}",
        config.scan_timeout, config.device_name
    );

    let devices = match transport
        .scan(&config.device_name, config.scan_timeout)
        .await
    {
        Ok(devices) => devices,
        Err(e) => {
            warn!("Scan failed: {}", e);
            return None;
        }
    };

    let found = devices
        .into_iter()
        .find(|device| device.name.as_deref() == Some(config.device_name.as_str()));

    match &found {
        Some(device) => info!("Found {}", device),
        None => debug!("No device named {:?} found", config.device_name),
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{lilo_handle, FakeTransport};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_discover_returns_first_match() {
        let other = DeviceHandle::new("11:22:33:44:55:66", Some("LILO".to_string()), Some(-90));
        let transport = FakeTransport::new().with_scan_result(vec![
            DeviceHandle::new("00:00:00:00:00:01", Some("Speaker".to_string()), None),
            lilo_handle(),
            other,
        ]);

        assert_eq!(discover(&transport).await, Some(lilo_handle()));
    }

    #[tokio::test]
    async fn test_discover_requires_exact_name() {
        let transport = FakeTransport::new().with_scan_result(vec![
            DeviceHandle::new("00:00:00:00:00:01", Some("LILO 2".to_string()), None),
            DeviceHandle::new("00:00:00:00:00:02", Some("lilo".to_string()), None),
            DeviceHandle::new("00:00:00:00:00:03", None, None),
        ]);

        assert_eq!(discover(&transport).await, None);
    }

    #[tokio::test]
    async fn test_scan_error_is_not_found() {
        let transport = FakeTransport::new().with_scan_error("adapter powered off");

        assert_eq!(discover(&transport).await, None);
        assert_eq!(transport.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_discover_with_custom_name() {
        let garage = DeviceHandle::new("00:00:00:00:00:09", Some("LILO-garage".to_string()), None);
        let transport = FakeTransport::new().with_scan_result(vec![lilo_handle(), garage.clone()]);
        let config = LiloConfig::default().with_device_name("LILO-garage");

        assert_eq!(discover_with_config(&transport, &config).await, Some(garage));
    }
}
