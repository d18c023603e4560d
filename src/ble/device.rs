//! Device handle for a discovered peripheral.

/// Descriptor of a discovered LILO.
///
/// Handles are cheap to clone. A fresher handle for the same peripheral
/// (for example one carrying a newer RSSI) can be handed to
/// [`ConnectionManager::set_ble_device`](crate::ConnectionManager::set_ble_device)
/// at any time without disturbing an open session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceHandle {
    /// Platform identifier of the peripheral (MAC address on Linux/Windows, UUID on macOS).
    pub identifier: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm at the time the handle was produced.
    pub rssi: Option<i16>,
}

impl DeviceHandle {
    /// Create a new handle.
    pub fn new(identifier: impl Into<String>, name: Option<String>, rssi: Option<i16>) -> Self {
        Self {
            identifier: identifier.into(),
            name,
            rssi,
        }
    }

    /// Name suitable for log lines.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.identifier)
    }

    /// Return a copy with an updated signal strength.
    pub fn with_rssi(mut self, rssi: Option<i16>) -> Self {
        self.rssi = rssi;
        self
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.rssi {
            Some(rssi) => write!(f, "{} ({}, {} dBm)", self.display_name(), self.identifier, rssi),
            None => write!(f, "{} ({})", self.display_name(), self.identifier),
        }
    }
}
