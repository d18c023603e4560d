//! Tunables for discovery, connection, and polling.

use std::time::Duration;

use crate::ble::uuids::LILO_DEVICE_NAME;

/// Configuration shared by discovery, the connection manager and the reading coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiloConfig {
    /// Advertised name to match during discovery.
    pub device_name: String,
    /// Name the client reports in diagnostics.
    pub client_name: String,
    /// How long a discovery scan runs.
    pub scan_timeout: Duration,
    /// Minimum time between physical read attempts.
    pub min_read_interval: Duration,
    /// Upper bound on a single characteristic read.
    pub read_timeout: Duration,
    /// Connection attempts per `establish` call.
    pub connect_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub retry_backoff: Duration,
}

impl Default for LiloConfig {
    fn default() -> Self {
        Self {
            device_name: LILO_DEVICE_NAME.to_string(),
            client_name: LILO_DEVICE_NAME.to_string(),
            scan_timeout: Duration::from_secs(5),
            min_read_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(10),
            connect_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl LiloConfig {
    /// Set the advertised name to look for.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set the diagnostic client name.
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Set the discovery scan window.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the minimum interval between reads.
    pub fn with_min_read_interval(mut self, interval: Duration) -> Self {
        self.min_read_interval = interval;
        self
    }

    /// Set the per-read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the reconnection parameters.
    ///
    /// `max_attempts` is clamped to at least one.
    pub fn with_reconnect_params(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.connect_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    /// Backoff to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.retry_backoff.saturating_mul(1 << shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = LiloConfig::default();
        assert_eq!(config.device_name, "LILO");
        assert_eq!(config.min_read_interval, Duration::from_secs(1));
        assert_eq!(config.connect_attempts, 3);
    }

    #[test]
    fn test_builders() {
        let config = LiloConfig::default()
            .with_device_name("LILO-2")
            .with_client_name("kitchen")
            .with_scan_timeout(Duration::from_secs(2))
            .with_min_read_interval(Duration::from_millis(500))
            .with_read_timeout(Duration::from_secs(3))
            .with_reconnect_params(0, Duration::from_millis(100));

        assert_eq!(config.device_name, "LILO-2");
        assert_eq!(config.client_name, "kitchen");
        assert_eq!(config.scan_timeout, Duration::from_secs(2));
        assert_eq!(config.min_read_interval, Duration::from_millis(500));
        assert_eq!(config.read_timeout, Duration::from_secs(3));
        assert_eq!(config.connect_attempts, 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = LiloConfig::default().with_reconnect_params(4, Duration::from_millis(250));
        assert_eq!(config.backoff_for(1), Duration::from_millis(250));
        assert_eq!(config.backoff_for(2), Duration::from_millis(500));
        assert_eq!(config.backoff_for(3), Duration::from_millis(1000));
    }
}
