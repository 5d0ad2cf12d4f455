//! Transport configuration.

use std::time::Duration;

/// Configuration for a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Server host name or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Timeout for each connect attempt.
    pub connect_timeout: Duration,
    /// Socket read timeout. A stuck read blocks at most this long.
    pub read_timeout: Duration,
    /// Number of extra connect attempts after the first one fails.
    pub connect_retries: u32,
    /// Sleep between zero-progress reads inside `receive`.
    pub poll_interval: Duration,
}

impl TransportConfig {
    /// Creates a configuration for the given server.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            connect_retries: 3,
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the number of connect retries.
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Sets the poll interval used between zero-progress reads.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Total number of connect attempts (first try plus retries).
    pub fn connect_attempts(&self) -> u32 {
        self.connect_retries.saturating_add(1)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 80)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.connect_retries, 3);
        assert_eq!(config.connect_attempts(), 4);
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn config_builder() {
        let config = TransportConfig::new("dict.example.com", 7777)
            .with_connect_retries(0)
            .with_read_timeout(Duration::from_millis(500))
            .with_poll_interval(Duration::from_millis(1));

        assert_eq!(config.host, "dict.example.com");
        assert_eq!(config.port, 7777);
        assert_eq!(config.connect_attempts(), 1);
        assert_eq!(config.read_timeout, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }
}
