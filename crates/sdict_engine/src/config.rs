//! Configuration for the dictionary engine.

use sdict_io::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Delay between download attempts used by default.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(233);

/// Retries after the first kanban download attempt.
pub const KANBAN_RETRIES: u32 = 3;

/// Configuration for a [`SimpleDict`](crate::SimpleDict).
#[derive(Clone)]
pub struct DictConfig {
    /// Password for queries. Derives the read key.
    pub password: String,
    /// Password for mutations. Without it `set` and `del` always fail.
    pub set_password: Option<String>,
    /// Directory for the snapshot cache. `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Retry policy for dictionary downloads.
    pub fetch_retry: RetryConfig,
}

impl DictConfig {
    /// Creates a read-only configuration without cache.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            set_password: None,
            cache_dir: None,
            fetch_retry: RetryConfig::default(),
        }
    }

    /// Sets the mutation password.
    pub fn with_set_password(mut self, password: impl Into<String>) -> Self {
        self.set_password = Some(password.into());
        self
    }

    /// Sets the snapshot cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Sets the download retry policy.
    pub fn with_fetch_retry(mut self, retry: RetryConfig) -> Self {
        self.fetch_retry = retry;
        self
    }
}

impl Default for DictConfig {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for DictConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictConfig")
            .field("password", &"[REDACTED]")
            .field("set_password", &self.set_password.as_ref().map(|_| "[REDACTED]"))
            .field("cache_dir", &self.cache_dir)
            .field("fetch_retry", &self.fetch_retry)
            .finish()
    }
}

/// Configuration for a [`SimpleKanban`](crate::SimpleKanban).
#[derive(Clone)]
pub struct KanbanConfig {
    /// Password prefixed to every command, sent in clear text.
    pub password: String,
    /// Retry policy for bulk downloads.
    pub retry: RetryConfig,
}

impl KanbanConfig {
    /// Creates a configuration with the default retry policy: one attempt
    /// plus [`KANBAN_RETRIES`] retries.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            retry: RetryConfig::constant(1 + KANBAN_RETRIES, DEFAULT_RETRY_DELAY),
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for KanbanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KanbanConfig")
            .field("password", &"[REDACTED]")
            .field("retry", &self.retry)
            .finish()
    }
}

/// Retry policy with a fixed delay between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before every attempt after the first.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a policy making up to `max_attempts` attempts.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Creates a policy with no retries.
    pub fn no_retry() -> Self {
        Self::constant(1, Duration::ZERO)
    }

    /// Number of attempts to make. Always at least one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::constant(3, DEFAULT_RETRY_DELAY)
    }
}

/// File-level client configuration, as loaded from JSON.
///
/// All fields are optional in the file; missing ones take their defaults.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Dictionary server host.
    pub host: String,
    /// Dictionary server port.
    pub port: u16,
    /// Query password.
    pub password: String,
    /// Mutation password.
    pub set_password: Option<String>,
    /// Snapshot cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Kanban server host. Defaults to `host`.
    pub kanban_host: Option<String>,
    /// Kanban server port. Defaults to `port`.
    pub kanban_port: Option<u16>,
    /// Kanban password. Defaults to `password`.
    pub kanban_password: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Extra connect attempts after the first.
    pub connect_retries: u32,
}

impl ClientConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed input or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn transport_for(&self, host: &str, port: u16) -> TransportConfig {
        TransportConfig::new(host, port)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs.max(1)))
            .with_read_timeout(Duration::from_secs(self.read_timeout_secs.max(1)))
            .with_connect_retries(self.connect_retries)
    }

    /// Transport settings for the dictionary server.
    pub fn dict_transport(&self) -> TransportConfig {
        self.transport_for(&self.host, self.port)
    }

    /// Transport settings for the kanban server.
    pub fn kanban_transport(&self) -> TransportConfig {
        let host = self.kanban_host.as_deref().unwrap_or(&self.host);
        self.transport_for(host, self.kanban_port.unwrap_or(self.port))
    }

    /// Dictionary engine settings.
    pub fn dict_config(&self) -> DictConfig {
        let mut config = DictConfig::new(self.password.clone());
        config.set_password = self.set_password.clone();
        config.cache_dir = self.cache_dir.clone();
        config
    }

    /// Kanban session settings.
    pub fn kanban_config(&self) -> KanbanConfig {
        KanbanConfig::new(
            self.kanban_password
                .clone()
                .unwrap_or_else(|| self.password.clone()),
        )
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 80,
            password: String::new(),
            set_password: None,
            cache_dir: None,
            kanban_host: None,
            kanban_port: None,
            kanban_password: None,
            connect_timeout_secs: 10,
            read_timeout_secs: 10,
            connect_retries: 3,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .field("set_password", &self.set_password.as_ref().map(|_| "[REDACTED]"))
            .field("cache_dir", &self.cache_dir)
            .field("kanban_host", &self.kanban_host)
            .field("kanban_port", &self.kanban_port)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("connect_retries", &self.connect_retries)
            .finish()
    }
}
