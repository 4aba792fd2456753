//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::common::errors::{ClientError, Result};
use crate::common::types::Credentials;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Signal server endpoint and credentials
    #[serde(default)]
    pub feed: FeedConfig,
    /// Retry ceilings, backoff and timing
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    /// Reject configurations the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.feed.client_id.trim().is_empty() {
            return Err(ClientError::Configuration("client_id is required".to_string()));
        }
        if self.feed.password.is_empty() {
            return Err(ClientError::Configuration("password is required".to_string()));
        }
        self.feed.stream_url()?;
        self.resilience.validate()
    }
}

/// Signal server configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// HTTP base URL of the signal server
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Client identifier used for authentication
    #[serde(default)]
    pub client_id: String,
    /// Client password used for authentication
    #[serde(default)]
    pub password: String,
    /// Full streaming URL; derived from `server_url` when absent
    #[serde(default)]
    pub stream_url: Option<String>,
    /// Path appended to the derived streaming URL
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
}

impl FeedConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.client_id.clone(), self.password.clone())
    }

    /// Streaming endpoint: the explicit override, or `server_url` with the
    /// scheme swapped to its websocket equivalent and `stream_path` appended
    pub fn stream_url(&self) -> Result<String> {
        if let Some(url) = &self.stream_url {
            return Ok(url.clone());
        }

        let mut url = Url::parse(&self.server_url).map_err(|e| {
            ClientError::Configuration(format!("Invalid server_url {}: {}", self.server_url, e))
        })?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::Configuration(format!(
                    "Unsupported server_url scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Configuration(format!("Cannot use scheme {}", scheme)))?;

        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            self.stream_path.trim_start_matches('/')
        );
        url.set_path(&path);

        Ok(url.to_string())
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            client_id: String::new(),
            password: String::new(),
            stream_url: None,
            stream_path: default_stream_path(),
        }
    }
}

impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("server_url", &self.server_url)
            .field("client_id", &self.client_id)
            .field("password", &"***")
            .field("stream_url", &self.stream_url)
            .field("stream_path", &self.stream_path)
            .finish()
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_stream_path() -> String {
    "/ws".to_string()
}

/// Retry ceilings, backoff and timing for the resilience controller
///
/// All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Failed authentication attempts before giving up
    #[serde(default = "default_auth_max_attempts")]
    pub auth_max_attempts: u32,
    /// Consecutive connect failures tolerated before forcing re-authentication
    #[serde(default = "default_connect_max_retries")]
    pub connect_max_retries: u32,
    /// Consecutive failed health checks tolerated before stopping
    #[serde(default = "default_health_check_max_retries")]
    pub health_check_max_retries: u32,
    /// Backoff base delay
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Interval between liveness probes while streaming
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Time allowed for a pong
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    /// Quiet period after open before the first liveness probe
    #[serde(default = "default_stabilization_ms")]
    pub stabilization_ms: u64,
    /// Consecutive failed probes that mark the connection dead
    #[serde(default = "default_heartbeat_max_failures")]
    pub heartbeat_max_failures: u32,
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Wait for an optional handshake reply after sending the token
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Per-iteration receive timeout of the streaming loop
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// How often sleeps re-check the running flag
    #[serde(default = "default_shutdown_poll_ms")]
    pub shutdown_poll_ms: u64,
}

impl ResilienceConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn stabilization(&self) -> Duration {
        Duration::from_millis(self.stabilization_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn shutdown_poll(&self) -> Duration {
        Duration::from_millis(self.shutdown_poll_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let ceilings = [
            ("auth_max_attempts", self.auth_max_attempts),
            ("connect_max_retries", self.connect_max_retries),
            ("health_check_max_retries", self.health_check_max_retries),
            ("heartbeat_max_failures", self.heartbeat_max_failures),
        ];
        for (name, value) in ceilings {
            if value == 0 {
                return Err(ClientError::Configuration(format!("{} must be > 0", name)));
            }
        }

        let intervals = [
            ("ping_interval_ms", self.ping_interval_ms),
            ("receive_timeout_ms", self.receive_timeout_ms),
            ("shutdown_poll_ms", self.shutdown_poll_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ClientError::Configuration(format!("{} must be > 0", name)));
            }
        }

        if self.base_delay_ms > self.max_delay_ms {
            return Err(ClientError::Configuration(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }

        Ok(())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            auth_max_attempts: default_auth_max_attempts(),
            connect_max_retries: default_connect_max_retries(),
            health_check_max_retries: default_health_check_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            stabilization_ms: default_stabilization_ms(),
            heartbeat_max_failures: default_heartbeat_max_failures(),
            health_timeout_ms: default_health_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            receive_timeout_ms: default_receive_timeout_ms(),
            shutdown_poll_ms: default_shutdown_poll_ms(),
        }
    }
}

fn default_auth_max_attempts() -> u32 {
    3
}

fn default_connect_max_retries() -> u32 {
    10
}

fn default_health_check_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_ping_interval_ms() -> u64 {
    20_000
}

fn default_ping_timeout_ms() -> u64 {
    10_000
}

fn default_stabilization_ms() -> u64 {
    5_000
}

fn default_heartbeat_max_failures() -> u32 {
    3
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_close_timeout_ms() -> u64 {
    10_000
}

fn default_receive_timeout_ms() -> u64 {
    1_000
}

fn default_shutdown_poll_ms() -> u64 {
    1_000
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Hand records to a worker through a bounded queue of this size
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            queue_capacity: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
