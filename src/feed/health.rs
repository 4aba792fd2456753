//! Server health probe

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::common::errors::Result;
use crate::common::traits::HealthProbe;
use crate::common::types::{HealthStatus, UnhealthyReason};

/// Issues `GET {server_url}/` with a bounded timeout
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: Client,
    base_url: String,
}

impl HealthProber {
    /// Create a prober with the default 5 second timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(5))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn classify(err: &reqwest::Error) -> UnhealthyReason {
        if err.is_timeout() {
            UnhealthyReason::Timeout
        } else if err.is_connect() {
            UnhealthyReason::ConnectionRefused
        } else {
            UnhealthyReason::Other(err.to_string())
        }
    }
}

#[async_trait]
impl HealthProbe for HealthProber {
    #[instrument(skip(self))]
    async fn probe(&self) -> HealthStatus {
        let url = format!("{}/", self.base_url);
        debug!("Checking server status at {}", url);

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Server status check: server is online and responding");
                HealthStatus::Healthy
            }
            Ok(response) => {
                let status = response.status().as_u16();
                warn!("Server returned unexpected status code: {}", status);
                HealthStatus::Unhealthy(UnhealthyReason::UnexpectedStatus(status))
            }
            Err(e) => {
                let reason = Self::classify(&e);
                match reason {
                    UnhealthyReason::ConnectionRefused => {
                        error!("Server connection failed: server is offline or unreachable")
                    }
                    UnhealthyReason::Timeout => {
                        error!("Server request timed out: server is not responding")
                    }
                    _ => error!("Unexpected error during server check: {}", e),
                }
                HealthStatus::Unhealthy(reason)
            }
        }
    }
}
