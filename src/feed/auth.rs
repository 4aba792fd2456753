//! Token acquisition against `POST {server_url}/auth`

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::backoff::RetryState;
use super::messages::{AuthRequest, AuthResponse};
use crate::common::errors::{AuthError, Result};
use crate::common::status::{report_status, StatusLevel};
use crate::common::traits::{HealthProbe, TokenProvider};
use crate::common::types::{Credentials, SessionToken};

/// Exchanges client credentials for a session token
///
/// Every call probes server health first; an unhealthy server fails fast with
/// [`AuthError::ServerUnavailable`] and does not consume an attempt.
pub struct Authenticator<P> {
    client: Client,
    base_url: String,
    credentials: Credentials,
    prober: P,
    retry: RetryState,
}

impl<P: HealthProbe> Authenticator<P> {
    /// Create an authenticator with the default 10 second request timeout
    /// and a ceiling of 3 attempts
    pub fn new(base_url: &str, credentials: Credentials, prober: P) -> Result<Self> {
        Self::with_settings(base_url, credentials, prober, Duration::from_secs(10), 3)
    }

    pub fn with_settings(
        base_url: &str,
        credentials: Credentials,
        prober: P,
        timeout: Duration,
        max_attempts: u32,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            prober,
            // delays are computed by the controller; only the count matters here
            retry: RetryState::new(max_attempts, Duration::ZERO, Duration::ZERO),
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.ceiling()
    }

    /// Count a transient failure, escalating to fatal once the ceiling is hit
    fn fail(&mut self, err: AuthError) -> AuthError {
        let attempts = self.retry.record_failure();
        warn!(
            "Authentication attempt {}/{} failed: {}",
            attempts,
            self.retry.ceiling(),
            err
        );
        if self.retry.is_exhausted() {
            AuthError::AttemptsExhausted { attempts }
        } else {
            err
        }
    }

    async fn request_token(&self) -> std::result::Result<SessionToken, AuthError> {
        let url = format!("{}/auth", self.base_url);
        let body = AuthRequest {
            client_id: &self.credentials.client_id,
            password: &self.credentials.password,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Transient(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let parsed: AuthResponse = response
                    .json()
                    .await
                    .map_err(|e| AuthError::Transient(format!("Invalid auth response: {}", e)))?;
                Ok(SessionToken::new(parsed.access_token))
            }
            StatusCode::UNAUTHORIZED => Err(AuthError::InvalidCredentials),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(AuthError::Transient(format!(
                    "Server returned status {}: {}",
                    status, text
                )))
            }
        }
    }
}

#[async_trait]
impl<P: HealthProbe> TokenProvider for Authenticator<P> {
    #[instrument(skip(self))]
    async fn authenticate(&mut self) -> std::result::Result<SessionToken, AuthError> {
        if self.retry.is_exhausted() {
            let msg = "Maximum authentication attempts reached";
            error!("{}", msg);
            report_status("Authentication", msg, StatusLevel::Error);
            return Err(AuthError::AttemptsExhausted {
                attempts: self.retry.attempts(),
            });
        }

        report_status(
            "Authentication",
            "Attempting to authenticate with server",
            StatusLevel::Info,
        );

        let health = self.prober.probe().await;
        if !health.is_healthy() {
            error!("Authentication skipped: {}", health);
            report_status("Authentication", &format!("Failed: {}", health), StatusLevel::Error);
            return Err(AuthError::ServerUnavailable(health));
        }

        match self.request_token().await {
            Ok(token) => {
                self.retry.reset();
                info!("Authentication successful");
                report_status(
                    "Authentication",
                    "Successfully authenticated with server",
                    StatusLevel::Success,
                );
                Ok(token)
            }
            Err(AuthError::InvalidCredentials) => {
                let msg = "Authentication failed: invalid credentials";
                error!("{}", msg);
                report_status("Authentication", msg, StatusLevel::Error);
                Err(AuthError::InvalidCredentials)
            }
            Err(err) => {
                debug!("Authentication request failed: {}", err);
                report_status("Authentication", &format!("Failed: {}", err), StatusLevel::Error);
                Err(self.fail(err))
            }
        }
    }

    fn attempts(&self) -> u32 {
        self.retry.attempts()
    }
}
