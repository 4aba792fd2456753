//! Error types for the application

use thiserror::Error;

use super::types::HealthStatus;

/// Result type alias using our ClientError
pub type Result<T> = std::result::Result<T, ClientError>;

/// Main error type for client operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP client construction or request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Outcome of a failed `authenticate()` call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Health probe failed before any credentials were sent.
    /// Does not consume an authentication attempt.
    #[error("server unavailable: {0}")]
    ServerUnavailable(HealthStatus),

    /// The server refused the credentials (HTTP 401)
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Any other failure; the caller backs off and retries
    #[error("transient authentication failure: {0}")]
    Transient(String),

    /// The attempt ceiling has been reached
    #[error("authentication attempts exhausted after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },
}

impl AuthError {
    /// Fatal errors stop the client; retrying cannot succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::AttemptsExhausted { .. }
        )
    }
}

/// Outcome of a failed `open()` on the streaming connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The server rejected the session token during the handshake
    #[error("token rejected: {0}")]
    TokenRejected(String),

    /// Network or protocol failure; retry under the connect ceiling
    #[error("transient connection failure: {0}")]
    Transient(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ConnectError::Transient(err.to_string())
    }
}
