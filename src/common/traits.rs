//! Trait definitions for the feed components
//!
//! The resilience controller is generic over these seams so the state
//! machine can be driven against scripted collaborators in tests.

use async_trait::async_trait;
use std::time::Duration;

use super::errors::{AuthError, ConnectError};
use super::types::{HealthStatus, SessionToken, SignalRecord, TransportEvent};

/// Downstream consumer of decoded signals
///
/// Called inline on the receive path, once per record, in arrival order.
/// A slow consumer delays subsequent frames; wrap it in a
/// [`QueuedConsumer`](crate::common::channels::QueuedConsumer) to decouple.
pub trait SignalConsumer: Send {
    /// Handle one record. An error is logged as a per-message failure.
    fn handle(&mut self, record: &SignalRecord) -> anyhow::Result<()>;
}

impl<F> SignalConsumer for F
where
    F: FnMut(&SignalRecord) -> anyhow::Result<()> + Send,
{
    fn handle(&mut self, record: &SignalRecord) -> anyhow::Result<()> {
        self(record)
    }
}

/// Bounded-timeout liveness check against the remote endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Never fails; every error is folded into `HealthStatus::Unhealthy`.
    async fn probe(&self) -> HealthStatus;
}

/// Source of session tokens
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send {
    /// Exchange credentials for a fresh token.
    async fn authenticate(&mut self) -> Result<SessionToken, AuthError>;

    /// Failed attempts since the last success.
    fn attempts(&self) -> u32;
}

/// A persistent, message-oriented streaming transport
///
/// Implementations own at most one live socket at a time.
#[async_trait]
pub trait FeedTransport: Send {
    /// Establish the socket.
    async fn connect(&mut self) -> Result<(), ConnectError>;

    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), ConnectError>;

    /// Wait up to `timeout` for the next application-relevant event.
    async fn next_event(&mut self, timeout: Duration) -> TransportEvent;

    /// Send a ping; `false` if it could not be written.
    async fn send_ping(&mut self) -> bool;

    /// Close the socket, waiting at most `timeout` for the peer.
    async fn close(&mut self, code: u16, reason: &str, timeout: Duration);

    fn is_open(&self) -> bool;
}
