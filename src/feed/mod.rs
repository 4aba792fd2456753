//! Signal feed client
//!
//! - `health` / `auth` talk HTTP to the signal server
//! - `transport` / `connection` own the streaming socket and heartbeat
//! - `dispatcher` decodes frames for the consumer
//! - `controller` ties them together under retry ceilings and backoff

pub mod auth;
pub mod backoff;
pub mod connection;
pub mod controller;
pub mod dispatcher;
pub mod health;
pub mod messages;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::Authenticator;
pub use connection::{ConnectionManager, ConnectionSettings};
pub use controller::{ControllerState, FeedController, ResilienceController, ResumeState, StopReason};
pub use dispatcher::{DispatchOutcome, DispatchStats, LoggingConsumer, MessageDispatcher};
pub use health::HealthProber;
pub use transport::WsTransport;
