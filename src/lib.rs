//! signal_feed Library
//!
//! A resilient streaming client for a trading-signal server: health-checked
//! authentication, a token-authenticated websocket with heartbeat, and a
//! controller that retries every failure under bounded ceilings.

pub mod common;
pub mod config;
pub mod feed;
pub mod trading;

// Re-export commonly used types
pub use common::errors::{AuthError, ClientError, ConnectError, Result};
pub use common::running::RunningFlag;
pub use common::traits::{FeedTransport, HealthProbe, SignalConsumer, TokenProvider};
pub use common::types::{
    CloseClass, CloseEvent, Credentials, Direction, HealthStatus, SessionToken, SignalRecord,
};
pub use config::types::AppConfig;
pub use feed::{ControllerState, FeedController, LoggingConsumer, ResilienceController, StopReason};

// Trading types
pub use trading::{FixedSizingEngine, OrderRequest, SignalTrader, SizingEngine, TradeExecutor};
