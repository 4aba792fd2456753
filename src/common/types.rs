//! Unified types shared by the feed components

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normal closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away; also used for controller-initiated teardown
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Abnormal closure, never sent on the wire
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Policy violation
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Service restart
pub const CLOSE_SERVICE_RESTART: u16 = 1012;
/// Try again later
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
/// Application-level server error
pub const CLOSE_SERVER_ERROR: u16 = 4000;
/// Application-level authentication failure
pub const CLOSE_AUTH_FAILED: u16 = 4001;
/// Application-level token expiry
pub const CLOSE_TOKEN_EXPIRED: u16 = 4003;

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(alias = "bull", alias = "BULL")]
    Bull,
    #[serde(alias = "bear", alias = "BEAR")]
    Bear,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Bull => write!(f, "Bull"),
            Direction::Bear => write!(f, "Bear"),
        }
    }
}

/// A decoded trading signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Server-side timestamp, passed through verbatim
    pub time: String,
    /// Instrument identifier
    pub ticker: String,
    /// Signal price
    pub price: Decimal,
    /// Signal level (`L0` .. `L4`)
    pub level: String,
    /// Bull or bear
    pub direction: Direction,
    /// Depth strength indicator
    pub depth: u32,
    /// Code strength indicator
    #[serde(rename = "codeNum")]
    pub code_num: u32,
}

impl SignalRecord {
    /// Numeric part of the level, e.g. `2` for `"L2"`
    pub fn level_index(&self) -> Option<u8> {
        self.level
            .strip_prefix('L')
            .or_else(|| self.level.strip_prefix('l'))
            .and_then(|n| n.parse().ok())
    }
}

/// Opaque bearer token granting streaming access
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Client credentials exchanged for a session token
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("password", &"***")
            .finish()
    }
}

/// Why a health probe failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnhealthyReason {
    /// Server offline or unreachable
    ConnectionRefused,
    /// No response within the probe timeout
    Timeout,
    /// Server answered with a non-success status
    UnexpectedStatus(u16),
    /// Anything else
    Other(String),
}

impl std::fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnhealthyReason::ConnectionRefused => write!(f, "server is offline or unreachable"),
            UnhealthyReason::Timeout => write!(f, "server is not responding (timeout)"),
            UnhealthyReason::UnexpectedStatus(code) => {
                write!(f, "server returned status code {}", code)
            }
            UnhealthyReason::Other(msg) => write!(f, "error checking server status: {}", msg),
        }
    }
}

/// Result of a server health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(UnhealthyReason),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "server is online"),
            HealthStatus::Unhealthy(reason) => write!(f, "{}", reason),
        }
    }
}

/// How a close code is handled by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseClass {
    /// 1000
    Normal,
    /// 1001
    GoingAway,
    /// No close frame, or 1006
    Abnormal,
    /// Token invalid or expired; re-authenticate
    Auth,
    /// Service restart or maintenance; reconnect with the same token
    Restart,
    /// Treated the same as `Restart`
    Unrecognized,
}

impl CloseClass {
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            None | Some(CLOSE_ABNORMAL) => CloseClass::Abnormal,
            Some(CLOSE_NORMAL) => CloseClass::Normal,
            Some(CLOSE_GOING_AWAY) => CloseClass::GoingAway,
            Some(CLOSE_POLICY_VIOLATION) | Some(CLOSE_AUTH_FAILED) | Some(CLOSE_TOKEN_EXPIRED) => {
                CloseClass::Auth
            }
            Some(CLOSE_SERVICE_RESTART) | Some(CLOSE_TRY_AGAIN_LATER) | Some(CLOSE_SERVER_ERROR) => {
                CloseClass::Restart
            }
            Some(_) => CloseClass::Unrecognized,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, CloseClass::Auth)
    }
}

/// A stream termination as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseEvent {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// A close without a close frame (reset, EOF, protocol error)
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(None, reason)
    }

    pub fn class(&self) -> CloseClass {
        CloseClass::from_code(self.code)
    }
}

impl std::fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "({}) {}", code, self.reason),
            None => write!(f, "(no code) {}", self.reason),
        }
    }
}

/// Raw event read from a streaming transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Pong,
    Timeout,
    Closed(CloseEvent),
}

/// Result of `ConnectionManager::receive`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Frame(String),
    Timeout,
    Closed(CloseEvent),
}

/// Verdict of a heartbeat check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Inside the post-open stabilization window; no probe sent
    Stabilizing,
    /// Probe answered
    Alive,
    /// Probe lost, ceiling not yet reached
    Missed { failures: u32, ceiling: u32 },
    /// Ceiling reached; the connection must be torn down
    Dead { failures: u32 },
}
