//! Connection manager: token handshake, receive buffering and heartbeat

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use super::messages::{HandshakeReply, HandshakeVerdict, TokenFrame};
use crate::common::errors::ConnectError;
use crate::common::traits::FeedTransport;
use crate::common::types::{
    CloseEvent, Liveness, ReceiveOutcome, SessionToken, SignalRecord, TransportEvent,
    CLOSE_GOING_AWAY,
};
use crate::config::types::ResilienceConfig;

/// Consecutive heartbeat failures against a ceiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatState {
    failures: u32,
    ceiling: u32,
}

impl HeartbeatState {
    pub fn new(ceiling: u32) -> Self {
        Self {
            failures: 0,
            ceiling,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn record_failure(&mut self) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.failures
    }

    pub fn is_dead(&self) -> bool {
        self.failures >= self.ceiling
    }
}

/// Timing knobs for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub ack_timeout: Duration,
    pub stabilization: Duration,
    pub close_timeout: Duration,
    pub heartbeat_max_failures: u32,
}

impl From<&ResilienceConfig> for ConnectionSettings {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            ack_timeout: config.ack_timeout(),
            stabilization: config.stabilization(),
            close_timeout: config.close_timeout(),
            heartbeat_max_failures: config.heartbeat_max_failures,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ResilienceConfig::default())
    }
}

/// Owns the streaming transport for one controller
///
/// Frames read while waiting for a pong are buffered and handed out, in
/// order, by later [`receive`](Self::receive) calls.
pub struct ConnectionManager<T> {
    transport: T,
    settings: ConnectionSettings,
    heartbeat: HeartbeatState,
    opened_at: Option<Instant>,
    pending: VecDeque<String>,
    pending_close: Option<CloseEvent>,
}

impl<T: FeedTransport> ConnectionManager<T> {
    pub fn new(transport: T, settings: ConnectionSettings) -> Self {
        let heartbeat = HeartbeatState::new(settings.heartbeat_max_failures);
        Self {
            transport,
            settings,
            heartbeat,
            opened_at: None,
            pending: VecDeque::new(),
            pending_close: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    pub fn heartbeat(&self) -> &HeartbeatState {
        &self.heartbeat
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect, send the token frame and wait briefly for a rejection
    #[instrument(skip(self, token))]
    pub async fn open(&mut self, token: &SessionToken) -> Result<(), ConnectError> {
        if self.is_open() || self.transport.is_open() {
            debug!("Closing live connection before opening a new one");
            self.close(CLOSE_GOING_AWAY).await;
        }
        self.pending.clear();
        self.pending_close = None;

        self.transport.connect().await?;

        let frame = serde_json::to_string(&TokenFrame {
            token: token.as_str(),
        })
        .map_err(|e| ConnectError::Transient(e.to_string()))?;

        let send = self.transport.send_text(frame);
        let sent = match tokio::time::timeout(self.settings.ack_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(ConnectError::Transient("token send timed out".to_string())),
        };
        if let Err(e) = sent {
            self.discard().await;
            return Err(e);
        }
        debug!("Authentication token sent");

        match self.transport.next_event(self.settings.ack_timeout).await {
            TransportEvent::Timeout => {
                warn!("No response after authentication (this might be normal)");
            }
            TransportEvent::Pong => {}
            TransportEvent::Text(reply) => match HandshakeReply::verdict(&reply) {
                HandshakeVerdict::Accepted => {
                    info!("Server response after authentication: {}", reply);
                    if serde_json::from_str::<SignalRecord>(&reply).is_ok() {
                        self.pending.push_back(reply);
                    }
                }
                HandshakeVerdict::TokenRejected(reason) => {
                    self.discard().await;
                    return Err(ConnectError::TokenRejected(reason));
                }
                HandshakeVerdict::Failed(reason) => {
                    self.discard().await;
                    return Err(ConnectError::Transient(reason));
                }
            },
            TransportEvent::Closed(event) => {
                self.discard().await;
                return Err(if event.class().requires_reauth() {
                    ConnectError::TokenRejected(event.to_string())
                } else {
                    ConnectError::Transient(format!("closed during handshake {}", event))
                });
            }
        }

        self.opened_at = Some(Instant::now());
        self.heartbeat.record_success();
        Ok(())
    }

    /// Next frame, a timeout, or the close that ended the connection
    pub async fn receive(&mut self, timeout: Duration) -> ReceiveOutcome {
        if let Some(frame) = self.pending.pop_front() {
            self.heartbeat.record_success();
            return ReceiveOutcome::Frame(frame);
        }
        if let Some(event) = self.pending_close.take() {
            self.discard().await;
            return ReceiveOutcome::Closed(event);
        }
        if !self.is_open() {
            return ReceiveOutcome::Closed(CloseEvent::abnormal("connection not open"));
        }

        match self.transport.next_event(timeout).await {
            TransportEvent::Text(frame) => {
                self.heartbeat.record_success();
                ReceiveOutcome::Frame(frame)
            }
            TransportEvent::Pong => {
                self.heartbeat.record_success();
                ReceiveOutcome::Timeout
            }
            TransportEvent::Timeout => ReceiveOutcome::Timeout,
            TransportEvent::Closed(event) => {
                self.discard().await;
                ReceiveOutcome::Closed(event)
            }
        }
    }

    /// One ping round trip. Frames that arrive meanwhile are buffered and
    /// count as proof of life.
    pub async fn probe_liveness(&mut self, timeout: Duration) -> bool {
        if !self.is_open() || self.pending_close.is_some() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        match timeout_at(deadline, self.transport.send_ping()).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(_) => {
                warn!("Ping write did not complete within {:?}", timeout);
                return false;
            }
        }

        let mut saw_traffic = false;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return saw_traffic;
            }
            match self.transport.next_event(deadline - now).await {
                TransportEvent::Pong => return true,
                TransportEvent::Text(frame) => {
                    self.pending.push_back(frame);
                    saw_traffic = true;
                }
                TransportEvent::Timeout => return saw_traffic,
                TransportEvent::Closed(event) => {
                    self.pending_close = Some(event);
                    return false;
                }
            }
        }
    }

    /// Probe liveness unless still stabilizing, and track consecutive failures
    pub async fn check_heartbeat(&mut self, timeout: Duration) -> Liveness {
        match self.opened_at {
            Some(opened) if opened.elapsed() < self.settings.stabilization => {
                return Liveness::Stabilizing
            }
            Some(_) => {}
            None => {
                return Liveness::Dead {
                    failures: self.heartbeat.failures(),
                }
            }
        }

        if self.probe_liveness(timeout).await {
            self.heartbeat.record_success();
            return Liveness::Alive;
        }

        let failures = self.heartbeat.record_failure();
        if self.heartbeat.is_dead() {
            Liveness::Dead { failures }
        } else {
            Liveness::Missed {
                failures,
                ceiling: self.heartbeat.ceiling(),
            }
        }
    }

    /// Close with `code`, bounded by the close timeout
    pub async fn close(&mut self, code: u16) {
        let reason = match code {
            CLOSE_GOING_AWAY => "going away",
            _ => "client closing",
        };
        self.transport
            .close(code, reason, self.settings.close_timeout)
            .await;
        self.reset();
    }

    /// Tear down after the peer already closed or the handshake failed
    async fn discard(&mut self) {
        self.transport
            .close(CLOSE_GOING_AWAY, "discarded", self.settings.close_timeout)
            .await;
        self.reset();
    }

    fn reset(&mut self) {
        self.opened_at = None;
        self.pending.clear();
        self.pending_close = None;
        self.heartbeat.record_success();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{CLOSE_AUTH_FAILED, CLOSE_SERVICE_RESTART};
    use crate::feed::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;

    fn settings() -> ConnectionSettings {
        ConnectionSettings::default()
    }

    fn token() -> SessionToken {
        SessionToken::new("tok-1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_sends_token_and_accepts_silence() {
        let transport = ScriptedTransport::new().silence();
        let sent = transport.sent.clone();
        let mut conn = ConnectionManager::new(transport, settings());

        let start = Instant::now();
        conn.open(&token()).await.unwrap();

        assert!(conn.is_open());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(*sent.lock().unwrap(), vec![r#"{"token":"tok-1"}"#.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_detects_expired_token() {
        let transport = ScriptedTransport::new().text(r#"{"error":"token_expired"}"#);
        let closes = transport.closes.clone();
        let mut conn = ConnectionManager::new(transport, settings());

        let err = conn.open(&token()).await.unwrap_err();
        assert_eq!(err, ConnectError::TokenRejected("token_expired".to_string()));
        assert!(!conn.is_open());
        assert_eq!(closes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_classifies_handshake_close() {
        let transport = ScriptedTransport::new().closed(Some(CLOSE_AUTH_FAILED));
        let mut conn = ConnectionManager::new(transport, settings());
        assert!(matches!(
            conn.open(&token()).await,
            Err(ConnectError::TokenRejected(_))
        ));

        let transport = ScriptedTransport::new().closed(Some(CLOSE_SERVICE_RESTART));
        let mut conn = ConnectionManager::new(transport, settings());
        assert!(matches!(
            conn.open(&token()).await,
            Err(ConnectError::Transient(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_propagates_connect_failure() {
        let transport =
            ScriptedTransport::new().fail_connect(ConnectError::Transient("refused".to_string()));
        let mut conn = ConnectionManager::new(transport, settings());
        assert_eq!(
            conn.open(&token()).await,
            Err(ConnectError::Transient("refused".to_string()))
        );
        assert!(!conn.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_frames_then_close() {
        let transport = ScriptedTransport::new()
            .silence()
            .text("a")
            .text("b")
            .closed(Some(1000));
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();

        let timeout = Duration::from_secs(1);
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Frame("a".to_string()));
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Frame("b".to_string()));
        assert!(matches!(
            conn.receive(timeout).await,
            ReceiveOutcome::Closed(CloseEvent { code: Some(1000), .. })
        ));
        assert!(!conn.is_open());
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Closed(CloseEvent::abnormal("connection not open")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_probe_during_stabilization() {
        let transport = ScriptedTransport::new().silence();
        let pings = transport.pings.clone();
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(conn.check_heartbeat(Duration::from_secs(10)).await, Liveness::Stabilizing);
        assert_eq!(*pings.lock().unwrap(), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(
            conn.check_heartbeat(Duration::from_secs(10)).await,
            Liveness::Missed { failures: 1, ceiling: 3 }
        );
        assert_eq!(*pings.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_ceiling_failures_mark_dead() {
        let transport = ScriptedTransport::new().silence();
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        let timeout = Duration::from_secs(10);
        assert_eq!(
            conn.check_heartbeat(timeout).await,
            Liveness::Missed { failures: 1, ceiling: 3 }
        );
        assert_eq!(
            conn.check_heartbeat(timeout).await,
            Liveness::Missed { failures: 2, ceiling: 3 }
        );
        assert_eq!(conn.check_heartbeat(timeout).await, Liveness::Dead { failures: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovered_probe_resets_counter() {
        let transport = ScriptedTransport::new()
            .silence()
            .pongs(&[false, false, true, false, false]);
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        let timeout = Duration::from_secs(10);
        assert!(matches!(conn.check_heartbeat(timeout).await, Liveness::Missed { failures: 1, .. }));
        assert!(matches!(conn.check_heartbeat(timeout).await, Liveness::Missed { failures: 2, .. }));
        assert_eq!(conn.check_heartbeat(timeout).await, Liveness::Alive);
        assert_eq!(conn.heartbeat().failures(), 0);
        assert!(matches!(conn.check_heartbeat(timeout).await, Liveness::Missed { failures: 1, .. }));
        assert!(matches!(conn.check_heartbeat(timeout).await, Liveness::Missed { failures: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_resets_heartbeat_failures() {
        let transport = ScriptedTransport::new().silence();
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        conn.check_heartbeat(Duration::from_secs(1)).await;
        assert_eq!(conn.heartbeat().failures(), 1);

        conn.transport.push(TransportEvent::Text("frame".to_string()));
        assert_eq!(
            conn.receive(Duration::from_secs(1)).await,
            ReceiveOutcome::Frame("frame".to_string())
        );
        assert_eq!(conn.heartbeat().failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_during_probe_are_buffered_in_order() {
        let transport = ScriptedTransport::new().silence();
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        conn.transport.push(TransportEvent::Text("x".to_string()));
        conn.transport.push(TransportEvent::Text("y".to_string()));
        assert!(conn.probe_liveness(Duration::from_secs(1)).await);

        let timeout = Duration::from_secs(1);
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Frame("x".to_string()));
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Frame("y".to_string()));
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_closes_previous_handle() {
        let transport = ScriptedTransport::new().silence().silence();
        let closes = transport.closes.clone();
        let connects = transport.connects.clone();
        let mut conn = ConnectionManager::new(transport, settings());

        conn.open(&token()).await.unwrap();
        conn.open(&token()).await.unwrap();

        assert_eq!(*connects.lock().unwrap(), 2);
        assert_eq!(*closes.lock().unwrap(), vec![CLOSE_GOING_AWAY]);
        assert!(conn.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_token_write_fails_open() {
        let transport = ScriptedTransport::new().stall_sends();
        let mut conn = ConnectionManager::new(transport, settings());

        let start = Instant::now();
        let err = conn.open(&token()).await.unwrap_err();

        assert!(matches!(err, ConnectError::Transient(_)));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(!conn.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_ping_write_counts_as_missed_heartbeat() {
        let transport = ScriptedTransport::new().silence().stall_pings();
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        let start = Instant::now();
        assert_eq!(
            conn.check_heartbeat(Duration::from_secs(10)).await,
            Liveness::Missed { failures: 1, ceiling: 3 }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_in_handshake_window_is_delivered() {
        const SIGNAL: &str = r#"{"ticker":"TQQQ","price":55.2,"level":"L2","direction":"Bull","depth":3,"codeNum":3,"time":"t1"}"#;
        let transport = ScriptedTransport::new().text(SIGNAL);
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();

        let timeout = Duration::from_secs(1);
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Frame(SIGNAL.to_string()));
        assert_eq!(conn.receive(timeout).await, ReceiveOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_signal_handshake_reply_is_not_delivered() {
        let transport = ScriptedTransport::new().text(r#"{"status":"ok"}"#);
        let mut conn = ConnectionManager::new(transport, settings());
        conn.open(&token()).await.unwrap();

        assert_eq!(conn.receive(Duration::from_secs(1)).await, ReceiveOutcome::Timeout);
    }
}
