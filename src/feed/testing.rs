//! Scripted transport for driving the connection manager and controller in tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::errors::ConnectError;
use crate::common::traits::FeedTransport;
use crate::common::types::{CloseEvent, TransportEvent};

/// Plays back queued events. An empty queue, or a `None` entry, behaves like a
/// silent server: the read waits out its timeout.
#[derive(Default)]
pub struct ScriptedTransport {
    connect_results: VecDeque<Result<(), ConnectError>>,
    events: VecDeque<Option<TransportEvent>>,
    ping_replies: VecDeque<bool>,
    open: bool,
    stall_sends: bool,
    stall_pings: bool,
    pub sent: Arc<Mutex<Vec<String>>>,
    pub closes: Arc<Mutex<Vec<u16>>>,
    pub connects: Arc<Mutex<u32>>,
    pub pings: Arc<Mutex<u32>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(mut self, err: ConnectError) -> Self {
        self.connect_results.push_back(Err(err));
        self
    }

    pub fn fail_connects(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.connect_results
                .push_back(Err(ConnectError::Transient("refused".to_string())));
        }
        self
    }

    pub fn silence(mut self) -> Self {
        self.events.push_back(None);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.events
            .push_back(Some(TransportEvent::Text(text.to_string())));
        self
    }

    pub fn closed(mut self, code: Option<u16>) -> Self {
        self.events.push_back(Some(TransportEvent::Closed(CloseEvent::new(
            code,
            "scripted close",
        ))));
        self
    }

    /// Per-ping answers; unscripted pings go unanswered
    pub fn pongs(mut self, replies: &[bool]) -> Self {
        self.ping_replies.extend(replies.iter().copied());
        self
    }

    /// Text writes never complete, like a peer that stopped reading
    pub fn stall_sends(mut self) -> Self {
        self.stall_sends = true;
        self
    }

    /// Ping writes never complete
    pub fn stall_pings(mut self) -> Self {
        self.stall_pings = true;
        self
    }

    pub fn push(&mut self, event: TransportEvent) {
        self.events.push_back(Some(event));
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        *self.connects.lock().unwrap() += 1;
        self.connect_results.pop_front().unwrap_or(Ok(()))?;
        self.open = true;
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), ConnectError> {
        if !self.open {
            return Err(ConnectError::Transient("websocket is not open".to_string()));
        }
        if self.stall_sends {
            std::future::pending::<()>().await;
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_event(&mut self, timeout: Duration) -> TransportEvent {
        if !self.open {
            return TransportEvent::Closed(CloseEvent::abnormal("websocket is not open"));
        }
        match self.events.pop_front() {
            Some(Some(event)) => {
                if matches!(event, TransportEvent::Closed(_)) {
                    self.open = false;
                }
                event
            }
            Some(None) | None => {
                tokio::time::sleep(timeout).await;
                TransportEvent::Timeout
            }
        }
    }

    async fn send_ping(&mut self) -> bool {
        if !self.open {
            return false;
        }
        *self.pings.lock().unwrap() += 1;
        if self.stall_pings {
            std::future::pending::<()>().await;
        }
        if self.ping_replies.pop_front().unwrap_or(false) {
            self.events.push_front(Some(TransportEvent::Pong));
        }
        true
    }

    async fn close(&mut self, code: u16, _reason: &str, _timeout: Duration) {
        if self.open {
            self.closes.lock().unwrap().push(code);
            self.open = false;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
