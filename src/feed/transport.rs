//! WebSocket transport for the signal stream

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::common::errors::ConnectError;
use crate::common::traits::FeedTransport;
use crate::common::types::{CloseEvent, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owns at most one live websocket to the signal server.
///
/// Every socket write is bounded by the connect timeout. A write that does not
/// finish in time drops the socket.
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
    stream: Option<WsStream>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_connect_timeout(url, Duration::from_secs(10))
    }

    pub fn with_connect_timeout(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            stream: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedTransport for WsTransport {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        if let Some(mut old) = self.stream.take() {
            debug!("Dropping previous websocket before reconnecting");
            if timeout(self.connect_timeout, old.close(None)).await.is_err() {
                warn!("Previous websocket did not close in time, dropping it");
            }
        }

        info!("Attempting WebSocket connection to {}", self.url);
        let (stream, _response) = timeout(self.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| {
                ConnectError::Transient(format!(
                    "connect timed out after {:?}",
                    self.connect_timeout
                ))
            })??;

        self.stream = Some(stream);
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), ConnectError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ConnectError::Transient("websocket is not open".to_string()))?;
        let sent = timeout(self.connect_timeout, stream.send(Message::Text(text))).await;
        match sent {
            Ok(result) => Ok(result?),
            Err(_) => {
                self.stream = None;
                Err(ConnectError::Transient(format!(
                    "send timed out after {:?}",
                    self.connect_timeout
                )))
            }
        }
    }

    async fn next_event(&mut self, wait: Duration) -> TransportEvent {
        let Some(stream) = self.stream.as_mut() else {
            return TransportEvent::Closed(CloseEvent::abnormal("websocket is not open"));
        };

        let deadline = Instant::now() + wait;
        loop {
            let msg = match timeout_at(deadline, stream.next()).await {
                Err(_) => return TransportEvent::Timeout,
                Ok(msg) => msg,
            };

            let event = match msg {
                Some(Ok(Message::Text(text))) => TransportEvent::Text(text),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => TransportEvent::Text(text),
                    Err(_) => {
                        warn!("Dropping non UTF-8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Pong(_))) => TransportEvent::Pong,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {
                    // tungstenite queues the pong reply itself
                    continue;
                }
                Some(Ok(Message::Close(frame))) => {
                    let event = match frame {
                        Some(f) => CloseEvent::new(Some(u16::from(f.code)), f.reason.to_string()),
                        None => CloseEvent::new(None, "closed without frame"),
                    };
                    TransportEvent::Closed(event)
                }
                Some(Err(e)) => TransportEvent::Closed(CloseEvent::abnormal(e.to_string())),
                None => TransportEvent::Closed(CloseEvent::abnormal("stream ended")),
            };

            if matches!(event, TransportEvent::Closed(_)) {
                self.stream = None;
            }
            return event;
        }
    }

    async fn send_ping(&mut self) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        let sent = timeout(self.connect_timeout, stream.send(Message::Ping(Vec::new()))).await;
        match sent {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Failed to send ping: {}", e);
                false
            }
            Err(_) => {
                warn!("Ping write timed out, dropping websocket");
                self.stream = None;
                false
            }
        }
    }

    async fn close(&mut self, code: u16, reason: &str, wait: Duration) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: Cow::Owned(reason.to_string()),
        };

        match timeout(wait, async {
            stream.close(Some(frame)).await?;
            // drain until the peer acknowledges the close
            while let Some(msg) = stream.next().await {
                msg?;
            }
            Ok::<(), tokio_tungstenite::tungstenite::Error>(())
        })
        .await
        {
            Ok(Ok(())) => debug!("WebSocket closed gracefully ({})", code),
            Ok(Err(e)) => debug!("WebSocket close finished with: {}", e),
            Err(_) => warn!("WebSocket close not acknowledged within {:?}", wait),
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
