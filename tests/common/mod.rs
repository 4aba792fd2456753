//! Common test utilities and fixtures
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use signal_feed::config::{AppConfig, FeedConfig, ResilienceConfig};
use std::borrow::Cow;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "c1";
pub const PASSWORD: &str = "p1";
pub const TOKEN: &str = "tok-1";

/// Sample signal frames
pub mod frames {
    pub const TQQQ_BULL: &str = r#"{"ticker":"TQQQ","price":55.2,"level":"L2","direction":"Bull","depth":3,"codeNum":3,"time":"t1"}"#;
    pub const SOXL_BEAR: &str = r#"{"ticker":"SOXL","price":21.05,"level":"L0","direction":"Bear","depth":1,"codeNum":2,"time":"t2"}"#;
}

/// Fast timings so scenarios finish in well under a second of wall clock
pub fn fast_resilience() -> ResilienceConfig {
    ResilienceConfig {
        base_delay_ms: 50,
        max_delay_ms: 200,
        ack_timeout_ms: 200,
        close_timeout_ms: 500,
        receive_timeout_ms: 50,
        shutdown_poll_ms: 20,
        health_timeout_ms: 1000,
        auth_timeout_ms: 1000,
        connect_timeout_ms: 1000,
        ..ResilienceConfig::default()
    }
}

pub fn test_config(server_url: &str, stream_url: Option<String>) -> AppConfig {
    AppConfig {
        feed: FeedConfig {
            server_url: server_url.to_string(),
            client_id: CLIENT_ID.to_string(),
            password: PASSWORD.to_string(),
            stream_url,
            ..FeedConfig::default()
        },
        resilience: fast_resilience(),
        ..AppConfig::default()
    }
}

/// Mount a healthy `GET /`
pub async fn mount_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(server)
        .await;
}

/// Mount `POST /auth` issuing [`TOKEN`] for the test credentials, expecting `times` calls
pub async fn mount_auth(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/auth"))
        .and(body_json(json!({"client_id": CLIENT_ID, "password": PASSWORD})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": TOKEN})))
        .expect(times)
        .mount(server)
        .await;
}

/// What a scripted stream server does with one accepted connection
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Wait before the next action
    Pause(Duration),
    /// Send a text frame
    Send(String),
    /// Send a close frame with this code
    Close(u16),
}

/// A local websocket server that plays one script per accepted connection
/// and reports the first frame each client sends.
pub struct StreamServer {
    pub addr: SocketAddr,
    pub first_frames: mpsc::UnboundedReceiver<String>,
    handle: JoinHandle<()>,
}

impl StreamServer {
    pub async fn start(scripts: Vec<Vec<ServerAction>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stream server");
        let addr = listener.local_addr().expect("No local address");
        let (tx, first_frames) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            for script in scripts {
                let Ok((tcp, _)) = listener.accept().await else {
                    return;
                };
                let Ok(mut ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };

                if let Some(Ok(Message::Text(first))) = ws.next().await {
                    let _ = tx.send(first);
                }

                for action in script {
                    match action {
                        ServerAction::Pause(d) => tokio::time::sleep(d).await,
                        ServerAction::Send(text) => {
                            let _ = ws.send(Message::Text(text)).await;
                        }
                        ServerAction::Close(code) => {
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: CloseCode::from(code),
                                    reason: Cow::Borrowed("scripted"),
                                }))
                                .await;
                        }
                    }
                }

                // keep reading so pings are answered and closes complete
                while let Some(Ok(_)) = ws.next().await {}
            }
        });

        Self {
            addr,
            first_frames,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
