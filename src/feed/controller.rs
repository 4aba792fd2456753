//! Resilience controller: the health, auth, connect and stream state machine
//!
//! One controller drives one logical stream. All work happens on the task
//! that calls [`ResilienceController::listen`] (or [`step`]); stopping is
//! cooperative through the shared [`RunningFlag`].
//!
//! [`step`]: ResilienceController::step

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::auth::Authenticator;
use super::backoff::{backoff_delay, RetryState};
use super::connection::{ConnectionManager, ConnectionSettings};
use super::dispatcher::{DispatchStats, MessageDispatcher};
use super::health::HealthProber;
use super::transport::WsTransport;
use crate::common::errors::{AuthError, ConnectError, Result};
use crate::common::running::RunningFlag;
use crate::common::status::{report_status, StatusLevel};
use crate::common::traits::{FeedTransport, HealthProbe, SignalConsumer, TokenProvider};
use crate::common::types::{
    CloseClass, CloseEvent, Liveness, ReceiveOutcome, SessionToken, CLOSE_GOING_AWAY,
    CLOSE_NORMAL,
};
use crate::config::types::{AppConfig, ResilienceConfig};

/// Where a backoff sleep resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    CheckingHealth,
    Connecting,
}

/// Why the controller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The running flag was cleared
    Shutdown,
    /// The server rejected the credentials
    InvalidCredentials,
    /// The authentication attempt ceiling was reached
    AuthAttemptsExhausted,
    /// The health-check ceiling was exceeded
    ServerUnreachable,
}

impl StopReason {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StopReason::Shutdown)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Shutdown => write!(f, "shutdown requested"),
            StopReason::InvalidCredentials => write!(f, "invalid credentials"),
            StopReason::AuthAttemptsExhausted => {
                write!(f, "maximum authentication attempts reached")
            }
            StopReason::ServerUnreachable => write!(f, "maximum server check attempts reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    CheckingHealth,
    Authenticating,
    Connecting,
    Streaming,
    BackingOff {
        delay: Duration,
        resume: ResumeState,
    },
    Stopped(StopReason),
}

impl From<ResumeState> for ControllerState {
    fn from(resume: ResumeState) -> Self {
        match resume {
            ResumeState::CheckingHealth => ControllerState::CheckingHealth,
            ResumeState::Connecting => ControllerState::Connecting,
        }
    }
}

/// Controller wired to the real HTTP and websocket collaborators
pub type FeedController = ResilienceController<HealthProber, Authenticator<HealthProber>, WsTransport>;

impl FeedController {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let feed = &config.feed;
        let resilience = &config.resilience;

        let prober = HealthProber::with_timeout(&feed.server_url, resilience.health_timeout())?;
        let authenticator = Authenticator::with_settings(
            &feed.server_url,
            feed.credentials(),
            prober.clone(),
            resilience.auth_timeout(),
            resilience.auth_max_attempts,
        )?;
        let transport =
            WsTransport::with_connect_timeout(feed.stream_url()?, resilience.connect_timeout());
        let running = RunningFlag::with_poll_interval(resilience.shutdown_poll());

        Ok(Self::new(
            prober,
            authenticator,
            transport,
            resilience.clone(),
            running,
        ))
    }
}

pub struct ResilienceController<P, A, T> {
    prober: P,
    authenticator: A,
    connection: ConnectionManager<T>,
    dispatcher: MessageDispatcher,
    config: ResilienceConfig,
    running: RunningFlag,
    token: Option<SessionToken>,
    health_retry: RetryState,
    /// Authentications turned away by an unhealthy server since the last token
    unavailable_retry: RetryState,
    connect_retry: RetryState,
    state: ControllerState,
    state_tx: watch::Sender<ControllerState>,
}

impl<P, A, T> ResilienceController<P, A, T>
where
    P: HealthProbe,
    A: TokenProvider,
    T: FeedTransport,
{
    pub fn new(
        prober: P,
        authenticator: A,
        transport: T,
        config: ResilienceConfig,
        running: RunningFlag,
    ) -> Self {
        let connection = ConnectionManager::new(transport, ConnectionSettings::from(&config));
        let health_retry = RetryState::new(
            config.health_check_max_retries,
            config.base_delay(),
            config.max_delay(),
        );
        let unavailable_retry = health_retry.clone();
        let connect_retry = RetryState::new(
            config.connect_max_retries,
            config.base_delay(),
            config.max_delay(),
        );
        let (state_tx, _) = watch::channel(ControllerState::Idle);

        Self {
            prober,
            authenticator,
            connection,
            dispatcher: MessageDispatcher::new(),
            config,
            running,
            token: None,
            health_retry,
            unavailable_retry,
            connect_retry,
            state: ControllerState::Idle,
            state_tx,
        }
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_retry.attempts()
    }

    pub fn health_check_attempts(&self) -> u32 {
        self.health_retry.attempts()
    }

    /// A clone of the running flag, e.g. for a signal handler
    pub fn running_flag(&self) -> RunningFlag {
        self.running.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Run until the controller stops
    pub async fn listen<C: SignalConsumer + ?Sized>(&mut self, consumer: &mut C) -> StopReason {
        info!("Starting signal feed listener");
        loop {
            if let ControllerState::Stopped(reason) = self.step(consumer).await {
                return reason;
            }
        }
    }

    /// Clear the running flag and close any live connection
    pub async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        report_status("Shutdown", "Initiating graceful shutdown", StatusLevel::Info);
        self.running.stop();
        if !matches!(self.state, ControllerState::Stopped(_)) {
            self.transition(ControllerState::Stopped(StopReason::Shutdown))
                .await;
        }
        report_status("Shutdown", "Complete", StatusLevel::Success);
    }

    /// Perform one transition and return the new state
    ///
    /// `Streaming` is a single step that lasts until the stream ends.
    pub async fn step<C: SignalConsumer + ?Sized>(&mut self, consumer: &mut C) -> ControllerState {
        if let ControllerState::Stopped(_) = self.state {
            return self.state;
        }

        let next = if !self.running.is_running() {
            ControllerState::Stopped(StopReason::Shutdown)
        } else {
            match self.state {
                ControllerState::Idle => ControllerState::CheckingHealth,
                ControllerState::CheckingHealth => self.check_health().await,
                ControllerState::Authenticating => self.authenticate().await,
                ControllerState::Connecting => self.connect().await,
                ControllerState::Streaming => self.stream(consumer).await,
                ControllerState::BackingOff { delay, resume } => {
                    if self.running.sleep(delay).await {
                        resume.into()
                    } else {
                        ControllerState::Stopped(StopReason::Shutdown)
                    }
                }
                ControllerState::Stopped(reason) => ControllerState::Stopped(reason),
            }
        };

        self.transition(next).await;
        self.state
    }

    async fn transition(&mut self, next: ControllerState) {
        if let ControllerState::Stopped(reason) = next {
            if reason.is_fatal() {
                error!("Stopping client: {}", reason);
                report_status("Client", &format!("Stopping: {}", reason), StatusLevel::Error);
                self.running.stop();
            } else {
                info!("Stopping client: {}", reason);
            }
            if self.connection.is_open() {
                self.connection.close(CLOSE_NORMAL).await;
                info!("WebSocket connection closed gracefully");
            }
        }

        debug!("State transition: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.state_tx.send_replace(next);
    }

    async fn check_health(&mut self) -> ControllerState {
        let status = self.prober.probe().await;
        if status.is_healthy() {
            self.health_retry.reset();
            return if self.token.is_some() {
                ControllerState::Connecting
            } else {
                ControllerState::Authenticating
            };
        }

        let attempts = self.health_retry.record_failure();
        if self.health_retry.is_exceeded() {
            error!(
                attempts,
                ceiling = self.health_retry.ceiling(),
                "Maximum server check attempts reached: {}",
                status
            );
            return ControllerState::Stopped(StopReason::ServerUnreachable);
        }

        let delay = self.health_retry.delay();
        error!(
            attempts,
            ceiling = self.health_retry.ceiling(),
            delay_secs = delay.as_secs_f64(),
            "Server is not available: {}",
            status
        );
        report_status(
            "Server",
            &format!(
                "Retry attempt {} of {}: {}",
                attempts,
                self.health_retry.ceiling(),
                status
            ),
            StatusLevel::Warning,
        );
        ControllerState::BackingOff {
            delay,
            resume: ResumeState::CheckingHealth,
        }
    }

    async fn authenticate(&mut self) -> ControllerState {
        match self.authenticator.authenticate().await {
            Ok(token) => {
                self.token = Some(token);
                self.unavailable_retry.reset();
                self.connect_retry.reset();
                ControllerState::Connecting
            }
            Err(AuthError::InvalidCredentials) => {
                ControllerState::Stopped(StopReason::InvalidCredentials)
            }
            Err(AuthError::AttemptsExhausted { .. }) => {
                ControllerState::Stopped(StopReason::AuthAttemptsExhausted)
            }
            Err(AuthError::ServerUnavailable(status)) => {
                let attempts = self.unavailable_retry.record_failure();
                if self.unavailable_retry.is_exceeded() {
                    error!(
                        attempts,
                        ceiling = self.unavailable_retry.ceiling(),
                        "Server kept failing during authentication: {}",
                        status
                    );
                    return ControllerState::Stopped(StopReason::ServerUnreachable);
                }

                let delay = self.unavailable_retry.delay();
                warn!(
                    attempts,
                    ceiling = self.unavailable_retry.ceiling(),
                    delay_secs = delay.as_secs_f64(),
                    "Server unavailable during authentication: {}",
                    status
                );
                ControllerState::BackingOff {
                    delay,
                    resume: ResumeState::CheckingHealth,
                }
            }
            Err(err @ AuthError::Transient(_)) => {
                let attempts = self.authenticator.attempts();
                let delay =
                    backoff_delay(self.config.base_delay(), self.config.max_delay(), attempts);
                warn!(
                    attempts,
                    ceiling = self.config.auth_max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "Authentication failed, retrying in {:?}: {}",
                    delay,
                    err
                );
                ControllerState::BackingOff {
                    delay,
                    resume: ResumeState::CheckingHealth,
                }
            }
        }
    }

    async fn connect(&mut self) -> ControllerState {
        let Some(token) = self.token.clone() else {
            warn!("No valid token available. Authentication required.");
            return ControllerState::Authenticating;
        };

        report_status(
            "Connection",
            "Attempting to connect to server",
            StatusLevel::Info,
        );
        match self.connection.open(&token).await {
            Ok(()) => {
                self.connect_retry.reset();
                info!("Successfully connected to server");
                report_status(
                    "Connection",
                    "Successfully connected to server",
                    StatusLevel::Success,
                );
                ControllerState::Streaming
            }
            Err(ConnectError::TokenRejected(reason)) => {
                warn!("Server rejected token ({}), re-authenticating", reason);
                report_status(
                    "Connection",
                    "Token rejected, re-authenticating",
                    StatusLevel::Warning,
                );
                self.token = None;
                ControllerState::Authenticating
            }
            Err(ConnectError::Transient(reason)) => {
                let attempts = self.connect_retry.record_failure();
                report_status(
                    "Connection",
                    &format!("Failed: {}", reason),
                    StatusLevel::Error,
                );

                if self.connect_retry.is_exceeded() {
                    error!(
                        attempts,
                        ceiling = self.connect_retry.ceiling(),
                        "Maximum reconnection attempts reached. Requiring re-authentication."
                    );
                    self.token = None;
                    self.connect_retry.reset();
                    self.health_retry.reset();
                    return ControllerState::Authenticating;
                }

                let delay = self.connect_retry.delay();
                warn!(
                    attempts,
                    ceiling = self.connect_retry.ceiling(),
                    delay_secs = delay.as_secs_f64(),
                    "Connection failed, retrying in {:?}: {}",
                    delay,
                    reason
                );
                ControllerState::BackingOff {
                    delay,
                    resume: ResumeState::Connecting,
                }
            }
        }
    }

    async fn stream<C: SignalConsumer + ?Sized>(&mut self, consumer: &mut C) -> ControllerState {
        let ping_interval = self.config.ping_interval();
        let mut next_ping = Instant::now() + ping_interval;

        loop {
            if !self.running.is_running() {
                return ControllerState::Stopped(StopReason::Shutdown);
            }

            if Instant::now() >= next_ping {
                match self
                    .connection
                    .check_heartbeat(self.config.ping_timeout())
                    .await
                {
                    Liveness::Stabilizing | Liveness::Alive => {}
                    Liveness::Missed { failures, ceiling } => {
                        warn!(failures, ceiling, "Heartbeat not answered");
                    }
                    Liveness::Dead { failures } => {
                        error!(failures, "Heartbeat ceiling reached, reconnecting");
                        self.connection.close(CLOSE_GOING_AWAY).await;
                        return ControllerState::Connecting;
                    }
                }
                next_ping = Instant::now() + ping_interval;
            }

            match self.connection.receive(self.config.receive_timeout()).await {
                ReceiveOutcome::Frame(raw) => {
                    self.dispatcher.dispatch(&raw, consumer);
                }
                ReceiveOutcome::Timeout => {}
                ReceiveOutcome::Closed(event) => return self.on_close(event),
            }
        }
    }

    fn on_close(&mut self, event: CloseEvent) -> ControllerState {
        if !self.running.is_running() {
            return ControllerState::Stopped(StopReason::Shutdown);
        }

        let class = event.class();
        match class {
            CloseClass::Auth => {
                warn!("Server requires re-authentication {}", event);
                self.token = None;
                return ControllerState::Authenticating;
            }
            CloseClass::Normal => info!("Connection closed normally {}", event),
            CloseClass::Restart => warn!("Server is restarting {}", event),
            CloseClass::GoingAway | CloseClass::Abnormal | CloseClass::Unrecognized => {
                warn!("Connection closed {}", event)
            }
        }

        let delay = self.connect_retry.delay();
        info!(
            attempts = self.connect_retry.attempts(),
            ceiling = self.connect_retry.ceiling(),
            delay_secs = delay.as_secs_f64(),
            "Retrying connection in {:?}",
            delay
        );
        ControllerState::BackingOff {
            delay,
            resume: ResumeState::Connecting,
        }
    }
}
