//! Connection lifecycle for one cloud endpoint.
//!
//! A `Connection` owns all runtime state for its endpoint and is driven by a
//! single task (`run`). The phases are:
//!
//! ```text
//! Idle -> Discovering -> Connecting -> Subscribing -> Streaming -> Closing -> Idle
//! ```
//!
//! Discovery and connect failures go straight back to `Idle` with the retry
//! timer armed. The retry timer fires every ten seconds until a connection
//! opens; opening clears it. A close tears down the local subscriptions and
//! the static timer before arming the retry timer again.

use std::future::pending;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use signalk_core::{ConfigStorage, Delta, Position};
use signalk_protocol::{
    decode_inbound, encode_message, AccessOutcome, AccessRequestMessage, AccessResponse,
    InboundMessage,
};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bus::{LocalBus, Unsubscribe};
use crate::config::{persist_credential, EndpointConfig, PLUGIN_ID, RETRY_DELAY};
use crate::discovery::{HttpResolver, Resolver};
use crate::error::{DiscoveryError, RelayError, TransportError};
use crate::forwarder::{prepare_inbound, prepare_outbound, self_position};
use crate::position::SharedPosition;
use crate::snapshot::static_snapshot;
use crate::status::StatusBoard;
use crate::subscription::{local_subscription, remote_subscription};
use crate::transport::{Connector, Transport, WsConnector};

const ACCESS_DESCRIPTION: &str = "SignalK Cloud relay";

/// Everything endpoint tasks share.
pub struct RelayContext {
    pub bus: Arc<dyn LocalBus>,
    pub resolver: Arc<dyn Resolver>,
    pub connector: Arc<dyn Connector>,
    pub storage: Arc<dyn ConfigStorage>,
    pub position: SharedPosition,
    pub status: StatusBoard,
    pub server_name: String,
    pub server_version: String,
    /// Identifies this relay in device access requests.
    pub client_id: String,
    /// Serializes credential write-back between endpoints.
    pub persist_lock: Mutex<()>,
}

impl RelayContext {
    /// Context with the HTTP resolver and WebSocket connector.
    pub fn new(
        bus: Arc<dyn LocalBus>,
        storage: Arc<dyn ConfigStorage>,
    ) -> Result<Self, DiscoveryError> {
        Ok(Self::with_network(
            bus,
            storage,
            Arc::new(HttpResolver::new()?),
            Arc::new(WsConnector::new()),
        ))
    }

    pub fn with_network(
        bus: Arc<dyn LocalBus>,
        storage: Arc<dyn ConfigStorage>,
        resolver: Arc<dyn Resolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            bus,
            resolver,
            connector,
            storage,
            position: SharedPosition::new(),
            status: StatusBoard::new(),
            server_name: "signalk-rs".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            persist_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Discovering,
    Connecting,
    Subscribing,
    Streaming,
    Closing,
}

/// Runtime state of one endpoint.
#[derive(Default)]
pub struct ConnectionState {
    phase: Phase,
    transport: Option<Box<dyn Transport>>,
    retry_timer: Option<Interval>,
    static_timer: Option<Interval>,
    unsubscribes: Vec<Unsubscribe>,
    local_rx: Option<mpsc::UnboundedReceiver<Delta>>,
    authorized: bool,
    access_requested: bool,
    subscribed_position: Option<Position>,
    had_send_error: bool,
}

impl ConnectionState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn retry_armed(&self) -> bool {
        self.retry_timer.is_some()
    }

    pub fn static_armed(&self) -> bool {
        self.static_timer.is_some()
    }

    pub fn local_subscription_count(&self) -> usize {
        self.unsubscribes.len()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    /// Position the current remote subscription is centered on.
    pub fn subscribed_position(&self) -> Option<Position> {
        self.subscribed_position
    }

    pub fn had_send_error(&self) -> bool {
        self.had_send_error
    }
}

/// A recurring timer whose first tick is one period from now.
fn timer(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending().await,
    }
}

async fn recv_local(rx: &mut Option<mpsc::UnboundedReceiver<Delta>>) -> Option<Delta> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn recv_remote(
    transport: &mut Option<Box<dyn Transport>>,
) -> Option<Result<String, TransportError>> {
    match transport {
        Some(transport) => transport.next_message().await,
        None => pending().await,
    }
}

enum Event {
    Cancelled,
    Retry,
    Static,
    Local(Option<Delta>),
    Remote(Option<Result<String, TransportError>>),
}

/// One endpoint: its configuration, its state and the shared context.
pub struct Connection {
    config: EndpointConfig,
    state: ConnectionState,
    ctx: Arc<RelayContext>,
    self_context: String,
}

impl Connection {
    pub fn new(config: EndpointConfig, ctx: Arc<RelayContext>) -> Self {
        let state = ConnectionState {
            authorized: config.has_credential(),
            ..Default::default()
        };
        let self_context = ctx.bus.self_context();
        Self {
            config,
            state,
            ctx,
            self_context,
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// One attempt to reach `Streaming`. Failures are reported and arm the
    /// retry timer; nothing is returned to the caller.
    pub async fn connect(&mut self) {
        if self.state.transport.is_some() {
            return;
        }

        self.state.phase = Phase::Discovering;
        let resolved = match self.ctx.resolver.resolve(&self.config.url).await {
            Ok(resolved) => resolved,
            Err(e) => return self.fail(e.into()),
        };

        self.state.phase = Phase::Connecting;
        let url = match resolved.stream_url(self.config.outward_period(), self.config.static_period())
        {
            Ok(url) => url,
            Err(e) => return self.fail(e.into()),
        };

        self.ctx
            .status
            .normal(&self.config.url, format!("trying to connect to: {url}"));
        match self
            .ctx
            .connector
            .connect(&url, self.config.credential.as_deref())
            .await
        {
            Ok(transport) => self.on_open(transport).await,
            Err(e) => self.fail(e.into()),
        }
    }

    fn fail(&mut self, error: RelayError) {
        self.ctx.status.error(&self.config.url, error.to_string());
        self.state.phase = Phase::Idle;
        self.arm_retry();
    }

    fn arm_retry(&mut self) {
        if self.state.retry_timer.is_none() {
            debug!(url = %self.config.url, "Retrying in {:?}", RETRY_DELAY);
            self.state.retry_timer = Some(timer(RETRY_DELAY));
        }
    }

    /// Bring a freshly opened transport to `Streaming`.
    pub async fn on_open(&mut self, transport: Box<dyn Transport>) {
        self.state.transport = Some(transport);
        self.state.retry_timer = None;
        self.state.phase = Phase::Subscribing;
        self.ctx
            .status
            .normal(&self.config.url, format!("Connected to {}", self.config.url));

        let request = local_subscription(self.config.data_to_send, self.config.outward_period());
        debug!(url = %self.config.url, ?request, "Local subscription");
        let (tx, rx) = mpsc::unbounded_channel();
        match self.ctx.bus.subscribe(&request, &mut self.state.unsubscribes, tx) {
            Ok(()) => self.state.local_rx = Some(rx),
            Err(e) => error!(url = %self.config.url, "Local subscription failed: {}", e),
        }

        if let Some(position) = self.known_position() {
            self.send_remote_subscription(position).await;
        }

        if !self.state.authorized {
            self.request_access().await;
        }

        self.send_static().await;
        self.state.static_timer = Some(timer(self.config.static_period()));
        self.state.phase = Phase::Streaming;
    }

    /// Own position from the shared cache, else from the local bus.
    fn known_position(&self) -> Option<Position> {
        if let Some(position) = self.ctx.position.get() {
            return Some(position);
        }
        let position = self
            .ctx
            .bus
            .get_self_path("navigation.position")
            .and_then(|value| Position::from_value(&value))?;
        self.ctx.position.set(position);
        Some(position)
    }

    /// Release everything tied to the current connection.
    fn teardown(&mut self) -> Option<Box<dyn Transport>> {
        for unsubscribe in self.state.unsubscribes.drain(..) {
            unsubscribe();
        }
        self.state.local_rx = None;
        self.state.static_timer = None;
        self.state.subscribed_position = None;
        self.state.access_requested = false;
        self.state.transport.take()
    }

    /// The transport closed or failed: tear down and schedule a reconnect.
    pub fn handle_close(&mut self, reason: Option<TransportError>) {
        self.state.phase = Phase::Closing;
        match reason {
            Some(e) => self
                .ctx
                .status
                .error(&self.config.url, format!("connection error: {e}")),
            None => self.ctx.status.error(&self.config.url, "connection closed"),
        }

        self.teardown();
        self.state.phase = Phase::Idle;
        self.arm_retry();
    }

    /// Stop without reconnecting. Safe to call in any phase, any number of times.
    pub async fn stop(&mut self) {
        if let Some(mut transport) = self.teardown() {
            self.state.phase = Phase::Closing;
            transport.close().await;
        }
        self.state.retry_timer = None;
        self.state.phase = Phase::Idle;
    }

    /// Send a local change upstream.
    pub async fn forward_outward(&mut self, delta: Delta) {
        let Some(delta) = prepare_outbound(delta, &self.self_context) else {
            trace!(url = %self.config.url, "Not sending cloud-origin delta back");
            return;
        };

        if self.state.subscribed_position.is_none() {
            if let Some(position) = self_position(&delta, &self.self_context) {
                self.ctx.position.set(position);
                self.send_remote_subscription(position).await;
            }
        }

        if !self.state.authorized {
            return;
        }
        self.send_message(&delta).await;
    }

    /// Handle one message from the remote server.
    pub async fn handle_inbound(&mut self, text: &str) {
        let message = match decode_inbound(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(url = %self.config.url, "{}", RelayError::from(e));
                return;
            }
        };

        match message {
            InboundMessage::Access(response) => self.handle_access(response).await,
            InboundMessage::Delta(delta) => {
                if let Some(delta) = prepare_inbound(delta, &self.self_context) {
                    self.ctx.bus.handle_message(PLUGIN_ID, delta);
                }
            }
            InboundMessage::Other(value) => trace!(url = %self.config.url, %value, "Ignoring message"),
        }
    }

    async fn request_access(&mut self) {
        if self.state.access_requested {
            return;
        }
        let request = AccessRequestMessage::new(self.ctx.client_id.clone(), ACCESS_DESCRIPTION);
        self.state.access_requested = true;
        self.ctx
            .status
            .normal(&self.config.url, "no token configured, requesting access");
        self.send_message(&request).await;
    }

    async fn handle_access(&mut self, response: AccessResponse) {
        match response.outcome() {
            AccessOutcome::Granted(token) => {
                self.config.credential = Some(token.clone());
                self.state.authorized = true;
                self.persist_token(token).await;
                self.ctx.status.normal(&self.config.url, "access granted");
                self.send_static().await;
            }
            AccessOutcome::Denied(reason) => {
                let error = RelayError::AuthorizationDenied(reason);
                self.ctx.status.error(&self.config.url, error.to_string());
            }
            AccessOutcome::Pending => {
                self.ctx
                    .status
                    .normal(&self.config.url, "waiting for access request approval");
            }
        }
    }

    /// Write the token back to storage on the blocking pool.
    async fn persist_token(&mut self, token: String) {
        let ctx = self.ctx.clone();
        let url = self.config.url.clone();
        let saved = tokio::task::spawn_blocking(move || {
            let _guard = ctx
                .persist_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            persist_credential(ctx.storage.as_ref(), &url, &token)
        })
        .await;

        match saved {
            Ok(Ok(())) => debug!(url = %self.config.url, "Token saved"),
            Ok(Err(e)) => {
                warn!(url = %self.config.url, "Could not save token: {}", RelayError::from(e))
            }
            Err(e) => error!(url = %self.config.url, "Token save task failed: {}", e),
        }
    }

    /// Push the static snapshot, if we are allowed to send.
    pub async fn send_static(&mut self) {
        if !self.state.authorized || self.state.transport.is_none() {
            return;
        }
        let snapshot = static_snapshot(
            self.ctx.bus.as_ref(),
            &self.self_context,
            &self.ctx.server_name,
            &self.ctx.server_version,
        );
        trace!(url = %self.config.url, ?snapshot, "Sending static data");
        self.send_message(&snapshot).await;
    }

    async fn send_remote_subscription(&mut self, position: Position) {
        let Some(request) = remote_subscription(&self.config, position) else {
            return;
        };
        debug!(url = %self.config.url, ?request, "Remote subscription");
        if self.send_message(&request).await {
            self.state.subscribed_position = Some(position);
        }
    }

    async fn send_message<T: Serialize>(&mut self, message: &T) -> bool {
        match encode_message(message) {
            Ok(text) => self.send_text(text).await,
            Err(e) => {
                error!(url = %self.config.url, "Could not encode message: {}", e);
                false
            }
        }
    }

    /// Send and report. A failure is reported once; the next success
    /// reports recovery.
    async fn send_text(&mut self, text: String) -> bool {
        let Some(transport) = self.state.transport.as_mut() else {
            return false;
        };

        match transport.send(text).await {
            Ok(()) => {
                if self.state.had_send_error {
                    self.state.had_send_error = false;
                    self.ctx
                        .status
                        .normal(&self.config.url, format!("Connected to {}", self.config.url));
                }
                true
            }
            Err(e) => {
                if !self.state.had_send_error {
                    self.ctx.status.error(&self.config.url, format!("sending: {e}"));
                }
                self.state.had_send_error = true;
                false
            }
        }
    }

    /// Connect, unless cancelled first. Returns false when cancelled.
    async fn attempt(&mut self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.connect() => true,
        }
    }

    /// Drive the endpoint until `cancel` fires, then stop.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(url = %self.config.url, "Starting cloud endpoint");

        if self.attempt(&cancel).await {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Event::Cancelled,
                    _ = tick(&mut self.state.retry_timer) => Event::Retry,
                    _ = tick(&mut self.state.static_timer) => Event::Static,
                    delta = recv_local(&mut self.state.local_rx) => Event::Local(delta),
                    message = recv_remote(&mut self.state.transport) => Event::Remote(message),
                };

                match event {
                    Event::Cancelled => break,
                    Event::Retry => {
                        if !self.attempt(&cancel).await {
                            break;
                        }
                    }
                    Event::Static => self.send_static().await,
                    Event::Local(Some(delta)) => self.forward_outward(delta).await,
                    Event::Local(None) => self.state.local_rx = None,
                    Event::Remote(Some(Ok(text))) => self.handle_inbound(&text).await,
                    Event::Remote(Some(Err(e))) => self.handle_close(Some(e)),
                    Event::Remote(None) => self.handle_close(None),
                }
            }
        }

        self.stop().await;
        info!(url = %self.config.url, "Cloud endpoint stopped");
    }
}
