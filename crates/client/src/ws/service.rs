//! Room-scoped messaging client over a single STOMP connection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use roomchat_shared::{
    room_from_topic, room_send_destination, room_topic, Command, Frame, Message, MessageRequest,
    NewMessage, RoomId, HEADER_DESTINATION, HEADER_MESSAGE, HEADER_SUBSCRIPTION,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use super::connection::{ConnectError, ConnectionState, ConnectionStatus};
use super::registry::{decode_message, MessageHandler, SubscriptionRegistry};
use super::sockjs::SockJsConnector;
use super::transport::{Connector, Inbound, Link, TransportError, TungsteniteConnector};
use crate::config::{ClientConfig, TransportKind};

/// Client for the chat broker.
///
/// Owns one connection at a time, the room subscriptions made on it and the
/// retry state of the current connect cycle. Cheap to clone; clones share
/// the same connection.
#[derive(Clone)]
pub struct ChatSocket {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    shared: Mutex<Shared>,
    /// Only written while `shared` is locked.
    state: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct Shared {
    /// Bumped when a connect cycle starts and on disconnect; a cycle whose
    /// number is stale has been cancelled.
    cycle: u64,
    attempts: u32,
    next_connection_id: u64,
    connection: Option<LiveConnection>,
    registry: SubscriptionRegistry,
}

struct LiveConnection {
    id: u64,
    outbound: UnboundedSender<String>,
    reader: JoinHandle<()>,
}

impl ChatSocket {
    /// Client using the connector selected by `config.transport`.
    pub fn new(config: ClientConfig) -> Self {
        let connector: Arc<dyn Connector> = match config.transport {
            TransportKind::SockJs => Arc::new(SockJsConnector::new(TungsteniteConnector)),
            TransportKind::WebSocket => Arc::new(TungsteniteConnector),
        };
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                shared: Mutex::new(Shared::default()),
                state,
            }),
        }
    }

    /// Connect to the broker with a bearer credential.
    ///
    /// Resolves immediately when already connected. While another connect
    /// cycle is in flight, waits for its outcome instead of opening a second
    /// socket. Failed attempts are retried per the configured
    /// [`RetryPolicy`](crate::config::RetryPolicy).
    pub async fn connect(&self, credential: &str) -> Result<(), ConnectError> {
        let cycle = {
            let mut shared = self.inner.lock();
            let current = self.inner.state.borrow().clone();
            if current.is_connected() {
                crate::log_info!("Already connected, skipping re-connection");
                return Ok(());
            }
            if current.is_connecting() {
                None
            } else {
                shared.cycle += 1;
                shared.attempts = 0;
                self.inner.state.send_replace(ConnectionState::Connecting);
                Some(shared.cycle)
            }
        };

        match cycle {
            Some(cycle) => self.run_cycle(cycle, credential).await,
            None => self.join_cycle().await,
        }
    }

    /// Close the connection and drop every subscription. Cancels a connect
    /// cycle that is still in flight. No-op when there is nothing to close.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        let in_flight = self.inner.state.borrow().is_connecting();
        let connection = shared.connection.take();
        if connection.is_none() && !in_flight {
            return;
        }

        shared.cycle += 1;
        shared.attempts = 0;
        let dropped = shared.registry.clear();
        if let Some(conn) = connection {
            let _ = conn.outbound.unbounded_send(Frame::disconnect().encode());
            conn.reader.abort();
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
        crate::log_info!(
            "WebSocket disconnected ({} subscriptions dropped)",
            dropped
        );
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        let shared = self.inner.lock();
        ConnectionStatus {
            state: self.inner.state.borrow().clone(),
            attempts: shared.attempts,
            max_retries: self.inner.config.retry.max_retries,
        }
    }

    pub fn subscribed_rooms(&self) -> Vec<RoomId> {
        self.inner.lock().registry.rooms()
    }

    /// Subscribe to a room's topic. `handler` runs once per message, in
    /// arrival order, on the connection's reader task.
    ///
    /// Returns false when not connected. Subscribing again to the same room
    /// replaces the handler and keeps the existing broker subscription.
    pub fn subscribe_to_room<F>(&self, room_id: &str, handler: F) -> bool
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.subscribe_with(room_id, Arc::new(handler))
    }

    /// Subscribe to a room and receive its messages on a channel instead of
    /// a callback. `None` when not connected.
    pub fn room_messages(&self, room_id: &str) -> Option<UnboundedReceiver<Message>> {
        let (tx, rx) = unbounded();
        let subscribed = self.subscribe_to_room(room_id, move |message| {
            let _ = tx.unbounded_send(message);
        });
        subscribed.then_some(rx)
    }

    pub fn unsubscribe_from_room(&self, room_id: &str) {
        let mut shared = self.inner.lock();
        let Some(sub) = shared.registry.remove(room_id) else {
            return;
        };
        if let Some(conn) = shared.connection.as_ref() {
            if conn
                .outbound
                .unbounded_send(Frame::unsubscribe(&sub.id).encode())
                .is_err()
            {
                crate::log_warn!("Could not send UNSUBSCRIBE for room {}", room_id);
            }
        }
        crate::log_info!("Unsubscribed from room: {}", room_id);
    }

    /// Publish a message to a room.
    ///
    /// Returns true once the frame is handed to the transport; there is no
    /// delivery acknowledgement. Returns false when not connected.
    pub fn send_message(&self, room_id: &str, message: &NewMessage) -> bool {
        let shared = self.inner.lock();
        let Some(conn) = shared.connection.as_ref() else {
            crate::log_error!("Cannot send to room {}: WebSocket not connected", room_id);
            return false;
        };

        let body = match serde_json::to_string(&MessageRequest::new(room_id, message)) {
            Ok(body) => body,
            Err(e) => {
                crate::log_error!("Error encoding message for room {}: {}", room_id, e);
                return false;
            }
        };
        let frame = Frame::send_json(&room_send_destination(room_id), body);
        match conn.outbound.unbounded_send(frame.encode()) {
            Ok(()) => {
                crate::log_debug!("Message sent to room: {}", room_id);
                true
            }
            Err(e) => {
                crate::log_error!("Error sending message to room {}: {}", room_id, e);
                false
            }
        }
    }

    fn subscribe_with(&self, room_id: &str, handler: MessageHandler) -> bool {
        let mut guard = self.inner.lock();
        let Shared {
            connection,
            registry,
            ..
        } = &mut *guard;

        let Some(conn) = connection.as_ref() else {
            crate::log_error!("Cannot subscribe to room {}: WebSocket not connected", room_id);
            return false;
        };

        if registry.replace_handler(room_id, handler.clone()) {
            crate::log_info!("Replaced handler for room: {}", room_id);
            return true;
        }

        let id = registry.allocate_id();
        let frame = Frame::subscribe(&id, &room_topic(room_id));
        if let Err(e) = conn.outbound.unbounded_send(frame.encode()) {
            crate::log_error!("Error subscribing to room {}: {}", room_id, e);
            return false;
        }
        registry.insert(room_id, id, handler);
        crate::log_info!("Subscribed to room: {}", room_id);
        true
    }

    async fn run_cycle(&self, cycle: u64, credential: &str) -> Result<(), ConnectError> {
        let url = match self.inner.config.ws_endpoint(credential) {
            Ok(url) => url,
            Err(e) => {
                let err = ConnectError::from(e);
                self.inner.fail_cycle(cycle, err.to_string());
                return Err(err);
            }
        };

        let retry = self.inner.config.retry;
        if retry.max_retries == 0 {
            let last = "retry policy allows no attempts".to_string();
            self.inner.fail_cycle(cycle, last.clone());
            return Err(ConnectError::MaxRetriesExceeded { attempts: 0, last });
        }

        loop {
            let outcome = tokio::select! {
                outcome = self.attempt(&url, credential) => outcome,
                _ = self.inner.cancelled(cycle) => return Err(ConnectError::Cancelled),
            };

            let err = match outcome {
                Ok((link, pending)) => return self.install(cycle, link, pending),
                Err(err) => err,
            };

            let attempts = {
                let mut shared = self.inner.lock();
                if shared.cycle != cycle {
                    return Err(ConnectError::Cancelled);
                }
                shared.attempts += 1;
                shared.attempts
            };
            crate::log_error!(
                "WebSocket connection attempt {}/{} failed: {}",
                attempts,
                retry.max_retries,
                err
            );

            let Some(delay) = retry.delay_after(attempts) else {
                let last = err.to_string();
                self.inner.fail_cycle(
                    cycle,
                    format!("failed to connect after {attempts} attempts: {last}"),
                );
                return Err(ConnectError::MaxRetriesExceeded { attempts, last });
            };

            if !self
                .inner
                .set_cycle_state(cycle, ConnectionState::Reconnecting { attempt: attempts })
            {
                return Err(ConnectError::Cancelled);
            }
            crate::log_info!(
                "Retrying connection ({}/{}) in {}ms",
                attempts,
                retry.max_retries,
                delay.as_millis()
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.inner.cancelled(cycle) => return Err(ConnectError::Cancelled),
            }
        }
    }

    /// Wait for the cycle another caller started.
    async fn join_cycle(&self) -> Result<(), ConnectError> {
        let mut rx = self.inner.state.subscribe();
        let outcome = match rx.wait_for(|s| !s.is_connecting()).await {
            Ok(state) => state.clone(),
            Err(_) => ConnectionState::Disconnected,
        };
        match outcome {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Failed { reason } => Err(ConnectError::MaxRetriesExceeded {
                attempts: self.inner.config.retry.max_retries,
                last: reason,
            }),
            _ => Err(ConnectError::Cancelled),
        }
    }

    /// One connect attempt: open the socket and complete the STOMP handshake.
    /// Also returns any frames that arrived right behind `CONNECTED`.
    async fn attempt(&self, url: &Url, credential: &str) -> Result<(Link, Vec<Frame>), ConnectError> {
        crate::log_info!("Connecting to {}{}", url.origin().ascii_serialization(), url.path());
        let mut link = self.inner.connector.open(url).await?;

        let connect = Frame::connect(&self.inner.config.broker_host(), credential);
        link.outbound
            .unbounded_send(connect.encode())
            .map_err(|_| TransportError::Closed("writer stopped before CONNECT".to_string()))?;

        let timeout = self.inner.config.handshake_timeout;
        match tokio::time::timeout(timeout, await_connected(&mut link.inbound)).await {
            Ok(result) => result.map(|pending| (link, pending)),
            Err(_) => Err(TransportError::HandshakeTimeout(timeout).into()),
        }
    }

    /// Make `link` the live connection, unless the cycle was cancelled
    /// while the handshake completed.
    fn install(&self, cycle: u64, link: Link, pending: Vec<Frame>) -> Result<(), ConnectError> {
        let mut shared = self.inner.lock();
        if shared.cycle != cycle {
            return Err(ConnectError::Cancelled);
        }

        let id = shared.next_connection_id;
        shared.next_connection_id += 1;
        shared.attempts = 0;
        let reader = tokio::spawn(read_loop(
            Arc::downgrade(&self.inner),
            id,
            pending,
            link.inbound,
        ));
        shared.connection = Some(LiveConnection {
            id,
            outbound: link.outbound,
            reader,
        });
        self.inner.state.send_replace(ConnectionState::Connected);
        crate::log_info!("WebSocket connected successfully");
        Ok(())
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the state on behalf of `cycle`. False if the cycle is stale.
    fn set_cycle_state(&self, cycle: u64, state: ConnectionState) -> bool {
        let shared = self.lock();
        if shared.cycle != cycle {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn fail_cycle(&self, cycle: u64, reason: String) {
        self.set_cycle_state(cycle, ConnectionState::Failed { reason });
    }

    /// Resolves once `cycle` is no longer current.
    async fn cancelled(&self, cycle: u64) {
        let mut rx = self.state.subscribe();
        loop {
            let current = self.lock().cycle;
            if current != cycle {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Route one frame received on connection `connection_id`.
    /// Returns a reason when the frame ends the connection.
    fn dispatch(&self, connection_id: u64, frame: Frame) -> Option<String> {
        match frame.command {
            Command::Message => {
                self.deliver(connection_id, &frame);
                None
            }
            Command::Error => Some(format!(
                "broker error: {}",
                frame.header(HEADER_MESSAGE).unwrap_or(&frame.body)
            )),
            Command::Receipt | Command::Connected => None,
            other => {
                crate::log_warn!("Ignoring unexpected {} frame", other);
                None
            }
        }
    }

    fn deliver(&self, connection_id: u64, frame: &Frame) {
        let Some(subscription_id) = frame.header(HEADER_SUBSCRIPTION) else {
            crate::log_warn!("MESSAGE frame without subscription header");
            return;
        };

        let target = {
            let shared = self.lock();
            let live = shared
                .connection
                .as_ref()
                .is_some_and(|conn| conn.id == connection_id);
            let route = if live {
                shared.registry.route(subscription_id)
            } else {
                None
            };
            route
        };
        let Some((room_id, handler)) = target else {
            crate::log_debug!("No handler for subscription {}", subscription_id);
            return;
        };
        if let Some(destination) = frame.header(HEADER_DESTINATION) {
            if room_from_topic(destination) != Some(room_id.as_str()) {
                crate::log_warn!(
                    "Dropping message for {} delivered on room {}",
                    destination,
                    room_id
                );
                return;
            }
        }

        match decode_message(&room_id, &frame.body) {
            Ok(message) => {
                crate::log_debug!("Received message in room {} from {}", room_id, message.sender);
                handler(message);
            }
            Err(e) => crate::log_error!("Error parsing message for room {}: {}", room_id, e),
        }
    }

    /// The socket behind `connection_id` is gone.
    fn connection_lost(&self, connection_id: u64, reason: &str) {
        let mut shared = self.lock();
        let live = shared
            .connection
            .as_ref()
            .is_some_and(|conn| conn.id == connection_id);
        if !live {
            return;
        }
        shared.connection = None;
        shared.attempts = 0;
        let dropped = shared.registry.clear();
        self.state.send_replace(ConnectionState::Disconnected);
        crate::log_warn!(
            "WebSocket connection lost: {} ({} subscriptions dropped)",
            reason,
            dropped
        );
    }
}

/// Wait for `CONNECTED`. Heart-beats are skipped; anything else fails the
/// handshake. Frames that follow `CONNECTED` in the same chunk are returned.
async fn await_connected(inbound: &mut Inbound) -> Result<Vec<Frame>, ConnectError> {
    while let Some(chunk) = inbound.next().await {
        let text = chunk?;
        let mut frames = Frame::decode_each(&text);
        let Some(first) = frames.next() else {
            continue;
        };
        let frame = first.map_err(|e| ConnectError::Protocol(e.to_string()))?;
        return match frame.command {
            Command::Connected => Ok(frames
                .filter_map(|f| match f {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        crate::log_error!("Dropping undecodable frame: {}", e);
                        None
                    }
                })
                .collect()),
            Command::Error => Err(ConnectError::Protocol(
                frame
                    .header(HEADER_MESSAGE)
                    .map(str::to_string)
                    .unwrap_or(frame.body),
            )),
            other => Err(ConnectError::Protocol(format!(
                "unexpected {other} frame during handshake"
            ))),
        };
    }
    Err(TransportError::Closed("socket closed during handshake".to_string()).into())
}

async fn read_loop(
    inner: Weak<Inner>,
    connection_id: u64,
    pending: Vec<Frame>,
    mut inbound: Inbound,
) {
    let reason = 'read: {
        if let Some(live) = inner.upgrade() {
            for frame in pending {
                if let Some(reason) = live.dispatch(connection_id, frame) {
                    break 'read reason;
                }
            }
        }

        loop {
            let Some(chunk) = inbound.next().await else {
                break 'read "socket closed".to_string();
            };
            let Some(live) = inner.upgrade() else {
                return;
            };
            let text = match chunk {
                Ok(text) => text,
                Err(e) => break 'read e.to_string(),
            };
            for frame in Frame::decode_each(&text) {
                match frame {
                    Ok(frame) => {
                        if let Some(reason) = live.dispatch(connection_id, frame) {
                            break 'read reason;
                        }
                    }
                    Err(e) => crate::log_error!("Dropping undecodable frame: {}", e),
                }
            }
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.connection_lost(connection_id, &reason);
    }
}
