//! In-memory broker for exercising [`ChatSocket`](super::ChatSocket).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use roomchat_shared::{room_topic, Command, Frame, HEADER_DESTINATION, HEADER_SUBSCRIPTION};
use tokio::time::Instant;
use url::Url;

use super::transport::{Connector, Link, TransportError};

/// How the next `open` behaves.
#[derive(Debug, Clone)]
pub enum Script {
    /// Open and answer `CONNECT` with `CONNECTED`.
    Accept,
    /// Fail to open the socket.
    Refuse,
    /// Open, then answer `CONNECT` with an `ERROR` frame.
    Reject(String),
    /// Open and never answer.
    Silent,
}

/// Broker side of one opened socket.
#[derive(Clone)]
pub struct Peer {
    sent: Arc<Mutex<UnboundedReceiver<String>>>,
    push: UnboundedSender<Result<String, TransportError>>,
}

impl Peer {
    /// Frames the client has written since the last call.
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent_raw()
            .iter()
            .flat_map(|text| Frame::decode_all(text).unwrap())
            .collect()
    }

    /// Text the client has written since the last call, as sent.
    pub fn sent_raw(&self) -> Vec<String> {
        let mut sent = self.sent.lock().unwrap();
        let mut texts = Vec::new();
        while let Ok(Some(text)) = sent.try_next() {
            texts.push(text);
        }
        texts
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.push.unbounded_send(Ok(text.to_string()));
    }

    /// Deliver a `MESSAGE` frame published on `room`'s topic.
    pub fn push_message(&self, room: &str, subscription: &str, body: &str) {
        self.push_raw(&message_frame(room, subscription, body));
    }

    /// Fail the socket as a transport error would.
    pub fn fail(&self, error: TransportError) {
        let _ = self.push.unbounded_send(Err(error));
    }
}

/// Encoded `MESSAGE` frame as the broker sends it.
pub fn message_frame(room: &str, subscription: &str, body: &str) -> String {
    Frame::new(Command::Message)
        .with_header(HEADER_DESTINATION, room_topic(room))
        .with_header(HEADER_SUBSCRIPTION, subscription)
        .with_header("message-id", format!("{subscription}-{}", body.len()))
        .with_header("content-type", "application/json")
        .with_body(body)
        .encode()
}

#[derive(Default)]
struct State {
    script: VecDeque<Script>,
    peers: Vec<Peer>,
    opens: Vec<(Url, Instant)>,
}

/// Connector that serves scripted sockets. Unscripted opens are accepted.
#[derive(Default)]
pub struct MockConnector {
    state: Mutex<State>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: impl IntoIterator<Item = Script>) -> Arc<Self> {
        let connector = Self::default();
        connector.state.lock().unwrap().script = script.into_iter().collect();
        Arc::new(connector)
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().opens.iter().map(|(_, at)| *at).collect()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .opens
            .iter()
            .map(|(url, _)| url.to_string())
            .collect()
    }

    /// Broker side of the most recently opened socket.
    pub fn last_peer(&self) -> Peer {
        self.state.lock().unwrap().peers.last().cloned().expect("no socket opened")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &Url) -> Result<Link, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.opens.push((url.clone(), Instant::now()));
        let script = state.script.pop_front().unwrap_or(Script::Accept);

        if let Script::Refuse = script {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (outbound, sent) = unbounded();
        let (push, inbound) = unbounded();
        let peer = Peer {
            sent: Arc::new(Mutex::new(sent)),
            push,
        };
        match script {
            Script::Accept => peer.push_raw("CONNECTED\nversion:1.2\nheart-beat:0,0\n\n\0"),
            Script::Reject(reason) => {
                peer.push_raw(&format!("ERROR\nmessage:{reason}\n\n\0"));
            }
            Script::Silent | Script::Refuse => {}
        }
        state.peers.push(peer);
        Ok(Link { outbound, inbound })
    }
}
