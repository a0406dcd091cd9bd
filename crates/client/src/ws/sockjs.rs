//! SockJS WebSocket transport.
//!
//! Brokers that expose their STOMP endpoint through SockJS only accept a raw
//! upgrade at `<endpoint>/<server>/<session>/websocket`, and wrap every
//! payload in SockJS framing:
//!
//! - `o` open, `h` heart-beat
//! - `a["..", ".."]` one or more messages
//! - `c[code,"reason"]` close
//!
//! Client messages go out as a JSON array of strings.

use async_trait::async_trait;
use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;
use url::Url;
use uuid::Uuid;

use super::transport::{Connector, Link, TransportError, TungsteniteConnector};

/// One decoded SockJS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SockJsError {
    #[error("empty SockJS frame")]
    Empty,
    #[error("unknown SockJS frame type {0:?}")]
    UnknownType(char),
    #[error("invalid SockJS payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SockJsFrame {
    pub fn parse(text: &str) -> Result<Self, SockJsError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(SockJsError::Empty)?;
        let payload = chars.as_str();
        match kind {
            'o' => Ok(SockJsFrame::Open),
            'h' => Ok(SockJsFrame::Heartbeat),
            'a' => Ok(SockJsFrame::Messages(serde_json::from_str(payload)?)),
            'c' => {
                let (code, reason): (u16, String) = serde_json::from_str(payload)?;
                Ok(SockJsFrame::Close { code, reason })
            }
            other => Err(SockJsError::UnknownType(other)),
        }
    }
}

/// Encode client messages for the SockJS socket.
pub fn encode_messages(messages: &[&str]) -> String {
    // serializing a slice of strings cannot fail
    serde_json::to_string(messages).unwrap_or_else(|_| "[]".to_string())
}

/// Raw WebSocket URL for a SockJS endpoint. The query string is kept.
pub fn session_url(endpoint: &Url, server_id: u16, session_id: &str) -> Url {
    let mut url = endpoint.clone();
    let base = endpoint.path().trim_end_matches('/');
    url.set_path(&format!("{base}/{server_id:03}/{session_id}/websocket"));
    url
}

/// Connector speaking SockJS over an inner socket connector.
#[derive(Debug, Clone, Default)]
pub struct SockJsConnector<C = TungsteniteConnector> {
    inner: C,
}

impl<C: Connector> SockJsConnector<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: Connector> Connector for SockJsConnector<C> {
    async fn open(&self, url: &Url) -> Result<Link, TransportError> {
        let session = Uuid::new_v4();
        let server_id = (session.as_u128() % 1000) as u16;
        let session_id = session.simple().to_string();
        let url = session_url(url, server_id, &session_id);

        let Link {
            outbound: raw_out,
            inbound: mut raw_in,
        } = self.inner.open(&url).await?;

        let (outbound, mut outbound_rx) = unbounded::<String>();
        let (inbound_tx, inbound) = unbounded::<Result<String, TransportError>>();

        // Unwrap SockJS frames into STOMP text
        tokio::spawn(async move {
            while let Some(item) = raw_in.next().await {
                let text = match item {
                    Ok(text) => text,
                    Err(e) => {
                        let _ = inbound_tx.unbounded_send(Err(e));
                        return;
                    }
                };
                match SockJsFrame::parse(&text) {
                    Ok(SockJsFrame::Open) => crate::log_debug!("SockJS session {} open", session_id),
                    Ok(SockJsFrame::Heartbeat) => {}
                    Ok(SockJsFrame::Messages(messages)) => {
                        for message in messages {
                            if inbound_tx.unbounded_send(Ok(message)).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(SockJsFrame::Close { code, reason }) => {
                        let _ = inbound_tx
                            .unbounded_send(Err(TransportError::Closed(format!("{code} {reason}"))));
                        return;
                    }
                    Err(e) => crate::log_warn!("Ignoring SockJS frame: {}", e),
                }
            }
        });

        // Wrap outgoing STOMP text
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.next().await {
                if raw_out.unbounded_send(encode_messages(&[&text])).is_err() {
                    break;
                }
            }
        });

        Ok(Link { outbound, inbound })
    }
}
