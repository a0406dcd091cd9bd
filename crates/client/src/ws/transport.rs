//! Socket transport behind the broker client.
//!
//! A [`Connector`] opens a socket and hands back a [`Link`]: an outbound
//! channel of encoded frames and an inbound channel of received text.
//! The production connector pumps a tokio-tungstenite socket through those
//! channels; tests substitute an in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("could not open socket: {0}")]
    Connect(String),
    #[error("socket closed: {0}")]
    Closed(String),
    #[error("socket error: {0}")]
    Io(String),
    #[error("no CONNECTED frame within {0:?}")]
    HandshakeTimeout(Duration),
}

pub type Inbound = UnboundedReceiver<Result<String, TransportError>>;

/// An open socket, as a pair of channels.
///
/// Dropping `outbound` closes the socket. `inbound` ends when the socket
/// does; a transport failure is delivered as its last item.
pub struct Link {
    pub outbound: UnboundedSender<String>,
    pub inbound: Inbound,
}

/// Opens sockets to the broker endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> Result<Link, TransportError>;
}

/// WebSocket connector using tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn open(&self, url: &Url) -> Result<Link, TransportError> {
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = unbounded::<String>();
        let (inbound_tx, inbound) = unbounded::<Result<String, TransportError>>();
        let host = url.host_str().unwrap_or_default().to_string();

        // Read pump
        let host_for_read = host.clone();
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                let item = match msg_result {
                    Ok(WsMessage::Text(text)) => Ok(text.as_str().to_owned()),
                    Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => Ok(text),
                        Err(_) => {
                            crate::log_warn!("Ignoring non-UTF-8 binary frame from {}", host_for_read);
                            continue;
                        }
                    },
                    Ok(WsMessage::Close(frame)) => {
                        let reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                            .unwrap_or_else(|| "close frame".to_string());
                        crate::log_info!("WebSocket to {} received close frame", host_for_read);
                        let _ = inbound_tx.unbounded_send(Err(TransportError::Closed(reason)));
                        break;
                    }
                    // Pings are answered by tungstenite
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.unbounded_send(Err(TransportError::Io(e.to_string())));
                        break;
                    }
                };
                if inbound_tx.unbounded_send(item).is_err() {
                    break;
                }
            }
            crate::log_debug!("Read pump for {} stopped", host_for_read);
        });

        // Write pump
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.next().await {
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    crate::log_error!("Send to {} failed: {}", host, e);
                    break;
                }
            }
            let _ = write.close().await;
            crate::log_debug!("Write pump for {} stopped", host);
        });

        Ok(Link { outbound, inbound })
    }
}
