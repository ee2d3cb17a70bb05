//! WebSocket client transport.
//!
//! Each `open` performs the client handshake with `tokio-tungstenite` and
//! spawns a pump task that moves frames between the socket and the session
//! channels. Binary frames are logged and dropped; ping and pong frames are
//! ignored.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::Result;
use crate::identifiers::Endpoint;

use super::{Outgoing, Transport, TransportEvent, TransportSession};

// ============================================================================
// Constants
// ============================================================================

/// Reported when the peer closes without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

// ============================================================================
// Types
// ============================================================================

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Live transport over `ws://` (and `wss://` with the `native-tls` feature).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates the transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &Endpoint, url: &Url) -> Result<TransportSession> {
        let (stream, response) = connect_async(url.as_str()).await?;
        debug!(endpoint = %endpoint, status = %response.status(), "WebSocket handshake complete");

        let (session, events, outgoing) = TransportSession::pair();
        tokio::spawn(pump(endpoint.clone(), stream, events, outgoing));
        Ok(session)
    }
}

/// Moves frames between the socket and the session until either side ends.
async fn pump(
    endpoint: Endpoint,
    stream: ClientStream,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) {
    let (mut ws_write, mut ws_read) = stream.split();

    loop {
        tokio::select! {
            message = ws_read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    if events.send(TransportEvent::Text(text.as_str().to_owned())).is_err() {
                        break;
                    }
                }

                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = frame.map_or((CLOSE_NO_STATUS, String::new()), |frame| {
                        (u16::from(frame.code), frame.reason.as_str().to_owned())
                    });
                    debug!(endpoint = %endpoint, code, "WebSocket closed by remote");
                    let _ = events.send(TransportEvent::Closed { code, reason });
                    let _ = ws_write.close().await;
                    break;
                }

                Some(Err(e)) => {
                    warn!(endpoint = %endpoint, error = %e, "WebSocket error");
                    let _ = events.send(TransportEvent::Failed(e.to_string()));
                    break;
                }

                None => {
                    debug!(endpoint = %endpoint, "WebSocket stream ended");
                    break;
                }

                Some(Ok(WsMessage::Binary(data))) => {
                    debug!(endpoint = %endpoint, len = data.len(), "Dropping binary frame");
                }

                // Ping, Pong, raw frames
                Some(Ok(_)) => {}
            },

            frame = outgoing.recv() => match frame {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = ws_write.send(WsMessage::Text(text.into())).await {
                        warn!(endpoint = %endpoint, error = %e, "Failed to send frame");
                        let _ = events.send(TransportEvent::Failed(e.to_string()));
                        break;
                    }
                    trace!(endpoint = %endpoint, "Frame sent");
                }

                Some(Outgoing::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    let _ = ws_write.send(WsMessage::Close(Some(frame))).await;
                    let _ = ws_write.close().await;
                    break;
                }

                None => {
                    let _ = ws_write.close().await;
                    break;
                }
            },
        }
    }

    debug!(endpoint = %endpoint, "WebSocket pump terminated");
}

// ============================================================================
// Tests
// ============================================================================
