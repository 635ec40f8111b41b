//! Stream transport to a cloud server.
//!
//! The connection logic only sees the `Connector`/`Transport` traits so
//! it can be driven without a network. `WsConnector` is the WebSocket
//! implementation used in production.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use signalk_protocol::binary_frame_text;

use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens stream connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open `url`, presenting `credential` during the handshake when given.
    async fn connect(
        &self,
        url: &Url,
        credential: Option<&str>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// An open text-message stream.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Next text message; None once the peer has closed the stream.
    ///
    /// Must be cancel safe: dropping the future loses no message.
    async fn next_message(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

/// Credential header value. Cloud servers expect the `JWT` scheme.
fn authorization(credential: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(&format!("JWT {credential}"))
        .map_err(|e| TransportError::InvalidCredential(e.to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        url: &Url,
        credential: Option<&str>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut request = url.as_str().into_client_request()?;
        if let Some(credential) = credential {
            request
                .headers_mut()
                .insert(AUTHORIZATION, authorization(credential)?);
        }

        let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| TransportError::ConnectTimeout(url.to_string()))??;
        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => match binary_frame_text(data) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => trace!("Skipping frame: {}", e),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Peer closed stream");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            trace!("Error closing stream: {}", e);
        }
    }
}
