//! WebSocket transport built on `tokio-tungstenite`

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::{Connector, Fragment, Received, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a hub's WebSocket RPC endpoint
///
/// # Example
///
/// ```rust,ignore
/// let connector = WebSocketConnector::new("ws://192.168.1.20:9090/jsonrpc")?;
/// let transport = connector.connect().await?;
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    /// Create a connector for a `ws://` or `wss://` endpoint
    pub fn new(endpoint: &str) -> Result<Self, TransportError> {
        let url = Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: format!("unsupported scheme `{}`", other),
            }),
        }
    }

    /// The endpoint this connector dials
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::Connect {
                    endpoint: self.url.to_string(),
                    reason: e.to_string(),
                })?;

        tracing::debug!("WebSocket connected to {}", self.url);

        let (sink, stream) = stream.split();
        Ok(Box::new(WebSocketTransport {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }))
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

/// A connected WebSocket
///
/// The write and read halves are locked independently so requests can be
/// written while the read loop is parked in `receive`.
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        // JSON envelopes go out as text frames; anything else as binary
        let message = match std::str::from_utf8(&payload) {
            Ok(text) => Message::Text(text.to_owned()),
            Err(_) => Message::Binary(payload.to_vec()),
        };

        self.sink
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn receive(&self) -> Result<Received, TransportError> {
        let mut stream = self.stream.lock().await;

        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Received::Fragment(Fragment::complete(text.into_bytes())));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Received::Fragment(Fragment::complete(data)));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("WebSocket close frame received: {:?}", frame);
                    return Ok(Received::Closed);
                }
                // Control frames are answered by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                None => return Ok(Received::Closed),
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        // The peer may already be gone; closing is best effort
        let _ = sink.send(Message::Close(None)).await;
        sink.close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
