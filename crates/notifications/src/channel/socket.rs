use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use super::{ReceiveLog, Received};
use crate::errors::{NotificationError, Result};
use crate::PROTOCOL;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open WebSocket whose inbound frames are pumped into a [`ReceiveLog`].
pub(crate) struct Socket {
    url: Url,
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

impl core::fmt::Debug for Socket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Socket").field("url", &self.url).finish_non_exhaustive()
    }
}

impl Socket {
    /// Connects using the notification subprotocol. The reader is running
    /// before this returns, so frames sent in reply to anything we send next
    /// are already captured.
    pub(crate) async fn open(url: &Url, log: ReceiveLog) -> Result<Self> {
        let ws_error = |source| NotificationError::WebSocket {
            url: url.clone(),
            source: Box::new(source),
        };

        let mut request = url.as_str().into_client_request().map_err(ws_error)?;
        let _ = request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(PROTOCOL));

        let (stream, _response) = connect_async(request).await.map_err(ws_error)?;
        let (sink, stream) = stream.split();

        debug!(%url, "WebSocket open");

        let reader = tokio::spawn(pump(url.clone(), stream, log));

        Ok(Self {
            url: url.clone(),
            sink,
            reader,
        })
    }

    pub(crate) async fn send(&mut self, frame: &str) -> Result<()> {
        debug!(url = %self.url, frame, "WS >");

        self.sink
            .send(Message::Text(frame.to_owned()))
            .await
            .map_err(|source| NotificationError::WebSocket {
                url: self.url.clone(),
                source: Box::new(source),
            })
    }

    /// Drops the connection without a closing handshake.
    pub(crate) fn terminate(self) {
        debug!(url = %self.url, "Terminating WebSocket");
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn pump(url: Url, mut stream: SplitStream<WsStream>, log: ReceiveLog) {
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                warn!(%url, %err, "Failed to read from WebSocket");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                debug!(%url, frame = %text, "WS <");
                log.push(Received::Text(text));
            }
            Message::Binary(bytes) => {
                debug!(%url, len = bytes.len(), "WS < binary");
                log.push(Received::Binary(bytes.into()));
            }
            Message::Close(_) => {
                debug!(%url, "Received close message");
                break;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
}

/// Maps `http`/`https` onto `ws`/`wss`, leaving socket schemes untouched.
pub(crate) fn to_socket_url(url: &Url) -> Option<Url> {
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        "ws" | "wss" => return Some(url.clone()),
        _ => return None,
    };

    let mut url = url.clone();
    url.set_scheme(scheme).ok()?;
    Some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_family_maps_to_socket_family() {
        let cases = [
            ("http://pod.example/ws", Some("ws://pod.example/ws")),
            ("https://pod.example:8443/a?b=c", Some("wss://pod.example:8443/a?b=c")),
            ("wss://pod.example/", Some("wss://pod.example/")),
            ("ftp://pod.example/", None),
        ];

        for (input, expected) in cases {
            let url: Url = input.parse().unwrap();
            assert_eq!(
                to_socket_url(&url).as_ref().map(Url::as_str),
                expected,
                "{input}"
            );
        }
    }
}
