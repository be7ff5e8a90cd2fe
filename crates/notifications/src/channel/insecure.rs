//! Legacy pub/sub socket advertised through `Updates-Via`.
//!
//! The handshake is a single `sub <resource>` frame; the server answers with
//! `ack <resource>` and later `pub <resource>` on every change. Identity rides
//! on the session the socket was opened in, so no auth frames are sent.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;
use url::Url;

use super::socket::{to_socket_url, Socket};
use super::{ChannelKind, Negotiator, ReceiveLog, SentLog};
use crate::errors::{NotificationError, Result};

#[derive(Debug, Default)]
pub struct InsecureChannel {
    received: ReceiveLog,
    sent: SentLog,
    socket: Mutex<Option<Socket>>,
}

impl InsecureChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn sent(&self) -> &SentLog {
        &self.sent
    }

    pub async fn is_open(&self) -> bool {
        self.socket.lock().await.is_some()
    }

    /// Sends a raw frame over the open socket, recording it first.
    pub async fn send(&self, frame: &str) -> Result<()> {
        let mut socket = self.socket.lock().await;
        let socket = socket.as_mut().ok_or(NotificationError::NotConnected)?;

        self.sent.push(frame);
        socket.send(frame).await
    }
}

#[async_trait]
impl Negotiator for InsecureChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Insecure
    }

    async fn setup(&self, endpoint: &Url, topic: &Url) -> Result<()> {
        let url = to_socket_url(endpoint).ok_or_else(|| NotificationError::UnsupportedScheme {
            url: endpoint.clone(),
        })?;

        let mut socket = Socket::open(&url, self.received.clone()).await?;

        let frame = format!("sub {topic}");
        self.sent.push(frame.as_str());
        socket.send(&frame).await?;

        info!(%url, %topic, "Insecure pub/sub channel subscribed");

        if let Some(previous) = self.socket.lock().await.replace(socket) {
            previous.terminate();
        }

        Ok(())
    }

    fn received(&self) -> &ReceiveLog {
        &self.received
    }

    async fn close(&self) {
        if let Some(socket) = self.socket.lock().await.take() {
            socket.terminate();
        }
    }
}
