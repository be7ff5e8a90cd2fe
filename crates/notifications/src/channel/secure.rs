//! `WebSocketSubscription2021`: subscribe over HTTP, then listen on the
//! socket the server hands back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;
use url::Url;

use super::socket::{to_socket_url, Socket};
use super::{ChannelKind, Negotiator, ReceiveLog, SentLog, SubscriptionRequest};
use crate::description::ChannelType;
use crate::errors::{NotificationError, Result};
use crate::fetch::{Fetch, FetchResponse};

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    source: Option<serde_json::Value>,
}

pub struct SecureChannel {
    fetcher: Arc<dyn Fetch>,
    received: ReceiveLog,
    sent: SentLog,
    sockets: Mutex<Vec<Socket>>,
}

impl core::fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("received", &self.received)
            .field("sent", &self.sent)
            .finish_non_exhaustive()
    }
}

impl SecureChannel {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            received: ReceiveLog::new(),
            sent: SentLog::default(),
            sockets: Mutex::new(Vec::new()),
        }
    }

    /// Always empty: once open, this transport needs no further frames.
    #[must_use]
    pub const fn sent(&self) -> &SentLog {
        &self.sent
    }

    pub async fn open_sockets(&self) -> usize {
        self.sockets.lock().await.len()
    }
}

#[async_trait]
impl Negotiator for SecureChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Secure
    }

    async fn setup(&self, endpoint: &Url, topic: &Url) -> Result<()> {
        let response = SubscriptionRequest::new(ChannelType::WebSocketSubscription2021, topic, None)
            .send(&*self.fetcher, endpoint)
            .await?;

        let source = socket_source(endpoint, &response)?;
        let socket = Socket::open(&source, self.received.clone()).await?;

        info!(%source, %topic, "Secure WebSocket channel open");
        self.sockets.lock().await.push(socket);

        Ok(())
    }

    fn received(&self) -> &ReceiveLog {
        &self.received
    }

    async fn close(&self) {
        for socket in self.sockets.lock().await.drain(..) {
            socket.terminate();
        }
    }
}

/// Reads `source` from an accepted subscription and maps it onto the socket
/// scheme. The server must hand back an absolute `http`/`https` URL.
fn socket_source(endpoint: &Url, response: &FetchResponse) -> Result<Url> {
    let violation = |reason: String| NotificationError::SubscriptionContract {
        url: endpoint.clone(),
        reason,
    };

    let body: SubscriptionResponse = response
        .json()
        .map_err(|err| violation(format!("its response is not a JSON object: {err}")))?;

    let source = match body.source {
        Some(serde_json::Value::String(source)) => source,
        Some(other) => return Err(violation(format!("its `source` is not a string: {other}"))),
        None => return Err(violation("its response has no `source` field".to_owned())),
    };

    let url = Url::parse(&source)
        .map_err(|err| violation(format!("its `source` {source:?} is not an absolute URL: {err}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(violation(format!(
            "its `source` {source:?} does not use http or https"
        )));
    }

    to_socket_url(&url).ok_or_else(|| {
        violation(format!(
            "its `source` {source:?} cannot be mapped to a socket address"
        ))
    })
}
