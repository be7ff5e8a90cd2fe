//! Live notification channels and the logs they append to.
//!
//! Every channel owns a [`ReceiveLog`]. Entries are appended in arrival order
//! from the moment the transport is open, so nothing sent during the
//! handshake is lost.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use url::Url;

use crate::description::ChannelType;
use crate::errors::{NotificationError, Result};
use crate::fetch::{Fetch, FetchRequest, FetchResponse};
use crate::NOTIFICATION_CONTEXT;

pub mod insecure;
pub mod secure;
mod socket;
pub mod webhook;

pub use insecure::InsecureChannel;
pub use secure::SecureChannel;
pub use webhook::WebhookChannel;

const EVENT_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Insecure,
    Secure,
    Webhook,
}

/// One delivered notification, exactly as it arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Received {
    Text(String),
    Binary(Bytes),
}

impl Received {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }
}

impl From<Bytes> for Received {
    fn from(bytes: Bytes) -> Self {
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Self::Text(text),
            Err(_) => Self::Binary(bytes),
        }
    }
}

impl Serialize for Received {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Binary(bytes) => serializer.serialize_bytes(bytes),
        }
    }
}

#[derive(Debug)]
struct LogInner {
    entries: Mutex<Vec<Received>>,
    len: watch::Sender<usize>,
    events: broadcast::Sender<Received>,
}

/// Append-only, arrival-ordered record of what a channel received.
///
/// Cloning yields another handle onto the same log.
#[derive(Clone, Debug)]
pub struct ReceiveLog {
    inner: Arc<LogInner>,
}

impl Default for ReceiveLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveLog {
    #[must_use]
    pub fn new() -> Self {
        let (len, _) = watch::channel(0);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(LogInner {
                entries: Mutex::new(Vec::new()),
                len,
                events,
            }),
        }
    }

    pub(crate) fn push(&self, entry: Received) {
        let len = {
            let mut entries = self.inner.entries.lock();
            entries.push(entry.clone());
            entries.len()
        };

        let _ = self.inner.len.send_replace(len);
        // no listeners is fine
        let _ = self.inner.events.send(entry);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Received> {
        self.inner.entries.lock().clone()
    }

    /// Text entries only, in arrival order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.inner
            .entries
            .lock()
            .iter()
            .filter_map(Received::as_text)
            .map(ToOwned::to_owned)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a listener for entries appended from now on. Dropping the
    /// receiver cancels the registration.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Received> {
        self.inner.events.subscribe()
    }

    /// Resolves once the log holds at least `len` entries. Callers wanting a
    /// deadline wrap this in `tokio::time::timeout`.
    pub async fn wait_for_len(&self, len: usize) {
        let mut receiver = self.inner.len.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = receiver.wait_for(|current| *current >= len).await;
    }
}

/// Outbound frames, in the order they were sent.
#[derive(Clone, Debug, Default)]
pub struct SentLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl SentLog {
    pub(crate) fn push(&self, frame: impl Into<String>) {
        self.entries.lock().push(frame.into());
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns a discovered endpoint into a live, receiving channel.
///
/// All three transports share this shape so the client can dispatch
/// declarations without caring which one it is talking to.
#[async_trait]
pub trait Negotiator: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Performs the subscription handshake for `topic` against `endpoint`.
    /// Once this resolves the channel appends to [`received`](Self::received)
    /// until closed.
    async fn setup(&self, endpoint: &Url, topic: &Url) -> Result<()>;

    fn received(&self) -> &ReceiveLog;

    /// Releases every transport resource. Safe to call repeatedly.
    async fn close(&self);
}

/// Body of a subscription `POST`.
#[derive(Debug, Serialize)]
pub(crate) struct SubscriptionRequest<'a> {
    #[serde(rename = "@context")]
    context: [&'a str; 1],
    #[serde(rename = "type")]
    channel_type: &'a str,
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a str>,
}

impl<'a> SubscriptionRequest<'a> {
    pub(crate) fn new(channel_type: ChannelType, topic: &'a Url, target: Option<&'a Url>) -> Self {
        Self {
            context: [NOTIFICATION_CONTEXT],
            channel_type: channel_type.as_str(),
            topic: topic.as_str(),
            target: target.map(Url::as_str),
        }
    }

    /// Posts the request to `endpoint`. Anything but a 2xx is a rejection.
    pub(crate) async fn send(&self, fetcher: &dyn Fetch, endpoint: &Url) -> Result<FetchResponse> {
        let request =
            FetchRequest::post_json(endpoint.clone(), self).map_err(NotificationError::Encode)?;

        let response = fetcher.fetch(request).await.map_err(|source| {
            NotificationError::SubscriptionRequest {
                url: endpoint.clone(),
                source,
            }
        })?;

        if !response.status.is_success() {
            return Err(NotificationError::SubscriptionRejected {
                url: endpoint.clone(),
                status: response.status.as_u16(),
                body: response.text().into_owned(),
            });
        }

        Ok(response)
    }
}
