use std::io;

use thiserror::Error;
use url::Url;

use crate::fetch::FetchError;

pub type Result<T, E = NotificationError> = core::result::Result<T, E>;

/// Everything that can go wrong between discovery and a live channel.
///
/// None of these are retried; a conformance run wants the first outcome the
/// server produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotificationError {
    #[error("discovery request to {url} failed")]
    Discovery {
        url: Url,
        #[source]
        source: FetchError,
    },

    #[error("failed to fetch channel description {url}")]
    DescriptionFetch {
        url: Url,
        #[source]
        source: FetchError,
    },

    #[error("channel description {url} answered with status {status}")]
    DescriptionStatus { url: Url, status: u16 },

    #[error("channel description {url} is not valid JSON")]
    DescriptionParse {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    #[error("channel description {url} has no `notificationChannel` array")]
    MissingChannels { url: Url },

    #[error("failed to encode subscription request")]
    Encode(#[source] serde_json::Error),

    #[error("subscription request to {url} failed")]
    SubscriptionRequest {
        url: Url,
        #[source]
        source: FetchError,
    },

    #[error("subscription request to {url} was rejected with status {status}: {body}")]
    SubscriptionRejected { url: Url, status: u16, body: String },

    #[error("subscription server {url} accepted the request but {reason}")]
    SubscriptionContract { url: Url, reason: String },

    #[error("websocket connection to {url} failed")]
    WebSocket {
        url: Url,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("{url} is not an http(s) or ws(s) address")]
    UnsupportedScheme { url: Url },

    #[error("webhook listener on port {port} failed")]
    Listener {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("webhook port {port} is configured without TLS material")]
    MissingTlsMaterial { port: u16 },

    #[error("invalid TLS material")]
    Tls(#[source] io::Error),

    #[error("no insecure socket is open")]
    NotConnected,
}
