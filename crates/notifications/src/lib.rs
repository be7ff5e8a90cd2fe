//! Notification discovery and subscription client
//!
//! Given a resource on a storage server under test, this crate finds out which
//! notification mechanisms the resource advertises, subscribes to each of them
//! and records every delivered event so that conformance tests can assert on
//! what the server sent.
//!
//! ## Flow
//!
//! 1. [`discovery`] issues one `HEAD` against the resource and reads the
//!    `Updates-Via` and `Link` headers.
//! 2. [`description`] fetches each advertised description document once and
//!    returns its channel declarations.
//! 3. [`channel`] negotiates a live channel per declaration: the legacy
//!    pub/sub socket, a subscribed WebSocket or a webhook listener.
//! 4. [`client::NotificationsClient`] ties the steps together and owns
//!    teardown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use conformance_notifications::{HttpFetcher, NotificationConfig, NotificationsClient};
//!
//! # async fn run() -> conformance_notifications::Result<()> {
//! let fetcher = Arc::new(HttpFetcher::new(reqwest::Client::new()));
//! let resource = "https://localhost:8443/foo/bar.txt".parse().expect("valid url");
//!
//! let mut client = NotificationsClient::new(resource, fetcher, NotificationConfig::default());
//! client.get_ready().await?;
//!
//! // ... mutate the resource ...
//!
//! println!("{:?}", client.received_insecure().snapshot());
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod description;
pub mod discovery;
pub mod errors;
pub mod fetch;
pub mod link;

pub use channel::{ChannelKind, Received, ReceiveLog, SentLog};
pub use client::{ClientState, NotificationsClient};
pub use config::{NotificationConfig, TlsMaterial};
pub use description::{ChannelDeclaration, ChannelDescription, ChannelType};
pub use discovery::DiscoveryLinks;
pub use errors::{NotificationError, Result};
pub use fetch::{Fetch, FetchError, FetchRequest, FetchResponse, HttpFetcher};
pub use url::Url;

/// WebSocket subprotocol spoken by both socket transports.
pub const PROTOCOL: &str = "solid-0.1";

/// JSON-LD context of notification documents and subscription requests.
pub const NOTIFICATION_CONTEXT: &str = "https://www.w3.org/ns/solid/notification/v1";
