//! The notifications facade.
//!
//! A [`NotificationsClient`] is bound to one resource. `get_ready` runs
//! discovery, reads every advertised description and opens one channel per
//! usable declaration; `disconnect` tears all of them down again.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::{
    ChannelKind, InsecureChannel, Negotiator, ReceiveLog, SecureChannel, SentLog, WebhookChannel,
};
use crate::config::NotificationConfig;
use crate::description::{ChannelDescription, ChannelType, DescriptionCache};
use crate::discovery::{self, DiscoveryLinks};
use crate::errors::Result;
use crate::fetch::Fetch;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientState {
    Created,
    Disabled,
    Discovering,
    Subscribing,
    Ready,
    Disconnected,
}

/// One channel to open: which transport, and where its handshake goes.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Dispatch {
    kind: ChannelKind,
    endpoint: Url,
}

pub struct NotificationsClient {
    resource: Url,
    fetcher: Arc<dyn Fetch>,
    config: NotificationConfig,
    state: ClientState,
    links: DiscoveryLinks,
    descriptions: DescriptionCache,
    insecure: InsecureChannel,
    secure: SecureChannel,
    webhook: WebhookChannel,
}

impl core::fmt::Debug for NotificationsClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationsClient")
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("links", &self.links)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NotificationsClient {
    #[must_use]
    pub fn new(resource: Url, fetcher: Arc<dyn Fetch>, config: NotificationConfig) -> Self {
        Self {
            secure: SecureChannel::new(Arc::clone(&fetcher)),
            webhook: WebhookChannel::new(Arc::clone(&fetcher), &config),
            insecure: InsecureChannel::new(),
            descriptions: DescriptionCache::new(),
            links: DiscoveryLinks::default(),
            state: ClientState::Created,
            resource,
            fetcher,
            config,
        }
    }

    #[must_use]
    pub const fn resource(&self) -> &Url {
        &self.resource
    }

    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    #[must_use]
    pub const fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Discovers and opens every channel the resource advertises.
    ///
    /// Every handshake runs to completion before this returns, even when one
    /// of them fails. The first failure in plan order is returned; channels
    /// that did open stay open until [`disconnect`](Self::disconnect).
    pub async fn get_ready(&mut self) -> Result<()> {
        if self.config.disabled {
            debug!(resource = %self.resource, "Notifications disabled");
            self.state = ClientState::Disabled;
            return Ok(());
        }

        if self.state == ClientState::Ready {
            return Ok(());
        }

        self.state = ClientState::Discovering;
        let _ = self.discover().await?;

        self.state = ClientState::Subscribing;
        let plan = self.plan().await?;

        let resource = &self.resource;
        let setups = plan.iter().map(|dispatch| {
            debug!(kind = ?dispatch.kind, endpoint = %dispatch.endpoint, "Negotiating channel");
            self.negotiator(dispatch.kind)
                .setup(&dispatch.endpoint, resource)
        });
        let outcomes = join_all(setups).await;

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        if let Some(err) = outcomes.into_iter().find_map(|outcome| outcome.err()) {
            warn!(resource = %self.resource, failed, "Notification channel setup failed");
            return Err(err);
        }

        self.state = ClientState::Ready;
        info!(resource = %self.resource, channels = plan.len(), "Notification channels ready");

        Ok(())
    }

    /// Runs discovery on its own, merging into what is already known.
    pub async fn discover(&mut self) -> Result<&DiscoveryLinks> {
        let links = discovery::discover(&*self.fetcher, &self.resource).await?;
        self.links.merge(links);

        Ok(&self.links)
    }

    #[must_use]
    pub const fn discovery_links(&self) -> &DiscoveryLinks {
        &self.links
    }

    /// Fetches (at most once) and returns a description document.
    pub async fn description(&mut self, url: &Url) -> Result<&ChannelDescription> {
        self.descriptions.fetch(&*self.fetcher, url).await
    }

    #[must_use]
    pub const fn descriptions(&self) -> &DescriptionCache {
        &self.descriptions
    }

    #[must_use]
    pub fn received(&self, kind: ChannelKind) -> &ReceiveLog {
        self.negotiator(kind).received()
    }

    #[must_use]
    pub fn received_insecure(&self) -> &ReceiveLog {
        self.received(ChannelKind::Insecure)
    }

    /// Shared by every secure socket, whichever description it came from.
    #[must_use]
    pub fn received_secure(&self) -> &ReceiveLog {
        self.received(ChannelKind::Secure)
    }

    #[must_use]
    pub fn received_webhook(&self) -> &ReceiveLog {
        self.received(ChannelKind::Webhook)
    }

    #[must_use]
    pub const fn sent_insecure(&self) -> &SentLog {
        self.insecure.sent()
    }

    #[must_use]
    pub const fn sent_secure(&self) -> &SentLog {
        self.secure.sent()
    }

    /// Writes a raw frame to the insecure socket. A disabled client accepts
    /// and drops it.
    pub async fn send(&self, frame: &str) -> Result<()> {
        if self.config.disabled {
            return Ok(());
        }

        self.insecure.send(frame).await
    }

    /// Where the webhook listener is bound, once it has been started.
    pub async fn webhook_addr(&self) -> Option<SocketAddr> {
        self.webhook.local_addr().await
    }

    /// Closes every channel. Safe to call repeatedly and before `get_ready`.
    pub async fn disconnect(&mut self) {
        if self.state == ClientState::Disabled {
            return;
        }

        for kind in [ChannelKind::Insecure, ChannelKind::Secure, ChannelKind::Webhook] {
            self.negotiator(kind).close().await;
        }

        if self.state != ClientState::Disconnected {
            info!(resource = %self.resource, "Notification channels closed");
        }
        self.state = ClientState::Disconnected;
    }

    fn negotiator(&self, kind: ChannelKind) -> &dyn Negotiator {
        match kind {
            ChannelKind::Insecure => &self.insecure,
            ChannelKind::Secure => &self.secure,
            ChannelKind::Webhook => &self.webhook,
        }
    }

    /// Works out which channels to open, fetching descriptions on the way.
    async fn plan(&mut self) -> Result<Vec<Dispatch>> {
        let mut plan = Vec::new();

        if let Some(endpoint) = &self.links.insecure_ws {
            if self.config.skip_insecure {
                debug!(%endpoint, "Skipping insecure channel");
            } else {
                plan.push(Dispatch {
                    kind: ChannelKind::Insecure,
                    endpoint: endpoint.clone(),
                });
            }
        }

        if !self.config.wants_descriptions() {
            return Ok(plan);
        }

        let urls: Vec<Url> = self
            .links
            .description_urls()
            .into_iter()
            .cloned()
            .collect();

        for url in urls {
            let description = self.descriptions.fetch(&*self.fetcher, &url).await?;
            plan.extend(declared(&self.config, &url, description));
        }

        Ok(plan)
    }
}

/// Usable declarations of one description, in document order.
fn declared(
    config: &NotificationConfig,
    description_url: &Url,
    description: &ChannelDescription,
) -> Vec<Dispatch> {
    let mut plan = Vec::new();

    for declaration in &description.notification_channel {
        let Some(channel_type) = declaration.channel_type() else {
            debug!(types = ?declaration.types, "Ignoring unsupported channel type");
            continue;
        };

        let kind = match channel_type {
            ChannelType::WebSocketSubscription2021 => ChannelKind::Secure,
            ChannelType::WebHookSubscription2022 => ChannelKind::Webhook,
        };

        if config.skips(kind) {
            debug!(?kind, "Skipping channel");
            continue;
        }

        let endpoint = match declaration.subscription_url(description_url) {
            Some(Ok(endpoint)) => endpoint,
            Some(Err(err)) => {
                warn!(%description_url, subscription = ?declaration.subscription, %err, "Unresolvable subscription endpoint");
                continue;
            }
            None => {
                warn!(%description_url, ?kind, "Declaration has no subscription endpoint");
                continue;
            }
        };

        plan.push(Dispatch { kind, endpoint });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::ChannelDeclaration;

    fn url(s: &str) -> Url {
        s.parse().unwrap()
    }

    fn declaration(ty: &str, subscription: Option<&str>) -> ChannelDeclaration {
        ChannelDeclaration {
            id: None,
            types: vec![ty.to_owned()],
            subscription: subscription.map(ToOwned::to_owned),
        }
    }

    fn description(declarations: Vec<ChannelDeclaration>) -> ChannelDescription {
        ChannelDescription {
            context: None,
            id: None,
            notification_channel: declarations,
        }
    }

    #[test]
    fn declarations_are_resolved_against_their_document() {
        let doc = description(vec![
            declaration("WebSocketSubscription2021", Some("subscribe/ws")),
            declaration("WebHookSubscription2022", Some("https://other.example/hook")),
        ]);

        let plan = declared(
            &NotificationConfig::default(),
            &url("https://pod.example/.notifications/desc"),
            &doc,
        );

        assert_eq!(
            plan,
            vec![
                Dispatch {
                    kind: ChannelKind::Secure,
                    endpoint: url("https://pod.example/.notifications/subscribe/ws"),
                },
                Dispatch {
                    kind: ChannelKind::Webhook,
                    endpoint: url("https://other.example/hook"),
                },
            ]
        );
    }

    #[test]
    fn unknown_skipped_and_incomplete_declarations_are_dropped() {
        let doc = description(vec![
            declaration("StreamingHTTPChannel2023", Some("/stream")),
            declaration("WebSocketSubscription2021", None),
            declaration("WebHookSubscription2022", Some("/hook")),
        ]);

        let plan = declared(
            &NotificationConfig::default().with_skip_webhook(true),
            &url("https://pod.example/desc"),
            &doc,
        );

        assert!(plan.is_empty(), "{plan:?}");
    }

    #[test]
    fn new_client_starts_created() {
        struct Unreachable;

        #[async_trait::async_trait]
        impl Fetch for Unreachable {
            async fn fetch(
                &self,
                request: crate::fetch::FetchRequest,
            ) -> Result<crate::fetch::FetchResponse, crate::fetch::FetchError> {
                panic!("unexpected request to {}", request.url)
            }
        }

        let client = NotificationsClient::new(
            url("https://pod.example/foo"),
            Arc::new(Unreachable),
            NotificationConfig::default(),
        );

        assert_eq!(client.state(), ClientState::Created);
        assert!(client.received_insecure().is_empty());
        assert!(client.discovery_links().description_urls().is_empty());
    }
}
