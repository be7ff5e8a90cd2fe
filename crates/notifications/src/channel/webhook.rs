//! `WebHookSubscription2022`: run a TLS sink locally and ask the server to
//! POST notifications at it.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{ChannelKind, Negotiator, ReceiveLog, Received, SubscriptionRequest};
use crate::config::{NotificationConfig, TlsMaterial};
use crate::description::ChannelType;
use crate::errors::{NotificationError, Result};
use crate::fetch::Fetch;

pub struct WebhookChannel {
    fetcher: Arc<dyn Fetch>,
    port: Option<u16>,
    target: Url,
    tls: Option<TlsMaterial>,
    received: ReceiveLog,
    listener: Mutex<Option<Listener>>,
}

impl core::fmt::Debug for WebhookChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("port", &self.port)
            .field("target", &self.target)
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}

impl WebhookChannel {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetch>, config: &NotificationConfig) -> Self {
        Self {
            fetcher,
            port: config.webhook_port,
            target: config.webhook_target.clone(),
            tls: config.webhook_tls.clone(),
            received: ReceiveLog::new(),
            listener: Mutex::new(None),
        }
    }

    /// Address the listener is bound to, once it is running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|listener| listener.addr)
    }

    /// Starts the listener unless it is already running. Several webhook
    /// declarations share one listener.
    async fn ensure_listener(&self, port: u16) -> Result<()> {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }

        let tls = self
            .tls
            .as_ref()
            .ok_or(NotificationError::MissingTlsMaterial { port })?;

        *listener = Some(Listener::start(port, tls, self.received.clone()).await?);

        Ok(())
    }
}

#[async_trait]
impl Negotiator for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn setup(&self, endpoint: &Url, topic: &Url) -> Result<()> {
        let Some(port) = self.port else {
            debug!(%endpoint, "No webhook port configured, not subscribing");
            return Ok(());
        };

        self.ensure_listener(port).await?;

        let response =
            SubscriptionRequest::new(ChannelType::WebHookSubscription2022, topic, Some(&self.target))
                .send(&*self.fetcher, endpoint)
                .await?;

        debug!(%endpoint, status = %response.status, body = %response.text(), "Webhook subscription accepted");
        info!(%endpoint, %topic, target = %self.target, "Webhook channel subscribed");

        Ok(())
    }

    fn received(&self) -> &ReceiveLog {
        &self.received
    }

    async fn close(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.stop().await;
        }
    }
}

struct Listener {
    addr: SocketAddr,
    handle: Handle,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl Listener {
    async fn start(port: u16, tls: &TlsMaterial, log: ReceiveLog) -> Result<Self> {
        let config = RustlsConfig::from_pem(tls.cert_pem.clone(), tls.key_pem.clone())
            .await
            .map_err(NotificationError::Tls)?;

        let app = Router::new()
            .fallback(receive)
            .layer(DefaultBodyLimit::disable())
            .with_state(log);

        let handle = Handle::new();
        let server = axum_server::bind_rustls(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), config)
            .handle(handle.clone());
        let task = tokio::spawn(async move { server.serve(app.into_make_service()).await });

        // Stops the server if this future is dropped before it returns.
        let guard = ShutdownGuard(Some(handle.clone()));

        let Some(addr) = handle.listening().await else {
            let source = match task.await {
                Ok(Err(err)) => err,
                Ok(Ok(())) => io::Error::other("listener stopped before binding"),
                Err(err) => io::Error::other(err),
            };
            return Err(NotificationError::Listener { port, source });
        };

        info!(%addr, "Webhook listener bound");
        guard.disarm();

        Ok(Self {
            addr,
            handle,
            task: Some(task),
        })
    }

    /// Shuts the server down and waits until the port is released.
    async fn stop(mut self) {
        self.handle.shutdown();

        let Some(task) = self.task.take() else {
            return;
        };

        match task.await {
            Ok(Ok(())) => debug!(addr = %self.addr, "Webhook listener stopped"),
            Ok(Err(err)) => warn!(addr = %self.addr, %err, "Webhook listener failed"),
            Err(err) => warn!(addr = %self.addr, %err, "Webhook listener task failed"),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

struct ShutdownGuard(Option<Handle>);

impl ShutdownGuard {
    fn disarm(mut self) {
        drop(self.0.take());
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.shutdown();
        }
    }
}

/// Every request, whatever its method or path and however large, is an
/// event.
async fn receive(State(log): State<ReceiveLog>, body: Bytes) -> (StatusCode, &'static str) {
    debug!(len = body.len(), "Webhook <");
    log.push(Received::from(body));

    (StatusCode::OK, "OK")
}
