use std::io;
use std::path::Path;

use url::Url;

use crate::channel::ChannelKind;

pub const DEFAULT_WEBHOOK_TARGET: &str = "https://tester/";

/// PEM-encoded certificate chain and private key for the webhook listener.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl TlsMaterial {
    #[must_use]
    pub const fn new(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        Self { cert_pem, key_pem }
    }

    pub async fn from_files(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> io::Result<Self> {
        let cert_pem = tokio::fs::read(cert).await?;
        let key_pem = tokio::fs::read(key).await?;

        Ok(Self { cert_pem, key_pem })
    }
}

impl core::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Which transports a [`NotificationsClient`](crate::NotificationsClient)
/// may open, and how the webhook sink is reached.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct NotificationConfig {
    /// Skip every transport; `get_ready` returns without any I/O.
    pub disabled: bool,
    pub skip_insecure: bool,
    pub skip_secure: bool,
    pub skip_webhook: bool,
    /// Local port of the webhook listener. Without one, webhook channels are
    /// not subscribed. `0` binds an ephemeral port.
    pub webhook_port: Option<u16>,
    /// Externally reachable URL of the webhook listener, sent as `target`.
    pub webhook_target: Url,
    pub webhook_tls: Option<TlsMaterial>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            skip_insecure: false,
            skip_secure: false,
            skip_webhook: false,
            webhook_port: None,
            webhook_target: default_webhook_target(),
            webhook_tls: None,
        }
    }
}

impl NotificationConfig {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_skip_insecure(mut self, skip: bool) -> Self {
        self.skip_insecure = skip;
        self
    }

    #[must_use]
    pub const fn with_skip_secure(mut self, skip: bool) -> Self {
        self.skip_secure = skip;
        self
    }

    #[must_use]
    pub const fn with_skip_webhook(mut self, skip: bool) -> Self {
        self.skip_webhook = skip;
        self
    }

    #[must_use]
    pub fn with_webhook(mut self, port: u16, target: Url, tls: TlsMaterial) -> Self {
        self.webhook_port = Some(port);
        self.webhook_target = target;
        self.webhook_tls = Some(tls);
        self
    }

    #[must_use]
    pub const fn skips(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Insecure => self.skip_insecure,
            ChannelKind::Secure => self.skip_secure,
            ChannelKind::Webhook => self.skip_webhook,
        }
    }

    /// Whether description documents are worth fetching at all.
    #[must_use]
    pub const fn wants_descriptions(&self) -> bool {
        !(self.skip_secure && self.skip_webhook)
    }
}

fn default_webhook_target() -> Url {
    DEFAULT_WEBHOOK_TARGET
        .parse()
        .expect("valid default webhook target")
}
