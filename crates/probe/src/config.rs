//! Flags shared by the subcommands, each with an environment fallback.

use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Args};
use conformance_notifications::config::DEFAULT_WEBHOOK_TARGET;
use conformance_notifications::{HttpFetcher, NotificationConfig, TlsMaterial};
use eyre::{bail, Result, WrapErr};
use reqwest::header::{HeaderValue, COOKIE};
use url::Url;

pub const DEFAULT_SERVER_ROOT: &str = "https://localhost:8443";

#[derive(Debug, Args)]
pub struct ServerArgs {
    /// Root container of the storage under test
    #[arg(long, value_name = "URL", env = "STORAGE_ROOT")]
    pub storage_root: Option<Url>,

    /// Server root, used when no storage root is given
    #[arg(long, value_name = "URL", env = "SERVER_ROOT")]
    pub server_root: Option<Url>,

    /// Identity provider root, the last fallback for the storage root
    #[arg(long, value_name = "URL", env = "OIDC_ISSUER", hide = true)]
    pub oidc_issuer: Option<Url>,

    /// Session cookie sent with every request
    #[arg(long, value_name = "COOKIE", env = "COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Alice's session cookie, used when no cookie is given
    #[arg(long, value_name = "COOKIE", env = "COOKIE_ALICE", hide = true)]
    pub cookie_alice: Option<String>,
}

impl ServerArgs {
    pub fn storage_root(&self) -> Result<Url> {
        let root = self
            .storage_root
            .as_ref()
            .or(self.server_root.as_ref())
            .or(self.oidc_issuer.as_ref());

        match root {
            Some(root) => Ok(root.clone()),
            None => DEFAULT_SERVER_ROOT
                .parse()
                .wrap_err("invalid default server root"),
        }
    }

    /// Absolute URLs are taken as they are; anything else is relative to the
    /// storage root.
    pub fn resolve(&self, resource: &str) -> Result<Url> {
        match Url::parse(resource) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => as_container(self.storage_root()?)
                .join(resource)
                .wrap_err_with(|| format!("cannot resolve {resource:?} against the storage root")),
            Err(err) => Err(err).wrap_err_with(|| format!("invalid resource {resource:?}")),
        }
    }

    pub fn cookie(&self) -> Option<&str> {
        [&self.cookie, &self.cookie_alice]
            .into_iter()
            .filter_map(Option::as_deref)
            .find(|cookie| !cookie.is_empty())
    }

    pub fn fetcher(&self) -> Result<HttpFetcher> {
        let client = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client")?;

        let mut fetcher = HttpFetcher::new(client);

        if let Some(cookie) = self.cookie() {
            let mut value = HeaderValue::from_str(cookie).wrap_err("invalid cookie")?;
            value.set_sensitive(true);
            fetcher = fetcher.with_header(COOKIE, value);
        }

        Ok(fetcher)
    }
}

#[derive(Debug, Args)]
pub struct NotificationArgs {
    /// Do not open any notification channel
    #[arg(long, env = "SKIP_NOTIFICATIONS")]
    #[arg(action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub skip_notifications: bool,

    /// Skip the legacy pub/sub socket
    #[arg(long, env = "SKIP_WPS")]
    #[arg(action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub skip_wps: bool,

    /// Skip subscribed WebSocket channels
    #[arg(long, env = "SKIP_SECURE_WEBSOCKETS")]
    #[arg(action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub skip_secure_websockets: bool,

    /// Skip webhook channels
    #[arg(long, env = "SKIP_WEBHOOKS")]
    #[arg(action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub skip_webhooks: bool,

    /// Local port for the webhook listener; 0 picks a free one
    #[arg(long, value_name = "PORT", env = "WEBHOOK_PORT")]
    pub webhook_port: Option<u16>,

    /// URL the server should POST notifications to
    #[arg(long, value_name = "URL", env = "WEBHOOK_TARGET", default_value = DEFAULT_WEBHOOK_TARGET)]
    pub webhook_target: Url,

    /// PEM certificate chain for the webhook listener
    #[arg(long, value_name = "PATH", env = "WEBHOOK_CERT")]
    pub webhook_cert: Option<PathBuf>,

    /// PEM private key for the webhook listener
    #[arg(long, value_name = "PATH", env = "WEBHOOK_KEY")]
    pub webhook_key: Option<PathBuf>,
}

impl NotificationArgs {
    /// Builds the client configuration, reading TLS material from disk.
    pub async fn config(&self) -> Result<NotificationConfig> {
        if self.skip_notifications {
            return Ok(NotificationConfig::disabled());
        }

        let mut config = NotificationConfig::default()
            .with_skip_insecure(self.skip_wps)
            .with_skip_secure(self.skip_secure_websockets)
            .with_skip_webhook(self.skip_webhooks);

        let Some(port) = self.webhook_port else {
            return Ok(config);
        };

        let tls = match (&self.webhook_cert, &self.webhook_key) {
            (Some(cert), Some(key)) => TlsMaterial::from_files(cert, key)
                .await
                .wrap_err("failed to read webhook TLS material")?,
            _ => bail!("WEBHOOK_PORT is set but WEBHOOK_CERT and WEBHOOK_KEY are not"),
        };

        config = config.with_webhook(port, self.webhook_target.clone(), tls);

        Ok(config)
    }
}

/// Ensures `url` ends in `/` so joins land inside it.
pub fn as_container(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    url
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        server: ServerArgs,
        #[command(flatten)]
        notifications: NotificationArgs,
    }

    #[test]
    fn relative_resources_resolve_inside_the_storage_root() {
        let harness =
            Harness::parse_from(["probe", "--storage-root", "https://pod.example/alice"]);

        assert_eq!(
            harness.server.resolve("foo/bar.txt").unwrap().as_str(),
            "https://pod.example/alice/foo/bar.txt"
        );
        assert_eq!(
            harness.server.resolve("https://other.example/x").unwrap().as_str(),
            "https://other.example/x"
        );
    }

    #[test]
    fn roots_and_cookies_fall_back_in_order() {
        let harness = Harness::parse_from([
            "probe",
            "--oidc-issuer",
            "https://idp.example/",
            "--cookie",
            "",
            "--cookie-alice",
            "session=alice",
        ]);

        assert_eq!(
            harness.server.storage_root().unwrap().as_str(),
            "https://idp.example/"
        );
        assert_eq!(harness.server.cookie(), Some("session=alice"));

        let harness = Harness::parse_from([
            "probe",
            "--server-root",
            "https://server.example/",
            "--oidc-issuer",
            "https://idp.example/",
        ]);

        assert_eq!(
            harness.server.storage_root().unwrap().as_str(),
            "https://server.example/"
        );
    }

    #[tokio::test]
    async fn skip_flags_map_onto_the_config() {
        let harness = Harness::parse_from(["probe", "--skip-wps", "--skip-webhooks"]);

        let config = harness.notifications.config().await.unwrap();

        assert!(!config.disabled);
        assert!(config.skip_insecure);
        assert!(!config.skip_secure);
        assert!(config.skip_webhook);
    }

    #[tokio::test]
    async fn webhook_port_needs_tls_material() {
        let harness = Harness::parse_from(["probe", "--webhook-port", "0"]);

        assert!(harness.notifications.config().await.is_err());
    }

    #[test]
    fn container_urls_gain_a_trailing_slash() {
        let url = as_container("https://pod.example/alice".parse().unwrap());

        assert_eq!(url.as_str(), "https://pod.example/alice/");
    }
}
