use core::time::Duration;
use std::sync::Arc;

use clap::Parser;
use color_eyre::owo_colors::OwoColorize;
use conformance_notifications::{
    ChannelKind, ClientState, DiscoveryLinks, NotificationsClient, Received, Url,
};
use eyre::Result;
use serde::Serialize;
use tracing::info;

use crate::cli::Environment;
use crate::config::{NotificationArgs, ServerArgs};
use crate::output::{field, InfoLine, Report};

#[derive(Debug, Parser)]
#[command(about = "Subscribe to a resource and report what arrives")]
pub struct WatchCommand {
    /// Resource URL, absolute or relative to the storage root
    #[arg(value_name = "RESOURCE")]
    pub resource: String,

    /// Seconds to listen before disconnecting
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub wait: u64,

    #[command(flatten)]
    pub server: ServerArgs,

    #[command(flatten)]
    pub notifications: NotificationArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Watched {
    resource: Url,
    state: ClientState,
    links: DiscoveryLinks,
    sent: Vec<String>,
    insecure: Vec<Received>,
    secure: Vec<Received>,
    webhook: Vec<Received>,
}

impl Report for Watched {
    fn report(&self) {
        println!("{}", self.resource.bold());
        field("Updates-Via", self.links.insecure_ws.as_ref());
        field("Storage description", self.links.storage_wide.as_ref());
        field("Resource description", self.links.resource_specific.as_ref());

        for (label, entries) in [
            ("insecure", &self.insecure),
            ("secure", &self.secure),
            ("webhook", &self.webhook),
        ] {
            println!();
            println!("{} ({})", label.bold(), entries.len());

            for entry in entries {
                println!("  {}", describe(entry));
            }
        }
    }
}

impl WatchCommand {
    pub async fn run(&self, environment: &Environment) -> Result<()> {
        let fetcher = Arc::new(self.server.fetcher()?);
        let resource = self.server.resolve(&self.resource)?;
        let config = self.notifications.config().await?;

        let mut client = NotificationsClient::new(resource.clone(), fetcher, config);

        let mut insecure = client.received_insecure().subscribe();
        let mut secure = client.received_secure().subscribe();
        let mut webhook = client.received_webhook().subscribe();

        if let Err(err) = client.get_ready().await {
            client.disconnect().await;
            return Err(err.into());
        }

        if let Some(addr) = client.webhook_addr().await {
            environment
                .output
                .write(&InfoLine(&format!("Webhook listener bound to {addr}")));
        }

        let deadline = tokio::time::sleep(Duration::from_secs(self.wait));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => break,
                _ = tokio::signal::ctrl_c() => break,
                Ok(event) = insecure.recv() => log_event(ChannelKind::Insecure, &event),
                Ok(event) = secure.recv() => log_event(ChannelKind::Secure, &event),
                Ok(event) = webhook.recv() => log_event(ChannelKind::Webhook, &event),
            }
        }

        let watched = Watched {
            resource,
            state: client.state(),
            links: client.discovery_links().clone(),
            sent: client.sent_insecure().snapshot(),
            insecure: client.received_insecure().snapshot(),
            secure: client.received_secure().snapshot(),
            webhook: client.received_webhook().snapshot(),
        };

        client.disconnect().await;

        environment.output.write(&watched);

        Ok(())
    }
}

fn log_event(kind: ChannelKind, event: &Received) {
    info!(channel = ?kind, event = %describe(event), "Notification received");
}

fn describe(entry: &Received) -> String {
    match entry {
        Received::Text(text) => text.clone(),
        Received::Binary(bytes) => format!("<{} binary bytes>", bytes.len()),
    }
}
