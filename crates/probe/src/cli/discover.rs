use clap::Parser;
use color_eyre::owo_colors::OwoColorize;
use conformance_notifications::description::DescriptionCache;
use conformance_notifications::{discovery, ChannelDescription, DiscoveryLinks, Url};
use eyre::Result;
use serde::Serialize;

use crate::cli::Environment;
use crate::config::ServerArgs;
use crate::output::{field, Report};

#[derive(Debug, Parser)]
#[command(about = "Show the notification channels a resource advertises")]
pub struct DiscoverCommand {
    /// Resource URL, absolute or relative to the storage root
    #[arg(value_name = "RESOURCE")]
    pub resource: String,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Discovered {
    resource: Url,
    links: DiscoveryLinks,
    descriptions: Vec<Described>,
}

#[derive(Debug, Serialize)]
struct Described {
    url: Url,
    #[serde(flatten)]
    description: ChannelDescription,
}

impl Report for Discovered {
    fn report(&self) {
        println!("{}", self.resource.bold());
        field("Updates-Via", self.links.insecure_ws.as_ref());
        field("Storage description", self.links.storage_wide.as_ref());
        field("Resource description", self.links.resource_specific.as_ref());

        for described in &self.descriptions {
            println!();
            println!("{}", described.url.bold());

            if described.description.notification_channel.is_empty() {
                println!("  {}", "no channels declared".dimmed());
            }

            for declaration in &described.description.notification_channel {
                let supported = declaration.channel_type().is_some();
                let types = declaration.types.join(", ");

                println!(
                    "  {} {}",
                    if supported {
                        types.green().to_string()
                    } else {
                        types.dimmed().to_string()
                    },
                    declaration.subscription.as_deref().unwrap_or("-"),
                );
            }
        }
    }
}

impl DiscoverCommand {
    pub async fn run(&self, environment: &Environment) -> Result<()> {
        let fetcher = self.server.fetcher()?;
        let resource = self.server.resolve(&self.resource)?;

        let links = discovery::discover(&fetcher, &resource).await?;

        let mut cache = DescriptionCache::new();
        let mut descriptions = Vec::new();
        for url in links.description_urls() {
            let description = cache.fetch(&fetcher, url).await?.clone();
            descriptions.push(Described {
                url: url.clone(),
                description,
            });
        }

        environment.output.write(&Discovered {
            resource,
            links,
            descriptions,
        });

        Ok(())
    }
}
