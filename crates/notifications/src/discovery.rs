//! Link Discovery: which notification endpoints does a resource advertise?

use reqwest::header::{HeaderMap, LINK};
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::errors::{NotificationError, Result};
use crate::fetch::{Fetch, FetchRequest};
use crate::link::LinkRelations;

/// Legacy header carrying the insecure pub/sub socket address.
pub const UPDATES_VIA: &str = "updates-via";

/// Relation pointing at the description of the resource itself.
pub const REL_DESCRIBED_BY: &str = "describedby";

/// Relation pointing at the description of the whole storage.
pub const REL_STORAGE_DESCRIPTION: &str = "http://www.w3.org/ns/solid/terms#storageDescription";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryLinks {
    pub insecure_ws: Option<Url>,
    pub storage_wide: Option<Url>,
    pub resource_specific: Option<Url>,
}

impl DiscoveryLinks {
    /// Extracts the links from a response to a request for `resource`.
    ///
    /// Values that cannot be resolved against `resource` are treated as absent.
    #[must_use]
    pub fn from_headers(resource: &Url, headers: &HeaderMap) -> Self {
        let insecure_ws = headers
            .get(UPDATES_VIA)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| resolve(resource, value));

        let relations =
            LinkRelations::from_headers(headers.get_all(LINK).iter().filter_map(|value| {
                value
                    .to_str()
                    .inspect_err(|err| warn!(%err, "Ignoring non-ASCII Link header"))
                    .ok()
            }));

        let storage_wide = relations
            .get(REL_STORAGE_DESCRIPTION)
            .and_then(|target| resolve(resource, &target.url));
        let resource_specific = relations
            .get(REL_DESCRIBED_BY)
            .and_then(|target| resolve(resource, &target.url));

        Self {
            insecure_ws,
            storage_wide,
            resource_specific,
        }
    }

    /// Overwrites fields that `other` found, keeping ours where it found
    /// nothing.
    pub fn merge(&mut self, other: Self) {
        let Self {
            insecure_ws,
            storage_wide,
            resource_specific,
        } = other;

        if insecure_ws.is_some() {
            self.insecure_ws = insecure_ws;
        }
        if storage_wide.is_some() {
            self.storage_wide = storage_wide;
        }
        if resource_specific.is_some() {
            self.resource_specific = resource_specific;
        }
    }

    /// Distinct description URLs, resource-specific first.
    #[must_use]
    pub fn description_urls(&self) -> Vec<&Url> {
        let mut urls = Vec::with_capacity(2);
        for url in [&self.resource_specific, &self.storage_wide]
            .into_iter()
            .flatten()
        {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }
}

/// Issues one `HEAD` against `resource` and reads its notification links.
///
/// Only a failing fetch is an error; a response without the relevant headers
/// simply yields empty links.
pub async fn discover(fetcher: &dyn Fetch, resource: &Url) -> Result<DiscoveryLinks> {
    let response = fetcher
        .fetch(FetchRequest::head(resource.clone()))
        .await
        .map_err(|source| NotificationError::Discovery {
            url: resource.clone(),
            source,
        })?;

    if !response.status.is_success() {
        debug!(%resource, status = %response.status, "Discovery request was not successful");
    }

    let links = DiscoveryLinks::from_headers(resource, &response.headers);
    debug!(%resource, ?links, "Discovered notification links");

    Ok(links)
}

fn resolve(base: &Url, reference: &str) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    base.join(reference)
        .inspect_err(|err| warn!(%base, reference, %err, "Ignoring unresolvable link"))
        .ok()
}
