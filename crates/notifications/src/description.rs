//! Channel Description Fetcher.
//!
//! A description document lists the concrete subscription endpoints a
//! resource (or the whole storage) offers, one declaration per channel type.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use reqwest::header::{HeaderValue, ACCEPT};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use url::Url;

use crate::errors::{NotificationError, Result};
use crate::fetch::{Fetch, FetchRequest};

pub const DESCRIPTION_ACCEPT: &str = "application/ld+json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ChannelType {
    WebSocketSubscription2021,
    WebHookSubscription2022,
}

impl ChannelType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSocketSubscription2021 => "WebSocketSubscription2021",
            Self::WebHookSubscription2022 => "WebHookSubscription2022",
        }
    }

    /// Unknown names map to `None`; they are ignored rather than rejected.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "WebSocketSubscription2021" => Some(Self::WebSocketSubscription2021),
            "WebHookSubscription2022" => Some(Self::WebHookSubscription2022),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "one_or_many")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

impl ChannelDeclaration {
    /// The first declared type this client knows how to negotiate.
    #[must_use]
    pub fn channel_type(&self) -> Option<ChannelType> {
        self.types.iter().find_map(|name| ChannelType::from_name(name))
    }

    /// `subscription` resolved against the URL the description came from.
    #[must_use]
    pub fn subscription_url(&self, description_url: &Url) -> Option<Result<Url, url::ParseError>> {
        self.subscription
            .as_deref()
            .map(|subscription| description_url.join(subscription))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ChannelDescription {
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "notificationChannel")]
    pub notification_channel: Vec<ChannelDeclaration>,
}

impl ChannelDescription {
    pub fn from_slice(url: &Url, body: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|source| NotificationError::DescriptionParse {
                url: url.clone(),
                source,
            })?;

        if !value
            .get("notificationChannel")
            .is_some_and(serde_json::Value::is_array)
        {
            return Err(NotificationError::MissingChannels { url: url.clone() });
        }

        serde_json::from_value(value).map_err(|source| NotificationError::DescriptionParse {
            url: url.clone(),
            source,
        })
    }

    /// Whether `@context` names `context`, either directly or in an array.
    #[must_use]
    pub fn has_context(&self, context: &str) -> bool {
        match &self.context {
            Some(serde_json::Value::String(value)) => value == context,
            Some(serde_json::Value::Array(values)) => {
                values.iter().any(|value| value.as_str() == Some(context))
            }
            _ => false,
        }
    }
}

/// Description documents by URL. Each URL is fetched at most once.
#[derive(Debug, Default)]
pub struct DescriptionCache {
    documents: HashMap<Url, ChannelDescription>,
}

impl DescriptionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fetch(&mut self, fetcher: &dyn Fetch, url: &Url) -> Result<&ChannelDescription> {
        match self.documents.entry(url.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let description = fetch_description(fetcher, url).await?;
                Ok(entry.insert(description))
            }
        }
    }

    #[must_use]
    pub fn get(&self, url: &Url) -> Option<&ChannelDescription> {
        self.documents.get(url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

async fn fetch_description(fetcher: &dyn Fetch, url: &Url) -> Result<ChannelDescription> {
    let request = FetchRequest::get(url.clone())
        .with_header(ACCEPT, HeaderValue::from_static(DESCRIPTION_ACCEPT));

    let response = fetcher
        .fetch(request)
        .await
        .map_err(|source| NotificationError::DescriptionFetch {
            url: url.clone(),
            source,
        })?;

    debug!(%url, status = %response.status, "Fetched channel description");

    if !response.status.is_success() {
        return Err(NotificationError::DescriptionStatus {
            url: url.clone(),
            status: response.status.as_u16(),
        });
    }

    ChannelDescription::from_slice(url, &response.body)
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    use super::*;
    use crate::fetch::{FetchError, FetchResponse};

    struct Canned(StatusCode, &'static str);

    #[async_trait]
    impl Fetch for Canned {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse::new(self.0, HeaderMap::new(), self.1))
        }
    }

    fn url() -> Url {
        "https://x/y/desc".parse().unwrap()
    }

    #[test]
    fn relative_subscription_resolves_against_description_directory() {
        let declaration = ChannelDeclaration {
            id: None,
            types: vec!["WebSocketSubscription2021".to_owned()],
            subscription: Some("foo".to_owned()),
        };

        let resolved = declaration.subscription_url(&url()).unwrap().unwrap();

        assert_eq!(resolved.as_str(), "https://x/y/foo");
    }

    #[test]
    fn parses_declarations_in_order() {
        let body = br#"{
            "@context": ["https://www.w3.org/ns/solid/notification/v1"],
            "notificationChannel": [
                { "type": "WebSocketSubscription2021", "subscription": "/a" },
                { "type": ["Other", "WebHookSubscription2022"], "subscription": "/b" },
                { "type": "LDNChannel2023" }
            ]
        }"#;

        let description = ChannelDescription::from_slice(&url(), body).unwrap();

        assert!(description.has_context(crate::NOTIFICATION_CONTEXT));
        let types: Vec<_> = description
            .notification_channel
            .iter()
            .map(ChannelDeclaration::channel_type)
            .collect();
        assert_eq!(
            types,
            vec![
                Some(ChannelType::WebSocketSubscription2021),
                Some(ChannelType::WebHookSubscription2022),
                None
            ]
        );
        assert_eq!(description.notification_channel[2].subscription, None);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        let err = ChannelDescription::from_slice(&url(), b"<html>").unwrap_err();

        assert!(matches!(err, NotificationError::DescriptionParse { .. }));
    }

    #[test]
    fn missing_channel_array_is_reported() {
        let err = ChannelDescription::from_slice(&url(), br#"{"@context": []}"#).unwrap_err();

        assert!(matches!(err, NotificationError::MissingChannels { .. }));
    }

    #[test]
    fn channel_type_names_round_trip() {
        for ty in [
            ChannelType::WebSocketSubscription2021,
            ChannelType::WebHookSubscription2022,
        ] {
            assert_eq!(ChannelType::from_name(ty.as_str()), Some(ty));
        }
        assert_eq!(ChannelType::from_name("websocketsubscription2021"), None);
    }

    #[tokio::test]
    async fn unsuccessful_status_is_not_mistaken_for_bad_json() {
        let mut cache = DescriptionCache::new();

        let err = cache
            .fetch(&Canned(StatusCode::NOT_FOUND, "<html>Not Found</html>"), &url())
            .await
            .unwrap_err();

        assert!(
            matches!(err, NotificationError::DescriptionStatus { status: 404, .. }),
            "{err}"
        );
        assert!(cache.is_empty());
    }
}
