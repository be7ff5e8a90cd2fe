//! The fetch capability consumed by the client.
//!
//! Authentication is somebody else's problem: the client only ever sees an
//! implementation of [`Fetch`], which is expected to attach whatever
//! credentials the server under test needs.

use std::borrow::Cow;
use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
#[error("{method} {url} failed")]
pub struct FetchError {
    pub method: Method,
    pub url: Url,
    #[source]
    pub source: BoxError,
}

impl FetchError {
    pub fn new(method: Method, url: Url, source: impl Into<BoxError>) -> Self {
        Self {
            method,
            url,
            source: source.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl FetchRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A `POST` carrying `body` as JSON and asking for JSON back.
    pub fn post_json<T: Serialize>(url: Url, body: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(body)?;

        Ok(Self::new(Method::POST, url)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_header(ACCEPT, HeaderValue::from_static("application/json"))
            .with_body(body))
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        drop(self.headers.insert(name, value));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Something that can perform an HTTP exchange on behalf of the client.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`Fetch`] over a plain [`reqwest::Client`], adding a fixed set of headers
/// (typically `Cookie` or `Authorization`) to every request.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    headers: HeaderMap,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        let _ = self.headers.append(name, value);
        self
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let FetchRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(self.headers.clone())
            .headers(headers);

        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::new(method.clone(), url.clone(), err))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::new(method, url, err))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
