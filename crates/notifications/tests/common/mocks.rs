//! Scripted [`Fetch`] implementation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use conformance_notifications::{Fetch, FetchError, FetchRequest, FetchResponse, Url};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

/// A request the client made.
#[derive(Clone, Debug)]
pub struct Call {
    pub method: Method,
    pub url: Url,
    pub body: Option<Bytes>,
}

impl Call {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(self.body.as_deref().unwrap_or_default()).unwrap()
    }
}

#[derive(Clone, Debug)]
struct Canned {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// Answers requests from a table keyed by method and URL. Anything not in
/// the table fails as a transport error.
#[derive(Clone, Debug, Default)]
pub struct MockFetch {
    routes: Arc<Mutex<HashMap<(Method, String), Canned>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockFetch {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&self, method: Method, url: &str, canned: Canned) -> &Self {
        let _ = self
            .routes
            .lock()
            .unwrap()
            .insert((method, url.to_owned()), canned);
        self
    }

    /// `HEAD` answered with the given headers.
    pub fn on_head(&self, url: &str, headers: &[(&str, &str)]) -> &Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }

        self.route(
            Method::HEAD,
            url,
            Canned {
                status: StatusCode::OK,
                headers: map,
                body: Bytes::new(),
            },
        )
    }

    pub fn on_get(&self, url: &str, body: &serde_json::Value) -> &Self {
        self.route(
            Method::GET,
            url,
            Canned {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from(body.to_string()),
            },
        )
    }

    pub fn on_get_status(&self, url: &str, status: u16, body: &str) -> &Self {
        self.route(
            Method::GET,
            url,
            Canned {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body: Bytes::from(body.to_owned()),
            },
        )
    }

    pub fn on_post(&self, url: &str, status: u16, body: &str) -> &Self {
        self.route(
            Method::POST,
            url,
            Canned {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                body: Bytes::from(body.to_owned()),
            },
        )
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with(&self, method: &Method) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == *method)
            .collect()
    }
}

#[async_trait]
impl Fetch for MockFetch {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(Call {
            method: request.method.clone(),
            url: request.url.clone(),
            body: request.body.clone(),
        });

        let canned = self
            .routes
            .lock()
            .unwrap()
            .get(&(request.method.clone(), request.url.to_string()))
            .cloned();

        match canned {
            Some(canned) => Ok(FetchResponse::new(canned.status, canned.headers, canned.body)),
            None => Err(FetchError::new(
                request.method,
                request.url,
                "no canned response",
            )),
        }
    }
}
