//! Shared fixtures for the client tests: a scripted fetcher, a local socket
//! server and throwaway TLS material.

pub mod mocks;
pub mod server;

use conformance_notifications::{TlsMaterial, Url};
use tracing_subscriber::EnvFilter;

pub const RESOURCE: &str = "https://pod.example/foo/bar.txt";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn resource() -> Url {
    RESOURCE.parse().unwrap()
}

pub fn url(s: &str) -> Url {
    s.parse().unwrap()
}

/// A self-signed certificate for `localhost` and `127.0.0.1`.
pub fn self_signed() -> TlsMaterial {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_owned(),
        "127.0.0.1".to_owned(),
    ])
    .unwrap();

    TlsMaterial::new(
        certified.cert.pem().into_bytes(),
        certified.key_pair.serialize_pem().into_bytes(),
    )
}

/// Description document with one declaration per `(type, subscription)`.
pub fn description(declarations: &[(&str, &str)]) -> serde_json::Value {
    let channels: Vec<_> = declarations
        .iter()
        .map(|(ty, subscription)| {
            serde_json::json!({
                "id": format!("#{ty}"),
                "type": ty,
                "subscription": subscription,
            })
        })
        .collect();

    serde_json::json!({
        "@context": ["https://www.w3.org/ns/solid/notification/v1"],
        "id": "",
        "notificationChannel": channels,
    })
}
