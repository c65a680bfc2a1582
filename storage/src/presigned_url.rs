use std::time::Duration;

use serde::Serialize;

/// A URL that lets a client read or write one object directly.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    #[serde(serialize_with = "serialize_method")]
    pub method: http::Method,
    pub url: String,
    pub expires_in_secs: u64,
}

impl PresignedUrl {
    pub fn new(method: http::Method, url: String, expires_in: Duration) -> Self {
        PresignedUrl {
            method,
            url,
            expires_in_secs: expires_in.as_secs(),
        }
    }
}

fn serialize_method<S: serde::Serializer>(
    method: &http::Method,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(method.as_str())
}
