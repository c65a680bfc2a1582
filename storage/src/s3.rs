use http::{
    uri::{Authority, Scheme},
    Uri,
};
use object_store::{aws::AmazonS3, path::Path, ClientOptions};
use tracing::{event, Level};

use crate::key::CONTENT_TYPES;

#[derive(Debug, Clone, Default)]
pub struct S3ProviderConfig {
    pub endpoint: Option<Uri>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_key: Option<String>,
    pub virtual_host_style: Option<bool>,
}

/// Split `bucket/some/prefix` into the bucket name and an optional path prefix.
pub(crate) fn split_base_location(base_location: &str) -> (&str, Option<Path>) {
    match base_location.split_once('/') {
        Some((bucket, prefix)) if !prefix.trim_matches('/').is_empty() => {
            (bucket, Some(Path::from(prefix.trim_matches('/'))))
        }
        Some((bucket, _)) => (bucket, None),
        None => (base_location, None),
    }
}

fn endpoint_url(endpoint: &Uri, bucket: &str, virtual_host_style: bool) -> Result<String, eyre::Report> {
    let parts = endpoint.to_owned().into_parts();
    let authority = parts
        .authority
        .ok_or_else(|| eyre::eyre!("S3 endpoint {endpoint} has no host"))?;
    let scheme = parts.scheme.unwrap_or(Scheme::HTTPS);

    let url = if virtual_host_style {
        // object_store expects the bucket to be part of the host in this mode.
        let host = format!("{}.{}", bucket, authority.as_str()).parse::<Authority>()?;
        format!("{}://{}", scheme.as_str(), host)
    } else {
        format!("{}://{}", scheme.as_str(), authority)
    };

    Ok(url)
}

/// Uploads carry the content type of their key's extension, which presigned
/// GETs then serve.
fn client_options() -> ClientOptions {
    CONTENT_TYPES
        .iter()
        .fold(ClientOptions::new(), |options, (extension, content_type)| {
            options.with_content_type_for_suffix(*extension, *content_type)
        })
}

/// Build the S3 client for `base_location`, which is a bucket name optionally
/// followed by a path prefix.
pub(crate) fn create_store(
    config: &S3ProviderConfig,
    base_location: &str,
) -> Result<(AmazonS3, Option<Path>), eyre::Report> {
    let virtual_host_style = config.virtual_host_style.unwrap_or(false);

    let (bucket, prefix) = split_base_location(base_location);
    if bucket.is_empty() {
        return Err(eyre::eyre!("an S3 bucket name is required"));
    }

    // Replaces any client options read from the environment, so it goes first.
    let mut builder = object_store::aws::AmazonS3Builder::from_env()
        .with_client_options(client_options())
        .with_virtual_hosted_style_request(virtual_host_style)
        .with_bucket_name(bucket);

    match (config.access_key_id.as_ref(), config.secret_key.as_ref()) {
        (Some(access_key_id), Some(secret_key)) => {
            builder = builder
                .with_access_key_id(access_key_id.as_str())
                .with_secret_access_key(secret_key.as_str());
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(eyre::eyre!(
                "access_key_id and secret_key must be both set or both unset"
            ))
        }
        (None, None) => {}
    };

    if let Some(endpoint) = config.endpoint.as_ref() {
        let url = endpoint_url(endpoint, bucket, virtual_host_style)?;
        event!(Level::DEBUG, endpoint=%url, "Creating S3 store with custom endpoint");
        builder = builder
            .with_allow_http(url.starts_with("http://"))
            .with_endpoint(url);
    }

    if let Some(region) = config.region.as_ref() {
        builder = builder.with_region(region.as_str());
    }

    Ok((builder.build()?, prefix))
}
