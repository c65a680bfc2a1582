use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::{event, instrument, Instrument, Level};
use visuasort_db::{
    cache::KEY_NAMESPACE,
    record::{NO_TAGS_TAG, TAGGING_FAILED_TAG},
    CacheBackend, ImageId, ImageRepository,
};

pub const IMAGGA_URL: &str = "https://api.imagga.com/v2/tags";
pub const HUGGINGFACE_URL: &str =
    "https://api-inference.huggingface.co/models/microsoft/resnet-50";

/// Providers return many labels; only the most confident are kept.
pub const MAX_TAGS: usize = 2;
pub const TAG_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TaggingError {
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        source: reqwest::Error,
    },

    #[error("{provider} returned status {status}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{0} returned an unexpected response")]
    InvalidResponse(&'static str),

    #[error("All tagging providers failed")]
    AllFailed,
}

/// An external image labelling service.
#[async_trait]
pub trait Tagger: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    async fn tags(&self, image: Bytes, content_type: &str) -> Result<Vec<String>, TaggingError>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            event!(Level::ERROR, error = %e, "failed to build tagging HTTP client, using defaults");
            reqwest::Client::default()
        })
}

async fn checked(
    provider: &'static str,
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<reqwest::Response, TaggingError> {
    let response = response.map_err(|source| TaggingError::Http { provider, source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(TaggingError::Status { provider, status });
    }
    Ok(response)
}

#[derive(Deserialize)]
struct ImaggaResponse {
    result: ImaggaResult,
}

#[derive(Deserialize)]
struct ImaggaResult {
    tags: Vec<ImaggaTag>,
}

#[derive(Deserialize)]
struct ImaggaTag {
    tag: ImaggaTagText,
}

#[derive(Deserialize)]
struct ImaggaTagText {
    en: Option<String>,
}

pub struct ImaggaTagger {
    client: reqwest::Client,
    url: String,
    key: String,
    secret: String,
}

impl std::fmt::Debug for ImaggaTagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImaggaTagger").field("url", &self.url).finish()
    }
}

impl ImaggaTagger {
    pub fn new(url: impl Into<String>, key: String, secret: String) -> Self {
        ImaggaTagger {
            client: http_client(),
            url: url.into(),
            key,
            secret,
        }
    }
}

#[async_trait]
impl Tagger for ImaggaTagger {
    fn name(&self) -> &'static str {
        "imagga"
    }

    async fn tags(&self, image: Bytes, _content_type: &str) -> Result<Vec<String>, TaggingError> {
        let form = reqwest::multipart::Form::new().part(
            "image",
            reqwest::multipart::Part::bytes(image.to_vec()).file_name("image.jpg"),
        );

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.key, Some(&self.secret))
            .multipart(form)
            .send()
            .await;
        let body: ImaggaResponse = checked(self.name(), response)
            .await?
            .json()
            .await
            .map_err(|_| TaggingError::InvalidResponse(self.name()))?;

        Ok(body
            .result
            .tags
            .into_iter()
            .take(MAX_TAGS)
            .filter_map(|t| t.tag.en)
            .filter(|t| !t.is_empty())
            .collect())
    }
}

#[derive(Deserialize)]
struct Classification {
    label: Option<String>,
}

pub struct HuggingFaceTagger {
    client: reqwest::Client,
    url: String,
    key: String,
}

impl std::fmt::Debug for HuggingFaceTagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceTagger")
            .field("url", &self.url)
            .finish()
    }
}

impl HuggingFaceTagger {
    pub fn new(url: impl Into<String>, key: String) -> Self {
        HuggingFaceTagger {
            client: http_client(),
            url: url.into(),
            key,
        }
    }
}

#[async_trait]
impl Tagger for HuggingFaceTagger {
    fn name(&self) -> &'static str {
        "huggingface"
    }

    async fn tags(&self, image: Bytes, content_type: &str) -> Result<Vec<String>, TaggingError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(image)
            .send()
            .await;
        let labels: Vec<Classification> = checked(self.name(), response)
            .await?
            .json()
            .await
            .map_err(|_| TaggingError::InvalidResponse(self.name()))?;

        if labels.is_empty() {
            return Err(TaggingError::InvalidResponse(self.name()));
        }

        Ok(labels
            .into_iter()
            .take(MAX_TAGS)
            .filter_map(|c| c.label)
            .filter(|l| !l.is_empty())
            .collect())
    }
}

/// Tries each provider in order and returns the first answer. Answers are
/// cached by image content, so re-enhancing an image does not ask again.
#[derive(Debug)]
pub struct TaggingService {
    providers: Vec<Box<dyn Tagger>>,
    cache: Option<Arc<dyn CacheBackend>>,
}

fn cache_key(image: &[u8]) -> String {
    format!("{KEY_NAMESPACE}ai_tags:{}", blake3::hash(image).to_hex())
}

impl TaggingService {
    pub fn new(providers: Vec<Box<dyn Tagger>>, cache: Option<Arc<dyn CacheBackend>>) -> Self {
        TaggingService { providers, cache }
    }

    pub fn providers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.iter().map(|p| p.name())
    }

    async fn cached(&self, key: &str) -> Option<Vec<String>> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(json)) => serde_json::from_str(&json).ok(),
            Ok(None) => None,
            Err(e) => {
                event!(Level::WARN, error = %e, "tag cache read failed");
                None
            }
        }
    }

    async fn remember(&self, key: &str, tags: &[String]) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let Ok(json) = serde_json::to_string(tags) else {
            return;
        };
        if let Err(e) = cache.set(key, json, TAG_CACHE_TTL).await {
            event!(Level::WARN, error = %e, "tag cache write failed");
        }
    }

    /// Tags for `image`. An empty list means no provider is configured or the
    /// provider found nothing; an error means every provider failed.
    #[instrument(skip_all, fields(bytes = image.len()))]
    pub async fn tag(&self, image: Bytes, content_type: &str) -> Result<Vec<String>, TaggingError> {
        let key = cache_key(&image);
        if let Some(tags) = self.cached(&key).await {
            event!(Level::DEBUG, "tag cache hit");
            return Ok(tags);
        }

        if self.providers.is_empty() {
            return Ok(Vec::new());
        }

        for provider in &self.providers {
            match provider.tags(image.clone(), content_type).await {
                Ok(tags) => {
                    event!(Level::INFO, provider = provider.name(), ?tags, "image tagged");
                    self.remember(&key, &tags).await;
                    return Ok(tags);
                }
                Err(e) => {
                    event!(Level::WARN, provider = provider.name(), error = %e, "tagging provider failed");
                }
            }
        }

        Err(TaggingError::AllFailed)
    }
}

/// The tags to store once tagging has finished.
pub fn final_tags(result: Result<Vec<String>, TaggingError>) -> Vec<String> {
    match result {
        Ok(tags) if tags.is_empty() => vec![NO_TAGS_TAG.to_string()],
        Ok(tags) => tags,
        Err(e) => {
            event!(Level::WARN, error = %e, "tagging failed");
            vec![TAGGING_FAILED_TAG.to_string()]
        }
    }
}

/// Tag an image in the background and write the result to its record. The
/// record shows the processing tag until this finishes.
pub fn spawn_tagging(
    tagger: Arc<TaggingService>,
    repository: ImageRepository,
    owner: String,
    id: ImageId,
    image: Bytes,
    content_type: &'static str,
) {
    let span = tracing::info_span!("tag_image", %owner, %id);
    tokio::spawn(
        async move {
            let tags = final_tags(tagger.tag(image, content_type).await);
            match repository.update_tags(&owner, &id, tags).await {
                Ok(Some(_)) => {}
                Ok(None) => event!(Level::INFO, "image was deleted before tagging finished"),
                Err(e) => event!(Level::WARN, error = %e, "failed to save tags"),
            }
        }
        .instrument(span),
    );
}
