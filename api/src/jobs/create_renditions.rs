use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use tracing::{event, instrument, Level};
use visuasort_convert::{self as convert, EnhancementOptions, Renditions};
use visuasort_db::{ImageId, ImageRecord};
use visuasort_storage::{self as storage, AssetStore};

use crate::{shared_state::InnerState, Result};

/// Keys of assets written while handling one request. If the request fails
/// they are removed again, since no record will ever point at them.
#[derive(Debug, Default)]
pub struct WrittenAssets {
    keys: Vec<String>,
}

impl WrittenAssets {
    pub fn push(&mut self, key: String) {
        self.keys.push(key);
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Best-effort; failures are logged and otherwise ignored.
    pub async fn discard(self, assets: &dyn AssetStore) {
        for key in self.keys {
            match assets.delete(&key).await {
                Ok(()) => event!(Level::DEBUG, %key, "removed orphaned asset"),
                Err(e) => event!(Level::WARN, %key, error = %e, "failed to remove orphaned asset"),
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRenditions {
    pub enhanced_key: String,
    pub thumbnail_key: String,
    pub web_key: String,
}

/// Everything needed to create a record apart from the rendition keys.
#[derive(Debug)]
pub struct NewImage {
    pub id: ImageId,
    pub owner: String,
    pub filename: String,
    /// The name shown before the list of applied enhancements.
    pub display_base: String,
    pub original_key: String,
    pub size: u64,
    pub tags: Vec<String>,
    pub options: EnhancementOptions,
}

/// Run the enhancement pipeline on a worker.
pub async fn render(
    state: &InnerState,
    original: Bytes,
    options: EnhancementOptions,
) -> Result<Renditions> {
    let config = state.pipeline.clone();
    state
        .workers
        .run(move || Ok(convert::enhance(&original, &options, &config)?))
        .await
}

/// Write the three renditions concurrently. Every successful write is added
/// to `written`, even when another write fails.
#[instrument(skip(assets, renditions, written))]
pub async fn store_renditions(
    assets: &dyn AssetStore,
    owner: &str,
    id: &ImageId,
    renditions: Renditions,
    written: &mut WrittenAssets,
) -> Result<StoredRenditions> {
    let id = id.to_string();
    let key = |rendition, output: &convert::Rendition| {
        storage::asset_key(owner, &id, rendition, output.format.extension())
    };

    let enhanced_key = key(storage::Rendition::Enhanced, &renditions.enhanced)?;
    let thumbnail_key = key(storage::Rendition::Thumbnail, &renditions.thumbnail)?;
    let web_key = key(storage::Rendition::Web, &renditions.web)?;

    let writes = [
        (&enhanced_key, renditions.enhanced),
        (&thumbnail_key, renditions.thumbnail),
        (&web_key, renditions.web),
    ]
    .map(|(key, output)| async move {
        let result = assets.put(key, Bytes::from(output.bytes)).await;
        (key, result)
    });

    let mut first_error = None;
    for (key, result) in join_all(writes).await {
        match result {
            Ok(_) => written.push(key.clone()),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e.into());
    }

    Ok(StoredRenditions {
        enhanced_key,
        thumbnail_key,
        web_key,
    })
}

/// Render `original`, store the renditions and create the record. If any
/// step fails, every asset in `written` is removed, including the ones the
/// caller wrote before calling this.
#[instrument(skip(state, original, written), fields(id = %image.id, owner = %image.owner))]
pub async fn create_image(
    state: &InnerState,
    image: NewImage,
    original: Bytes,
    mut written: WrittenAssets,
) -> Result<ImageRecord> {
    match render_and_record(state, image, original, &mut written).await {
        Ok(record) => Ok(record),
        Err(e) => {
            event!(Level::WARN, error = %e, assets = written.keys().len(), "image creation failed");
            written.discard(state.assets.as_ref()).await;
            Err(e)
        }
    }
}

async fn render_and_record(
    state: &InnerState,
    image: NewImage,
    original: Bytes,
    written: &mut WrittenAssets,
) -> Result<ImageRecord> {
    let renditions = render(state, original, image.options.clone()).await?;
    let stored =
        store_renditions(state.assets.as_ref(), &image.owner, &image.id, renditions, written)
            .await?;

    let record = ImageRecord {
        id: image.id,
        display_name: image.options.display_name(&image.display_base),
        has_enhancements: image.options.has_enhancements(),
        owner: image.owner,
        filename: image.filename,
        original_key: image.original_key,
        enhanced_key: stored.enhanced_key,
        thumbnail_key: stored.thumbnail_key,
        web_key: stored.web_key,
        tags: image.tags,
        size: image.size,
        upload_date: Utc::now(),
    };

    Ok(state.repository.create(record).await?)
}
