use std::{collections::HashMap, path::Path as FilePath, time::Duration};

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{event, instrument, Level};
use visuasort_auth::Identity;
use visuasort_convert::{source_format, EnhancementOptions, FilterKind};
use visuasort_db::{ImageId, ImageRecord, StagingId, StoreError};
use visuasort_storage::{asset_key, key_belongs_to, staging_key, Rendition};

use super::{
    file_base,
    options::{options_from_form, parse_flag, Flag, OptionsInput},
};
use crate::{
    jobs::{create_image, render, NewImage, WrittenAssets},
    shared_state::AppState,
    tagging::spawn_tagging,
    Error, Result,
};

pub const PRESIGNED_UPLOAD_TTL: Duration = Duration::from_secs(300);

const UPLOAD_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff"];

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct UploadForm {
    pub image: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    fn take_image(&mut self) -> Result<UploadedFile> {
        self.image
            .take()
            .ok_or_else(|| Error::BadRequest("No image file provided".to_string()))
    }
}

/// Read a multipart body with the file in the `image` field and the options
/// as text fields.
pub async fn read_form(mut multipart: Multipart, limit: usize) -> Result<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await?;
            if bytes.len() > limit {
                return Err(Error::RequestTooLarge(limit));
            }

            form.image = Some(UploadedFile {
                filename,
                content_type,
                bytes,
            });
        } else {
            form.fields.insert(name, field.text().await?);
        }
    }

    Ok(form)
}

#[instrument(skip(state, multipart), fields(owner = %identity.subject))]
pub async fn upload_image(
    State(state): State<AppState>,
    identity: Identity,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut form = read_form(multipart, state.max_upload_bytes).await?;
    let file = form.take_image()?;
    let options = options_from_form(&form.fields, state.strict_filters)?;
    let use_ai = form.fields.get("useAI").map_or(false, |v| parse_flag(v));

    let format = source_format(&file.bytes)?;
    event!(
        Level::INFO,
        filename = %file.filename,
        declared_type = file.content_type.as_deref().unwrap_or("none"),
        detected_type = format.content_type,
        size = file.bytes.len(),
        ?options,
        use_ai,
        "received upload"
    );

    let id = ImageId::new();
    let owner = identity.subject;
    let original_key = asset_key(&owner, &id.to_string(), Rendition::Original, format.extension)?;
    state
        .assets
        .put(&original_key, file.bytes.clone())
        .await?;

    let mut written = WrittenAssets::default();
    written.push(original_key.clone());

    let record = create_image(
        &state,
        NewImage {
            id,
            owner: owner.clone(),
            display_base: file_base(&file.filename),
            filename: file.filename,
            original_key,
            size: file.bytes.len() as u64,
            tags: ImageRecord::initial_tags(use_ai),
            options,
        },
        file.bytes.clone(),
        written,
    )
    .await?;

    if use_ai {
        spawn_tagging(
            state.tagger.clone(),
            state.repository.clone(),
            owner,
            record.id,
            file.bytes,
            format.content_type,
        );
    }

    Ok((StatusCode::ACCEPTED, Json(record)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUploadInput {
    pub filename: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUploadOutput {
    pub upload_url: String,
    pub key: String,
    pub image_id: ImageId,
    pub expires_in: u64,
}

fn upload_extension(filename: &str) -> String {
    FilePath::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| UPLOAD_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| "jpg".to_string())
}

pub async fn presigned_upload(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<PresignedUploadInput>,
) -> Result<impl IntoResponse> {
    let image_id = ImageId::new();
    let key = asset_key(
        &identity.subject,
        &image_id.to_string(),
        Rendition::Original,
        &upload_extension(&body.filename),
    )?;

    let presigned = state
        .assets
        .presign(&key, http::Method::PUT, PRESIGNED_UPLOAD_TTL)
        .await?;
    event!(Level::INFO, %key, content_type = ?body.content_type, "issued upload URL");

    Ok(Json(PresignedUploadOutput {
        upload_url: presigned.url,
        key,
        image_id,
        expires_in: presigned.expires_in_secs,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompleteInput {
    pub key: String,
    pub image_id: ImageId,
    pub filename: String,
    pub size: Option<u64>,
    #[serde(rename = "useAI")]
    pub use_ai: Option<Flag>,
    pub auto_enhance: Option<Flag>,
    pub add_watermark: Option<Flag>,
    pub apply_filter: Option<String>,
}

/// A completed upload must name the original key that [presigned_upload]
/// issued for its image id.
fn check_upload_key(owner: &str, image_id: &ImageId, key: &str) -> Result<()> {
    if !key_belongs_to(key, owner) {
        return Err(Error::Forbidden);
    }

    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| UPLOAD_EXTENSIONS.contains(ext))
        .ok_or_else(|| Error::BadRequest(format!("Unexpected upload key {key}")))?;
    let expected = asset_key(owner, &image_id.to_string(), Rendition::Original, extension)?;
    if key != expected {
        return Err(Error::BadRequest(format!(
            "Upload key {key} does not belong to image {image_id}"
        )));
    }

    Ok(())
}

/// Finish an upload that the client wrote straight to the asset store.
#[instrument(skip(state, body), fields(owner = %identity.subject, key = %body.key))]
pub async fn upload_complete(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<UploadCompleteInput>,
) -> Result<impl IntoResponse> {
    check_upload_key(&identity.subject, &body.image_id, &body.key)?;
    // Rendering writes the renditions of `image_id`, so an id that is already
    // taken must be refused before anything is written.
    if state.repository.locate(&body.image_id).await?.is_some() {
        return Err(Error::Store(StoreError::Conflict(body.image_id.to_string())));
    }

    let options = OptionsInput {
        auto_enhance: body.auto_enhance,
        add_watermark: body.add_watermark,
        apply_filter: body.apply_filter,
    }
    .resolve(&EnhancementOptions::default(), state.strict_filters)?;
    let use_ai = body.use_ai.map_or(false, |f| f.0);

    let original = state.assets.get(&body.key).await?;
    let format = source_format(&original)?;

    // The client owns the original, so only the renditions written here are
    // cleaned up on failure.
    let record = create_image(
        &state,
        NewImage {
            id: body.image_id,
            owner: identity.subject.clone(),
            display_base: file_base(&body.filename),
            filename: body.filename,
            original_key: body.key,
            size: body.size.unwrap_or(original.len() as u64),
            tags: ImageRecord::initial_tags(use_ai),
            options,
        },
        original.clone(),
        WrittenAssets::default(),
    )
    .await?;

    if use_ai {
        spawn_tagging(
            state.tagger.clone(),
            state.repository.clone(),
            identity.subject,
            record.id,
            original,
            format.content_type,
        );
    }

    Ok((StatusCode::ACCEPTED, Json(record)))
}

/// Store an upload for repeated processing by [process_staged].
pub async fn stage_image(
    State(state): State<AppState>,
    identity: Identity,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let file = read_form(multipart, state.max_upload_bytes)
        .await?
        .take_image()?;
    // Only images are staged.
    source_format(&file.bytes)?;

    let staging_id = StagingId::new();
    let key = staging_key(&identity.subject, &staging_id.to_string())?;
    state.assets.put(&key, file.bytes).await?;

    Ok((StatusCode::CREATED, Json(json!({ "imageId": staging_id }))))
}

/// Run the pipeline on a staged upload without creating a record. The staged
/// upload is kept so that it can be processed again.
#[instrument(skip(state, body), fields(owner = %identity.subject))]
pub async fn process_staged(
    State(state): State<AppState>,
    identity: Identity,
    Path(staging_id): Path<String>,
    body: Option<Json<OptionsInput>>,
) -> Result<impl IntoResponse> {
    let staging_id: StagingId = staging_id.parse()?;
    let key = staging_key(&identity.subject, &staging_id.to_string())?;

    let defaults = EnhancementOptions {
        auto_enhance: true,
        add_watermark: true,
        apply_filter: FilterKind::Dramatic,
    };
    let options = body
        .map(|Json(input)| input)
        .unwrap_or_default()
        .resolve(&defaults, state.strict_filters)?;

    let staged = match state.assets.get(&key).await {
        Ok(bytes) => bytes,
        Err(visuasort_storage::Error::NotFound(_)) => {
            return Err(Error::ObjectNotFound("Staged image"))
        }
        Err(e) => return Err(e.into()),
    };

    let renditions = render(&state, staged, options).await?;
    event!(
        Level::INFO,
        enhanced = renditions.enhanced.bytes.len(),
        thumbnail = renditions.thumbnail.bytes.len(),
        web = renditions.web.bytes.len(),
        "processed staged image"
    );

    Ok(Json(json!({
        "message": "Processing successful",
        "imageId": staging_id,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions() {
        assert_eq!(upload_extension("Beach.PNG"), "png");
        assert_eq!(upload_extension("scan.tiff"), "tiff");
        assert_eq!(upload_extension("notes.txt"), "jpg");
        assert_eq!(upload_extension("no-extension"), "jpg");
    }

    #[test]
    fn upload_keys_must_match_the_image() {
        let id = ImageId::new();
        let other = ImageId::new();
        let key = format!("alice/{id}-original.png");

        check_upload_key("alice", &id, &key).unwrap();
        assert!(matches!(
            check_upload_key("bob", &id, &key),
            Err(Error::Forbidden)
        ));
        assert!(matches!(
            check_upload_key("alice", &other, &key),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            check_upload_key("alice", &id, &format!("alice/{id}-enhanced.png")),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            check_upload_key("alice", &id, &format!("alice/{id}-original.exe")),
            Err(Error::BadRequest(_))
        ));
    }
}
