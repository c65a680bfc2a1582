use std::{path::Path as FilePath, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{event, instrument, Level};
use visuasort_auth::Identity;
use visuasort_db::{
    record::PROCESSING_TAG, FilterSet, ImageId, ImagePatch, ImageRecord, Page, PageRequest,
    Pagination, SortField, SortOrder,
};
use visuasort_storage::{content_type_for_key, Rendition};

use crate::{
    jobs::{create_image, NewImage, WrittenAssets},
    shared_state::{AppState, InnerState},
    tagging::spawn_tagging,
    Error, Result,
};

mod options;
mod upload;

use options::OptionsInput;

pub const PRESIGNED_DOWNLOAD_TTL: Duration = Duration::from_secs(300);

/// Upload names sometimes carry a numeric timestamp prefix, as in
/// `1700000000-beach.jpg`.
static TIMESTAMP_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+-").expect("timestamp prefix pattern"));

/// The file name without directory or extension.
pub(crate) fn file_base(filename: &str) -> String {
    FilePath::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// [file_base] without a leading timestamp.
pub(crate) fn clean_base(filename: &str) -> String {
    TIMESTAMP_PREFIX
        .replace(&file_base(filename), "")
        .into_owned()
}

fn bad_request(e: String) -> Error {
    Error::BadRequest(e)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Query parameters shared by the listing endpoints. Each endpoint reads the
/// ones it understands.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub query: Option<String>,
    pub size_range: Option<String>,
    pub date_range: Option<String>,
    pub caption_category: Option<String>,
    pub owner: Option<String>,
}

impl ImageQuery {
    fn page_request(&self) -> Result<PageRequest> {
        let sort = match self.sort.as_deref() {
            Some(s) => s.parse::<SortField>().map_err(bad_request)?,
            None => SortField::default(),
        };
        let order = match self.order.as_deref() {
            Some(s) => s.parse::<SortOrder>().map_err(bad_request)?,
            None => SortOrder::default(),
        };

        let defaults = PageRequest::default();
        Ok(PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.limit.unwrap_or(defaults.limit),
            sort,
            order,
        ))
    }

    fn filters(&self) -> Result<FilterSet> {
        Ok(FilterSet {
            size_range: non_empty(&self.size_range)
                .map(str::parse)
                .transpose()
                .map_err(bad_request)?,
            date_range: non_empty(&self.date_range)
                .map(str::parse)
                .transpose()
                .map_err(bad_request)?,
            caption_category: non_empty(&self.caption_category).map(str::to_string),
            owner: non_empty(&self.owner).map(str::to_string),
        })
    }
}

#[derive(Debug, Serialize)]
struct SortInfo {
    field: SortField,
    order: SortOrder,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    data: Vec<ImageRecord>,
    pagination: Pagination,
    sort: SortInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<FilterSet>,
}

impl ListResponse {
    fn new(page: Page<ImageRecord>, request: &PageRequest) -> Self {
        ListResponse {
            data: page.data,
            pagination: page.pagination,
            sort: SortInfo {
                field: request.sort,
                order: request.order,
            },
            query: None,
            filters: None,
        }
    }
}

fn require_admin(identity: &Identity) -> Result<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(Error::AdminRequired)
    }
}

/// Look up a record for `identity`: 404 if it does not exist, 403 if it
/// belongs to someone else and the caller is not an admin.
async fn accessible_record(
    state: &InnerState,
    identity: &Identity,
    id: &ImageId,
) -> Result<ImageRecord> {
    if let Some(record) = state.repository.get_by_id(&identity.subject, id).await? {
        return Ok(record);
    }

    let record = state.repository.locate(id).await?.ok_or(Error::NotFound)?;
    if identity.can_access(&record.owner) {
        Ok(record)
    } else {
        Err(Error::Forbidden)
    }
}

/// Delete a record and then its assets. The original is kept while another
/// record still refers to it.
async fn remove_image(state: &InnerState, record: &ImageRecord) -> Result<()> {
    state.repository.delete(&record.owner, &record.id).await?;

    let mut assets = WrittenAssets::default();
    assets.push(record.enhanced_key.clone());
    assets.push(record.thumbnail_key.clone());
    assets.push(record.web_key.clone());
    if !state
        .repository
        .original_in_use(&record.owner, &record.original_key)
        .await?
    {
        assets.push(record.original_key.clone());
    }

    assets.discard(state.assets.as_ref()).await;
    Ok(())
}

async fn list_images(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse> {
    let request = query.page_request()?;
    let page = state
        .repository
        .list_by_owner(&identity.subject, &request)
        .await?;
    Ok(Json(ListResponse::new(page, &request)))
}

async fn search_images(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse> {
    let text = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::BadRequest("Missing query parameter".to_string()))?
        .to_string();

    let request = query.page_request()?;
    let page = state
        .repository
        .search(&identity.subject, &text, &request)
        .await?;

    let mut response = ListResponse::new(page, &request);
    response.query = Some(text);
    Ok(Json(response))
}

/// Admins filter across all owners, optionally narrowed with `owner`.
/// Everyone else only ever sees their own images.
async fn filter_images(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse> {
    let request = query.page_request()?;
    let mut filters = query.filters()?;

    let scope = if identity.is_admin() {
        None
    } else {
        filters.owner = None;
        Some(identity.subject.as_str())
    };

    let page = state.repository.filter(scope, &filters, &request).await?;

    let mut response = ListResponse::new(page, &request);
    response.filters = Some(filters);
    Ok(Json(response))
}

async fn tag_categories(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse> {
    let tags = state.repository.distinct_tags(&identity.subject).await?;
    Ok(Json(tags))
}

async fn list_all_images(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ImageQuery>,
) -> Result<impl IntoResponse> {
    require_admin(&identity)?;
    let request = query.page_request()?;
    let page = state.repository.list_all(&request).await?;
    Ok(Json(ListResponse::new(page, &request)))
}

#[instrument(skip(state))]
async fn admin_delete_image(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    require_admin(&identity)?;
    let id: ImageId = id.parse()?;
    let record = state.repository.locate(&id).await?.ok_or(Error::NotFound)?;
    remove_image(&state, &record).await?;

    event!(Level::INFO, owner = %record.owner, %id, "image deleted by admin");
    Ok(Json(json!({
        "message": format!("Image deleted by admin from user: {}", record.owner)
    })))
}

async fn get_image(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id: ImageId = id.parse()?;
    let record = accessible_record(&state, &identity, &id).await?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagsInput {
    One(String),
    Many(Vec<String>),
}

impl From<TagsInput> for Vec<String> {
    fn from(tags: TagsInput) -> Self {
        match tags {
            TagsInput::One(tag) => vec![tag],
            TagsInput::Many(tags) => tags,
        }
    }
}

/// Body of PUT and PATCH. Fields other than these are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateInput {
    display_name: Option<String>,
    tags: Option<TagsInput>,
}

impl From<UpdateInput> for ImagePatch {
    fn from(input: UpdateInput) -> Self {
        ImagePatch {
            display_name: input.display_name,
            tags: input.tags.map(Vec::from),
        }
    }
}

async fn apply_update(
    state: &InnerState,
    identity: &Identity,
    id: &str,
    patch: ImagePatch,
) -> Result<ImageRecord> {
    let id: ImageId = id.parse()?;
    let record = accessible_record(state, identity, &id).await?;
    state
        .repository
        .update(&record.owner, &id, patch)
        .await?
        .ok_or(Error::NotFound)
}

async fn update_image(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(body): Json<UpdateInput>,
) -> Result<impl IntoResponse> {
    let record = apply_update(&state, &identity, &id, body.into()).await?;
    Ok(Json(record))
}

async fn patch_image(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(body): Json<UpdateInput>,
) -> Result<impl IntoResponse> {
    let patch = ImagePatch::from(body);
    if patch.is_empty() {
        return Err(Error::BadRequest("No valid fields to update".to_string()));
    }

    let record = apply_update(&state, &identity, &id, patch).await?;
    Ok(Json(record))
}

#[instrument(skip(state))]
async fn delete_image(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let id: ImageId = id.parse()?;
    let record = accessible_record(&state, &identity, &id).await?;
    remove_image(&state, &record).await?;
    Ok(Json(json!({ "message": "Image deleted successfully" })))
}

/// Create a new record from an existing image's original with a new set of
/// enhancements. The source record is left alone.
#[instrument(skip(state, body))]
async fn reenhance_image(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    body: Option<Json<OptionsInput>>,
) -> Result<impl IntoResponse> {
    let id: ImageId = id.parse()?;
    let source = accessible_record(&state, &identity, &id).await?;
    let options = body
        .map(|Json(input)| input)
        .unwrap_or_default()
        .resolve(&Default::default(), state.strict_filters)?;

    let original = state.assets.get(&source.original_key).await?;

    // A copy of "processing..." would never be replaced, so the new record
    // gets its own tagging run instead.
    let retag = source.is_processing();
    let record = create_image(
        &state,
        NewImage {
            id: ImageId::new(),
            owner: source.owner.clone(),
            filename: source.filename.clone(),
            display_base: clean_base(&source.filename),
            original_key: source.original_key.clone(),
            size: source.size,
            tags: if retag {
                vec![PROCESSING_TAG.to_string()]
            } else {
                source.tags.clone()
            },
            options,
        },
        original.clone(),
        WrittenAssets::default(),
    )
    .await?;

    if retag {
        let content_type = visuasort_convert::source_format(&original)
            .map(|f| f.content_type)
            .unwrap_or("application/octet-stream");
        spawn_tagging(
            state.tagger.clone(),
            state.repository.clone(),
            record.owner.clone(),
            record.id,
            original,
            content_type,
        );
    }

    Ok((StatusCode::CREATED, Json(record)))
}

fn rendition_key(record: &ImageRecord, rendition: Rendition) -> &str {
    match rendition {
        Rendition::Original => &record.original_key,
        Rendition::Enhanced => &record.enhanced_key,
        Rendition::Thumbnail => &record.thumbnail_key,
        Rendition::Web => &record.web_key,
    }
}

fn parse_rendition(name: &str) -> Result<Rendition> {
    name.parse()
        .map_err(|_| Error::BadRequest(format!("Unknown rendition {name}")))
}

async fn image_content(
    State(state): State<AppState>,
    identity: Identity,
    Path((id, rendition)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let id: ImageId = id.parse()?;
    let rendition = parse_rendition(&rendition)?;
    let record = accessible_record(&state, &identity, &id).await?;

    let key = rendition_key(&record, rendition);
    let bytes = state.assets.get(key).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for_key(key))], bytes))
}

#[derive(Debug, Deserialize)]
struct PresignedUrlQuery {
    rendition: Option<String>,
}

async fn presigned_url(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Query(query): Query<PresignedUrlQuery>,
) -> Result<impl IntoResponse> {
    let id: ImageId = id.parse()?;
    let rendition = match query.rendition.as_deref() {
        Some(name) => parse_rendition(name)?,
        None => Rendition::Enhanced,
    };
    let record = accessible_record(&state, &identity, &id).await?;

    let presigned = state
        .assets
        .presign(
            rendition_key(&record, rendition),
            http::Method::GET,
            PRESIGNED_DOWNLOAD_TTL,
        )
        .await?;

    Ok(Json(json!({
        "url": presigned.url,
        "rendition": rendition.as_str(),
        "expiresIn": presigned.expires_in_secs,
    })))
}

pub fn configure() -> Router<AppState> {
    Router::new()
        .route("/", get(list_images))
        .route("/upload", post(upload::upload_image))
        .route("/presigned-upload", post(upload::presigned_upload))
        .route("/upload-complete", post(upload::upload_complete))
        .route("/search", get(search_images))
        .route("/filter", get(filter_images))
        .route("/categories", get(tag_categories))
        .route("/admin/all", get(list_all_images))
        .route("/admin/:id", delete(admin_delete_image))
        .route("/stage", post(upload::stage_image))
        .route("/process/:staging_id", post(upload::process_staged))
        .route(
            "/:id",
            get(get_image)
                .put(update_image)
                .patch(patch_image)
                .delete(delete_image),
        )
        .route("/:id/enhance", post(reenhance_image))
        .route("/:id/presigned-url", get(presigned_url))
        .route("/:id/content/:rendition", get(image_content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_bases() {
        assert_eq!(file_base("beach.jpg"), "beach");
        assert_eq!(file_base("holiday.photo.png"), "holiday.photo");
        assert_eq!(clean_base("1700000000-beach.jpg"), "beach");
        assert_eq!(clean_base("2024-trip.jpg"), "trip");
        assert_eq!(clean_base("beach-2024.jpg"), "beach-2024");
    }

    #[test]
    fn query_parsing() {
        let query = ImageQuery {
            page: Some(0),
            limit: Some(500),
            sort: Some("size".to_string()),
            order: Some("asc".to_string()),
            size_range: Some("large".to_string()),
            caption_category: Some("  ".to_string()),
            ..Default::default()
        };
        let request = query.page_request().unwrap();
        assert_eq!(request.page, 1);
        assert_eq!(request.limit, visuasort_db::query::MAX_PAGE_SIZE);
        assert_eq!(request.sort, SortField::Size);
        assert_eq!(request.order, SortOrder::Asc);

        let filters = query.filters().unwrap();
        assert!(filters.size_range.is_some());
        assert_eq!(filters.caption_category, None);

        let bad = ImageQuery {
            sort: Some("colour".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad.page_request(), Err(Error::BadRequest(_))));
    }

    #[test]
    fn tags_input() {
        let one: UpdateInput = serde_json::from_str(r#"{"tags": "sunset"}"#).unwrap();
        let patch = ImagePatch::from(one);
        assert_eq!(patch.tags, Some(vec!["sunset".to_string()]));

        let many: UpdateInput =
            serde_json::from_str(r#"{"tags": ["a", "b"], "owner": "mallory"}"#).unwrap();
        assert_eq!(ImagePatch::from(many).tags.map(|t| t.len()), Some(2));

        let none: UpdateInput = serde_json::from_str(r#"{"size": 5}"#).unwrap();
        assert!(ImagePatch::from(none).is_empty());
    }
}
