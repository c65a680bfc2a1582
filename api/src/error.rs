use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use visuasort_db::{CacheError, ObjectIdError, StoreError};
use visuasort_http_errors::ErrorResponseData;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Server error: {0}")]
    ServerError(#[from] hyper::Error),

    #[error(transparent)]
    Convert(#[from] visuasort_convert::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] visuasort_storage::Error),

    #[error("Metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Auth(#[from] visuasort_auth::Error),

    #[error("Invalid id: {0}")]
    InvalidId(#[from] ObjectIdError),

    #[error("Image not found")]
    NotFound,

    #[error("{0} not found")]
    ObjectNotFound(&'static str),

    #[error("Access denied")]
    Forbidden,

    #[error("Admin access required")]
    AdminRequired,

    #[error("{0}")]
    BadRequest(String),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Upload is larger than the {0} byte limit")]
    RequestTooLarge(usize),

    #[error("Image processing timed out after {0} seconds")]
    Timeout(u64),

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("Image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    fn error_kind(&self) -> &'static str {
        match self {
            Error::ServerError(_) => "internal_server_error",
            Error::Convert(e) => match e {
                visuasort_convert::Error::Decode { .. } => "image_decode",
                visuasort_convert::Error::UnsupportedFormat(_) => "unsupported_image_type",
                visuasort_convert::Error::UnknownFilter(_) => "unknown_filter",
                visuasort_convert::Error::Transform { .. } => "transform",
                visuasort_convert::Error::Encode(_) => "encode",
            },
            Error::Storage(visuasort_storage::Error::NotFound(_)) => "asset_not_found",
            Error::Storage(visuasort_storage::Error::PresignedUrlNotSupported) => {
                "presign_not_supported"
            }
            Error::Storage(visuasort_storage::Error::InvalidKey(_)) => "invalid_key",
            Error::Storage(_) => "storage",
            Error::Store(StoreError::Conflict(_)) => "conflict",
            Error::Store(_) => "store_unavailable",
            Error::Cache(_) => "cache",
            Error::Auth(e) => e.error_kind(),
            Error::InvalidId(_) => "invalid_id",
            Error::NotFound => "not_found",
            Error::ObjectNotFound(_) => "not_found",
            Error::Forbidden => "forbidden",
            Error::AdminRequired => "admin_required",
            Error::BadRequest(_) => "bad_request",
            Error::Multipart(_) => "bad_request",
            Error::RequestTooLarge(_) => "request_too_large",
            Error::Timeout(_) => "processing_timeout",
            Error::ShuttingDown => "shutting_down",
            Error::Worker(_) => "internal_server_error",
            Error::IoError(_) => "internal_server_error",
        }
    }

    /// A generic summary. The full error goes in the `cause` field.
    fn message(&self) -> &'static str {
        match self {
            Error::Convert(_) | Error::Timeout(_) | Error::Worker(_) => "Image processing failed",
            Error::Storage(_) => "Asset storage failed",
            Error::Store(StoreError::Conflict(_)) => "Image already exists",
            Error::Store(_) => "Metadata store unavailable",
            Error::Cache(_) => "Cache unavailable",
            Error::Auth(_) => "Unauthorized",
            Error::NotFound | Error::ObjectNotFound(_) => "Not found",
            Error::Forbidden | Error::AdminRequired => "Forbidden",
            Error::InvalidId(_)
            | Error::BadRequest(_)
            | Error::Multipart(_)
            | Error::RequestTooLarge(_) => "Bad request",
            Error::ShuttingDown => "Service unavailable",
            Error::ServerError(_) | Error::IoError(_) => "Internal error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Convert(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Error::Convert(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Storage(visuasort_storage::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Storage(visuasort_storage::Error::PresignedUrlNotSupported) => {
                StatusCode::NOT_IMPLEMENTED
            }
            Error::Storage(visuasort_storage::Error::InvalidKey(_)) => StatusCode::BAD_REQUEST,
            Error::Storage(_) => StatusCode::BAD_GATEWAY,
            Error::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Error::Store(_) | Error::Cache(_) | Error::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Auth(e) => e.status_code(),
            Error::NotFound | Error::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden | Error::AdminRequired => StatusCode::FORBIDDEN,
            Error::InvalidId(_) | Error::BadRequest(_) | Error::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::RequestTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::ServerError(_) | Error::Worker(_) | Error::IoError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn response_tuple(&self) -> (StatusCode, ErrorResponseData) {
        (
            self.status_code(),
            ErrorResponseData::with_cause(self.error_kind(), self.message(), Some(self.to_string())),
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (code, json) = self.response_tuple();
        (code, Json(json)).into_response()
    }
}
