use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::{event, Level};

/// The JSON body of every error returned over HTTP:
/// `{"error": {"kind": ..., "message": ..., "cause": ...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseData {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub kind: Cow<'static, str>,
    pub message: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorResponseData {
    pub fn new(
        kind: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> ErrorResponseData {
        Self::with_cause(kind, message, None)
    }

    pub fn with_cause(
        kind: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
        cause: Option<String>,
    ) -> ErrorResponseData {
        let ret = ErrorResponseData {
            error: ErrorDetails {
                kind: kind.into(),
                message: message.into(),
                cause,
            },
        };

        event!(
            Level::ERROR,
            kind=%ret.error.kind,
            message=%ret.error.message,
            cause=?ret.error.cause
        );

        ret
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_shape() {
        let data = ErrorResponseData::with_cause(
            "image_decode",
            "Upload failed",
            Some("unsupported format".to_string()),
        );
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["error"]["kind"], "image_decode");
        assert_eq!(value["error"]["message"], "Upload failed");
        assert_eq!(value["error"]["cause"], "unsupported format");
    }

    #[test]
    fn cause_is_omitted_when_absent() {
        let value = serde_json::to_value(ErrorResponseData::new("not_found", "Not found")).unwrap();
        assert!(value["error"].get("cause").is_none());
    }
}
