use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Response,
};
use serde::{Deserialize, Serialize};
use visuasort_http_errors::ErrorResponseData;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// The authenticated caller of a request. `subject` is used verbatim as the
/// owner of the images the caller uploads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub role: Role,
}

impl Identity {
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Identity {
            subject: subject.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether this identity may read or change records belonging to `owner`.
    pub fn can_access(&self, owner: &str) -> bool {
        self.subject == owner || self.is_admin()
    }
}

pub(crate) fn unauthorized(kind: &'static str, cause: Option<String>) -> Response {
    ErrorResponseData::with_cause(kind, "Unauthorized", cause)
        .into_response_with(StatusCode::UNAUTHORIZED)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| unauthorized("missing_credentials", None))
    }
}
