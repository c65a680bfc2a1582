use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Malformed authorization header")]
    MalformedHeader,

    #[error("Invalid username or password")]
    InvalidPassword,

    #[error("Password hasher error: {0}")]
    PasswordHasherError(String),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Token was signed by unknown key {0}")]
    UnknownKey(String),

    #[error("{0} authentication is not configured")]
    NotConfigured(&'static str),

    #[error("Invalid authentication configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::PasswordHasherError(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotConfigured(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Error::MissingCredentials => "missing_credentials",
            Error::MalformedHeader => "malformed_authorization",
            Error::InvalidPassword => "invalid_credentials",
            Error::PasswordHasherError(_) => "password_hasher",
            Error::InvalidToken(_) | Error::UnknownKey(_) => "invalid_token",
            Error::NotConfigured(_) => "auth_not_configured",
            Error::Config(_) => "auth_config",
        }
    }
}
