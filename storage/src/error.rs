use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown storage provider {0}")]
    UnknownProvider(String),

    #[error("This storage provider does not support presigned URLs")]
    PresignedUrlNotSupported,

    #[error("Object {0} not found")]
    NotFound(String),

    #[error("Invalid storage key component {0:?}")]
    InvalidKey(String),

    #[error("Storage configuration error: {0}")]
    Config(eyre::Report),

    #[error("Object store error: {0}")]
    ObjectStore(object_store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<object_store::Error> for Error {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => Error::NotFound(path),
            _ => Error::ObjectStore(e),
        }
    }
}
