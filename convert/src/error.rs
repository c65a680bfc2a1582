use thiserror::Error;

use crate::EncodeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Decoding {format:?}: {error}")]
    Decode {
        format: Option<imageinfo::ImageFormat>,
        error: eyre::Report,
    },

    #[error("Unsupported image format {0:?}")]
    UnsupportedFormat(imageinfo::ImageFormat),

    #[error("{step} failed: {message}")]
    Transform { step: &'static str, message: String },

    #[error("Unknown filter {0}")]
    UnknownFilter(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl Error {
    pub fn decode_error(format: Option<imageinfo::ImageFormat>, e: impl Into<eyre::Report>) -> Self {
        Self::Decode {
            format,
            error: e.into(),
        }
    }

    pub fn transform_error(step: &'static str, message: impl Into<String>) -> Self {
        Self::Transform {
            step,
            message: message.into(),
        }
    }

    /// True when the input bytes themselves were at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::UnsupportedFormat(_) | Self::UnknownFilter(_)
        )
    }
}
