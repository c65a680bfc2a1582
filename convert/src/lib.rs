use image::DynamicImage;
use imageinfo::{ImageFormat, ImageInfo};

pub use enhance::auto_enhance;
pub use error::Error;
pub use filter::{apply_filter, FilterKind};
pub use ops::{Kernel, Modulation, Sharpen};
pub use pass::{ProcessingProfile, Step};
pub use pipeline::{enhance, EnhancementOptions, PipelineConfig, Rendition, Renditions};
pub use watermark::{add_watermark, WatermarkLayout, DEFAULT_WATERMARK_TEXT};
pub use write_format::{encode, EncodeError, OutputFormat};

pub mod enhance;
mod error;
pub mod filter;
pub mod ops;
pub mod orientation;
pub mod pass;
pub mod pipeline;
pub mod resize;
pub mod watermark;
pub mod write_format;

/// An uploaded image format that the pipeline knows how to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceFormat {
    pub extension: &'static str,
    pub content_type: &'static str,
}

/// Sniff the format of an upload from its header bytes.
pub fn source_format(bytes: &[u8]) -> Result<SourceFormat, Error> {
    let info = ImageInfo::from_raw_data(bytes).map_err(|e| Error::decode_error(None, e))?;
    let (extension, content_type) = match info.format {
        ImageFormat::JPEG => ("jpg", "image/jpeg"),
        ImageFormat::PNG => ("png", "image/png"),
        ImageFormat::WEBP => ("webp", "image/webp"),
        ImageFormat::GIF => ("gif", "image/gif"),
        ImageFormat::BMP => ("bmp", "image/bmp"),
        ImageFormat::TIFF => ("tiff", "image/tiff"),
        other => return Err(Error::UnsupportedFormat(other)),
    };

    Ok(SourceFormat {
        extension,
        content_type,
    })
}

pub fn image_from_bytes(bytes: &[u8]) -> Result<DynamicImage, Error> {
    image::load_from_memory(bytes).map_err(|e| {
        let format = ImageInfo::from_raw_data(bytes).ok().map(|info| info.format);
        Error::decode_error(format, e)
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png() {
        let bytes = test_util::png_bytes(&test_util::gradient(16, 8));
        let format = source_format(&bytes).unwrap();
        assert_eq!(format.extension, "png");
        assert_eq!(format.content_type, "image/png");
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = image_from_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(err.is_client_error());

        let err = source_format(b"definitely not an image").unwrap_err();
        assert!(err.is_client_error());
    }
}
