use std::io::Write;

use image::{buffer::ConvertBuffer, ColorType, ImageEncoder, RgbImage, RgbaImage};
use thiserror::Error;

/// An encoded output format and, where the codec supports it, its quality (0-100).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg(u8),
    WebP(u8),
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg(_) => "jpg",
            OutputFormat::WebP(_) => "webp",
            OutputFormat::Png => "png",
        }
    }
}

fn is_opaque(image: &RgbaImage) -> bool {
    image.pixels().all(|p| p[3] == u8::MAX)
}

fn write_png(image: &RgbaImage, writer: impl Write) -> Result<(), image::ImageError> {
    let encoder = image::codecs::png::PngEncoder::new_with_quality(
        writer,
        image::codecs::png::CompressionType::Best,
        image::codecs::png::FilterType::Adaptive,
    );

    let (width, height) = image.dimensions();
    encoder.write_image(image.as_raw(), width, height, ColorType::Rgba8)
}

fn write_webp(image: &RgbaImage, quality: u8, mut writer: impl Write) -> Result<(), std::io::Error> {
    let (width, height) = image.dimensions();
    let output = if is_opaque(image) {
        let rgb: RgbImage = image.convert();
        webp::Encoder::new(rgb.as_raw(), webp::PixelLayout::Rgb, width, height)
            .encode(quality as f32)
    } else {
        webp::Encoder::new(image.as_raw(), webp::PixelLayout::Rgba, width, height)
            .encode(quality as f32)
    };

    writer.write_all(&output)
}

/// JPEG has no alpha channel, so the image is flattened to RGB first.
fn write_jpeg(image: &RgbaImage, quality: u8, mut writer: impl Write) -> Result<(), image::ImageError> {
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, quality);
    let rgb: RgbImage = image.convert();
    let (width, height) = rgb.dimensions();

    encoder.write_image(rgb.as_raw(), width, height, ColorType::Rgb8)
}

pub fn write_image(
    image: &RgbaImage,
    output_format: OutputFormat,
    writer: impl Write,
) -> Result<(), EncodeError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EncodeError::EmptyImage);
    }

    match output_format {
        OutputFormat::Png => write_png(image, writer)?,
        OutputFormat::WebP(quality) => write_webp(image, quality, writer)?,
        OutputFormat::Jpeg(quality) => write_jpeg(image, quality, writer)?,
    };

    Ok(())
}

pub fn encode(image: &RgbaImage, output_format: OutputFormat) -> Result<Vec<u8>, EncodeError> {
    let mut output = Vec::new();
    write_image(image, output_format, &mut output)?;
    Ok(output)
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    ImageError(image::ImageError),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Cannot encode an image with no pixels")]
    EmptyImage,
}

impl From<image::ImageError> for EncodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => EncodeError::IoError(e),
            _ => EncodeError::ImageError(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::gradient;

    fn check(format: OutputFormat, expected: imageinfo::ImageFormat) {
        let image = gradient(64, 40);
        let output = encode(&image, format).unwrap();

        let info = imageinfo::ImageInfo::from_raw_data(&output).expect("Reading image");
        assert_eq!(info.format, expected);
        assert_eq!(info.size.width as u32, image.width());
        assert_eq!(info.size.height as u32, image.height());
    }

    #[test]
    fn write_png() {
        check(OutputFormat::Png, imageinfo::ImageFormat::PNG);
    }

    #[test]
    fn write_webp() {
        check(OutputFormat::WebP(85), imageinfo::ImageFormat::WEBP);
    }

    #[test]
    fn write_jpeg() {
        check(OutputFormat::Jpeg(90), imageinfo::ImageFormat::JPEG);
    }

    #[test]
    fn png_is_lossless() {
        let image = gradient(33, 17);
        let output = encode(&image, OutputFormat::Png).unwrap();
        let decoded = image::load_from_memory(&output).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn jpeg_quality_changes_size() {
        let image = gradient(128, 128);
        let low = encode(&image, OutputFormat::Jpeg(20)).unwrap();
        let high = encode(&image, OutputFormat::Jpeg(95)).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn empty_image_fails() {
        let err = encode(&RgbaImage::new(0, 0), OutputFormat::Png).unwrap_err();
        assert!(matches!(err, EncodeError::EmptyImage));
    }
}
