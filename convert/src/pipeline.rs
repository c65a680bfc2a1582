use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use crate::{
    enhance::auto_enhance,
    filter::{apply_filter, FilterKind},
    image_from_bytes,
    ops::Sharpen,
    orientation::auto_orient,
    pass::{run_passes, ProcessingProfile, Step},
    resize,
    watermark::{add_watermark, DEFAULT_WATERMARK_TEXT},
    write_format::{encode, OutputFormat},
    Error,
};

/// Longest edge of the enhanced rendition.
pub const ENHANCED_BOUND: u32 = 2200;
/// Longest edge of the web rendition.
pub const WEB_BOUND: u32 = 1200;
/// Edge length of the square thumbnail.
pub const THUMBNAIL_SIZE: u32 = 200;

pub const ENHANCED_FORMAT: OutputFormat = OutputFormat::Jpeg(90);
pub const THUMBNAIL_FORMAT: OutputFormat = OutputFormat::Jpeg(80);
pub const WEB_FORMAT: OutputFormat = OutputFormat::WebP(85);

/// Applied to every upload before any optional step, so that all images
/// start from the same baseline.
const BASELINE: &[Step] = &[
    Step::Bound(ENHANCED_BOUND),
    Step::Blur(3.0),
    Step::Sharpen(Sharpen::new(2.0, 1.0, 3.0)),
    Step::Normalize,
];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhancementOptions {
    pub auto_enhance: bool,
    pub add_watermark: bool,
    pub apply_filter: FilterKind,
}

impl EnhancementOptions {
    pub fn has_enhancements(&self) -> bool {
        self.auto_enhance || self.add_watermark || self.apply_filter != FilterKind::None
    }

    /// Names of the applied enhancements, in the order the pipeline runs them.
    pub fn applied_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.auto_enhance {
            names.push("Enhanced");
        }
        if self.apply_filter != FilterKind::None {
            names.push(self.apply_filter.title());
        }
        if self.add_watermark {
            names.push("Watermarked");
        }
        names
    }

    /// `base` followed by the applied enhancements, e.g. "beach (Enhanced, Dramatic)".
    pub fn display_name(&self, base: &str) -> String {
        let names = self.applied_names();
        if names.is_empty() {
            base.to_string()
        } else {
            format!("{base} ({})", names.join(", "))
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub profile: ProcessingProfile,
    pub watermark_text: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            profile: ProcessingProfile::Full,
            watermark_text: DEFAULT_WATERMARK_TEXT.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Rendition {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug)]
pub struct Renditions {
    pub enhanced: Rendition,
    pub thumbnail: Rendition,
    pub web: Rendition,
}

fn encode_rendition(image: &RgbaImage, format: OutputFormat) -> Result<Rendition, Error> {
    let bytes = encode(image, format)?;
    Ok(Rendition {
        bytes,
        format,
        width: image.width(),
        height: image.height(),
    })
}

/// Decode, orient and apply the baseline pass.
pub fn prepare(original: &[u8]) -> Result<RgbaImage, Error> {
    let image = image_from_bytes(original)?;
    let image = auto_orient(image, original).into_rgba8();
    run_passes(image, &[BASELINE])
}

/// Run the full enhancement pipeline on an uploaded image and produce the
/// three renditions. Ordering is fixed: baseline, auto-enhance, filter,
/// watermark, then the rendition fan-out.
#[instrument(skip(original, config), fields(bytes = original.len()))]
pub fn enhance(
    original: &[u8],
    options: &EnhancementOptions,
    config: &PipelineConfig,
) -> Result<Renditions, Error> {
    let image = prepare(original)?;

    let image = if options.auto_enhance {
        auto_enhance(image, config.profile)?
    } else {
        image
    };

    let image = apply_filter(image, options.apply_filter, config.profile)?;

    let watermark = options
        .add_watermark
        .then_some(config.watermark_text.as_str());
    let renditions = fan_out(&image, watermark)?;

    event!(
        Level::DEBUG,
        enhanced = renditions.enhanced.bytes.len(),
        thumbnail = renditions.thumbnail.bytes.len(),
        web = renditions.web.bytes.len(),
        "renditions encoded"
    );

    Ok(renditions)
}

/// Produce the renditions in parallel from the transformed image. The
/// thumbnail is cut from the image before watermarking and then gets its own
/// watermark, so the text stays legible at thumbnail size.
fn fan_out(image: &RgbaImage, watermark: Option<&str>) -> Result<Renditions, Error> {
    let enhanced_pixels = match watermark {
        Some(text) => add_watermark(image.clone(), text),
        None => image.clone(),
    };

    let (enhanced, (thumbnail, web)) = rayon::join(
        || encode_rendition(&enhanced_pixels, ENHANCED_FORMAT),
        || {
            rayon::join(
                || {
                    let thumb = resize::cover(image, THUMBNAIL_SIZE, THUMBNAIL_SIZE);
                    let thumb = match watermark {
                        Some(text) => add_watermark(thumb, text),
                        None => thumb,
                    };
                    encode_rendition(&thumb, THUMBNAIL_FORMAT)
                },
                || {
                    let web = resize::bound_longest_edge(enhanced_pixels.clone(), WEB_BOUND);
                    encode_rendition(&web, WEB_FORMAT)
                },
            )
        },
    );

    Ok(Renditions {
        enhanced: enhanced?,
        thumbnail: thumbnail?,
        web: web?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{gradient, png_bytes, solid};

    fn decode(bytes: &[u8]) -> RgbaImage {
        image::load_from_memory(bytes).unwrap().to_rgba8()
    }

    fn format_of(bytes: &[u8]) -> imageinfo::ImageFormat {
        imageinfo::ImageInfo::from_raw_data(bytes).unwrap().format
    }

    #[test]
    fn display_names() {
        let options = EnhancementOptions {
            auto_enhance: true,
            add_watermark: true,
            apply_filter: FilterKind::Dramatic,
        };
        assert_eq!(
            options.display_name("beach"),
            "beach (Enhanced, Dramatic, Watermarked)"
        );
        assert!(options.has_enhancements());

        let options = EnhancementOptions {
            apply_filter: FilterKind::SoftPortrait,
            ..Default::default()
        };
        assert_eq!(options.display_name("me"), "me (Soft Portrait)");

        let plain = EnhancementOptions::default();
        assert_eq!(plain.display_name("cat"), "cat");
        assert!(!plain.has_enhancements());
    }

    #[test]
    fn options_from_json() {
        let options: EnhancementOptions =
            serde_json::from_str(r#"{"autoEnhance": true, "applyFilter": "bw_artistic"}"#).unwrap();
        assert!(options.auto_enhance);
        assert!(!options.add_watermark);
        assert_eq!(options.apply_filter, FilterKind::BwArtistic);
    }

    #[test]
    fn rendition_bounds_for_large_photo() {
        let original = png_bytes(&gradient(2600, 1300));
        let options = EnhancementOptions {
            auto_enhance: false,
            add_watermark: true,
            apply_filter: FilterKind::Vintage,
        };
        let config = PipelineConfig {
            profile: ProcessingProfile::Light,
            ..Default::default()
        };
        let out = enhance(&original, &options, &config).unwrap();

        assert_eq!((out.enhanced.width, out.enhanced.height), (2200, 1100));
        assert_eq!((out.thumbnail.width, out.thumbnail.height), (200, 200));
        assert_eq!((out.web.width, out.web.height), (1200, 600));

        assert_eq!(format_of(&out.enhanced.bytes), imageinfo::ImageFormat::JPEG);
        assert_eq!(format_of(&out.thumbnail.bytes), imageinfo::ImageFormat::JPEG);
        assert_eq!(format_of(&out.web.bytes), imageinfo::ImageFormat::WEBP);
    }

    #[test]
    fn small_images_are_not_enlarged() {
        let original = png_bytes(&gradient(300, 150));
        let out = enhance(
            &original,
            &EnhancementOptions::default(),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!((out.enhanced.width, out.enhanced.height), (300, 150));
        assert_eq!((out.web.width, out.web.height), (300, 150));
        assert_eq!((out.thumbnail.width, out.thumbnail.height), (200, 200));
    }

    #[test]
    fn thumbnail_carries_its_own_watermark() {
        let original = png_bytes(&solid(600, 400, 230));
        let config = PipelineConfig::default();
        let marked = EnhancementOptions {
            add_watermark: true,
            ..Default::default()
        };

        let with = enhance(&original, &marked, &config).unwrap();
        let without = enhance(&original, &EnhancementOptions::default(), &config).unwrap();

        let with = decode(&with.thumbnail.bytes);
        let without = decode(&without.thumbnail.bytes);
        let corner_with = with.get_pixel(197, 197)[0] as i32;
        let corner_without = without.get_pixel(197, 197)[0] as i32;
        assert!(
            corner_without - corner_with > 80,
            "corner {corner_with} vs {corner_without}"
        );
        // The top left of the thumbnail is untouched.
        assert!((with.get_pixel(5, 5)[0] as i32 - without.get_pixel(5, 5)[0] as i32).abs() < 8);
    }

    #[test]
    fn structure_is_deterministic() {
        let original = png_bytes(&gradient(500, 320));
        let options = EnhancementOptions {
            auto_enhance: true,
            add_watermark: true,
            apply_filter: FilterKind::Dramatic,
        };
        let config = PipelineConfig {
            profile: ProcessingProfile::Light,
            ..Default::default()
        };

        let a = enhance(&original, &options, &config).unwrap();
        let b = enhance(&original, &options, &config).unwrap();
        for (x, y) in [
            (&a.enhanced, &b.enhanced),
            (&a.thumbnail, &b.thumbnail),
            (&a.web, &b.web),
        ] {
            assert_eq!((x.width, x.height, x.format), (y.width, y.height, y.format));
            assert_eq!(format_of(&x.bytes), format_of(&y.bytes));
        }
    }

    #[test]
    fn corrupt_bytes_fail_to_decode() {
        let err = enhance(
            b"\x89PNG but not really",
            &EnhancementOptions::default(),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
