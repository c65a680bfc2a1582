use image::RgbaImage;
use tracing::instrument;

use crate::{
    ops::{self, Modulation, Sharpen},
    pass::{run_passes, ProcessingProfile, Step},
    Error,
};

/// Longest edge allowed while auto-enhancing.
pub const AUTO_ENHANCE_BOUND: u32 = 2500;

const DETAIL_KERNEL: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];

const SECOND_PASS: &[Step] = &[
    Step::Blur(2.0),
    Step::Sharpen(Sharpen::new(2.0, 1.0, 3.0)),
    Step::Modulate(Modulation::new(1.02, 1.05)),
    Step::Convolve(DETAIL_KERNEL),
];

const THIRD_PASS: &[Step] = &[
    Step::Blur(1.0),
    Step::Sharpen(Sharpen::new(1.5, 1.0, 2.0)),
    Step::Normalize,
];

/// Pick the brightness and saturation correction for an image with the given
/// mean luminance (0-1). Dark images are lifted, bright ones pulled back.
pub fn correction_for(luminance: f32) -> Modulation {
    let brightness = if luminance < 0.4 {
        1.15
    } else if luminance > 0.7 {
        0.95
    } else {
        1.05
    };

    let saturation = if luminance < 0.3 { 1.2 } else { 1.1 };

    Modulation::new(brightness, saturation).with_hue(10.0)
}

fn first_pass(correction: Modulation) -> [Step; 6] {
    [
        Step::Bound(AUTO_ENHANCE_BOUND),
        Step::Blur(4.0),
        Step::Sharpen(Sharpen::new(3.0, 1.0, 4.0)),
        Step::Normalize,
        Step::Modulate(correction),
        Step::Gamma(1.1),
    ]
}

/// Brightness, contrast and detail correction in three passes, heaviest first.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn auto_enhance(image: RgbaImage, profile: ProcessingProfile) -> Result<RgbaImage, Error> {
    let correction = correction_for(ops::mean_luminance(&image));
    let first = first_pass(correction);
    let passes: [&[Step]; 3] = [&first, SECOND_PASS, THIRD_PASS];
    run_passes(image, profile.select(&passes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{gradient, solid};

    #[test]
    fn correction_thresholds() {
        let dark = correction_for(0.2);
        assert_eq!((dark.brightness, dark.saturation), (1.15, 1.2));

        let dim = correction_for(0.35);
        assert_eq!((dim.brightness, dim.saturation), (1.15, 1.1));

        let mid = correction_for(0.5);
        assert_eq!((mid.brightness, mid.saturation), (1.05, 1.1));

        let bright = correction_for(0.9);
        assert_eq!((bright.brightness, bright.saturation), (0.95, 1.1));
        assert_eq!(bright.hue, 10.0);
    }

    #[test]
    fn keeps_small_images_small() {
        let out = auto_enhance(gradient(120, 80), ProcessingProfile::Full).unwrap();
        assert_eq!(out.dimensions(), (120, 80));
    }

    #[test]
    fn lifts_dark_images() {
        let image = solid(32, 32, 40);
        let out = auto_enhance(image, ProcessingProfile::Light).unwrap();
        assert!(out.get_pixel(16, 16)[0] > 40);
    }

    #[test]
    fn is_deterministic() {
        let a = auto_enhance(gradient(64, 48), ProcessingProfile::Full).unwrap();
        let b = auto_enhance(gradient(64, 48), ProcessingProfile::Full).unwrap();
        assert_eq!(a, b);
    }
}
