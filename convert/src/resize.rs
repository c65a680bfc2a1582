use image::{imageops, RgbaImage};

const FILTER: imageops::FilterType = imageops::FilterType::CatmullRom;

/// The size of a `width` x `height` image scaled down so its longest edge is
/// at most `max_edge`. Images that already fit are left alone.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_edge {
        return (width, height);
    }

    let ratio = max_edge as f64 / longest as f64;
    let scale = |v: u32| ((v as f64 * ratio).round() as u32).clamp(1, max_edge);
    (scale(width), scale(height))
}

/// Shrink the image so its longest edge is at most `max_edge`, preserving the
/// aspect ratio. Never enlarges.
pub fn bound_longest_edge(image: RgbaImage, max_edge: u32) -> RgbaImage {
    let (width, height) = fit_within(image.width(), image.height(), max_edge);
    if (width, height) == image.dimensions() {
        return image;
    }

    imageops::resize(&image, width, height, FILTER)
}

/// Scale to cover a `width` x `height` box and crop the overflow around the
/// centre, so the result is exactly the requested size.
pub fn cover(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (src_w, src_h) = image.dimensions();
    let ratio = (width as f64 / src_w as f64).max(height as f64 / src_h as f64);
    let scaled_w = ((src_w as f64 * ratio).ceil() as u32).max(width);
    let scaled_h = ((src_h as f64 * ratio).ceil() as u32).max(height);

    let scaled = imageops::resize(image, scaled_w, scaled_h, FILTER);
    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::gradient;

    #[test]
    fn fit_within_keeps_aspect() {
        assert_eq!(fit_within(2000, 1500, 1200), (1200, 900));
        assert_eq!(fit_within(1500, 3000, 2200), (1100, 2200));
        assert_eq!(fit_within(800, 600, 1200), (800, 600));
        assert_eq!(fit_within(5000, 2, 100), (100, 1));
    }

    #[test]
    fn bound_never_enlarges() {
        let image = gradient(40, 30);
        assert_eq!(bound_longest_edge(image.clone(), 100), image);
        assert_eq!(bound_longest_edge(image, 20).dimensions(), (20, 15));
    }

    #[test]
    fn cover_is_exact() {
        assert_eq!(cover(&gradient(300, 100), 200, 200).dimensions(), (200, 200));
        assert_eq!(cover(&gradient(30, 90), 200, 200).dimensions(), (200, 200));
        assert_eq!(cover(&gradient(200, 200), 200, 200).dimensions(), (200, 200));
    }
}
