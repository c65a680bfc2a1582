//! Pixel operations used by the enhancement passes. Every function consumes or
//! borrows an RGBA buffer and returns a new one; alpha is carried through
//! untouched.

use image::{imageops, Rgba, RgbaImage};

/// A 3x3 convolution kernel in row-major order.
pub type Kernel = [i32; 9];

/// Luminance difference (0-255 scale) below which a pixel counts as part of a flat area.
const FLAT_THRESHOLD: f32 = 2.0;

/// Fraction of pixels clipped at each end of the histogram by [normalize].
const NORMALIZE_CLIP: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sharpen {
    /// Sigma of the gaussian used to extract detail.
    pub sigma: f32,
    /// Amount applied where the image is flat.
    pub flat: f32,
    /// Amount applied along edges and texture.
    pub jagged: f32,
}

impl Sharpen {
    pub const fn new(sigma: f32, flat: f32, jagged: f32) -> Self {
        Self {
            sigma,
            flat,
            jagged,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Modulation {
    pub brightness: f32,
    pub saturation: f32,
    /// Hue rotation in degrees.
    pub hue: f32,
}

impl Modulation {
    pub const fn new(brightness: f32, saturation: f32) -> Self {
        Self {
            brightness,
            saturation,
            hue: 0.0,
        }
    }

    pub const fn with_hue(self, hue: f32) -> Self {
        Self { hue, ..self }
    }
}

#[inline]
fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

#[inline]
fn pixel_luma(p: &Rgba<u8>) -> f32 {
    luma(p[0] as f32, p[1] as f32, p[2] as f32)
}

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn map_channels(mut image: RgbaImage, lut: &[u8; 256]) -> RgbaImage {
    for p in image.pixels_mut() {
        p[0] = lut[p[0] as usize];
        p[1] = lut[p[1] as usize];
        p[2] = lut[p[2] as usize];
    }
    image
}

/// Mean luminance of the image, normalized to [0, 1].
pub fn mean_luminance(image: &RgbaImage) -> f32 {
    let count = image.width() as f64 * image.height() as f64;
    if count == 0.0 {
        return 0.0;
    }

    let total: f64 = image.pixels().map(|p| pixel_luma(p) as f64).sum();
    (total / count / 255.0) as f32
}

pub fn blur(image: &RgbaImage, sigma: f32) -> RgbaImage {
    imageops::blur(image, sigma)
}

/// Unsharp mask on luminance. Detail below [FLAT_THRESHOLD] is scaled by
/// `flat`, everything else by `jagged`.
pub fn sharpen(image: RgbaImage, params: Sharpen) -> RgbaImage {
    let soft = imageops::blur(&image, params.sigma);
    let mut image = image;
    for (p, s) in image.pixels_mut().zip(soft.pixels()) {
        let detail = pixel_luma(p) - pixel_luma(s);
        let amount = if detail.abs() <= FLAT_THRESHOLD {
            params.flat
        } else {
            params.jagged
        };
        let delta = detail * amount;
        p[0] = clamp_u8(p[0] as f32 + delta);
        p[1] = clamp_u8(p[1] as f32 + delta);
        p[2] = clamp_u8(p[2] as f32 + delta);
    }
    image
}

/// Stretch the luminance histogram so that the 1st and 99th percentiles
/// span the full range.
pub fn normalize(image: RgbaImage) -> RgbaImage {
    let mut histogram = [0u64; 256];
    for p in image.pixels() {
        histogram[clamp_u8(pixel_luma(p)) as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return image;
    }

    let clip = (total as f64 * NORMALIZE_CLIP) as u64;
    let mut seen = 0;
    let mut low = 0;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > clip {
            low = value;
            break;
        }
    }

    seen = 0;
    let mut high = 255;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            high = value;
            break;
        }
    }

    if high <= low {
        return image;
    }

    let scale = 255.0 / (high - low) as f32;
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = clamp_u8((v as f32 - low as f32) * scale);
    }

    map_channels(image, &lut)
}

fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };
    (hue, saturation, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let c = v * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    (r + m, g + m, b + m)
}

/// Scale brightness and saturation, and rotate the hue.
pub fn modulate(mut image: RgbaImage, m: Modulation) -> RgbaImage {
    for p in image.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(
            p[0] as f32 / 255.0,
            p[1] as f32 / 255.0,
            p[2] as f32 / 255.0,
        );
        let (r, g, b) = hsv_to_rgb(
            h + m.hue,
            (s * m.saturation).clamp(0.0, 1.0),
            (v * m.brightness).clamp(0.0, 1.0),
        );
        p[0] = clamp_u8(r * 255.0);
        p[1] = clamp_u8(g * 255.0);
        p[2] = clamp_u8(b * 255.0);
    }
    image
}

/// Gamma correction. Values above 1 brighten the midtones.
pub fn gamma(image: RgbaImage, gamma: f32) -> RgbaImage {
    let exponent = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = clamp_u8(255.0 * (v as f32 / 255.0).powf(exponent));
    }
    map_channels(image, &lut)
}

/// Apply a 3x3 kernel, dividing by the kernel sum (or 1 when it sums to 0).
/// Edge pixels sample the nearest valid neighbour.
pub fn convolve(image: &RgbaImage, kernel: &Kernel) -> RgbaImage {
    let sum: i32 = kernel.iter().sum();
    let scale = if sum == 0 { 1.0 } else { sum as f32 };

    let (width, height) = image.dimensions();
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;

    RgbaImage::from_fn(width, height, |x, y| {
        let mut acc = [0f32; 3];
        for (i, weight) in kernel.iter().enumerate() {
            if *weight == 0 {
                continue;
            }

            let sx = (x as i64 + (i % 3) as i64 - 1).clamp(0, max_x) as u32;
            let sy = (y as i64 + (i / 3) as i64 - 1).clamp(0, max_y) as u32;
            let sample = image.get_pixel(sx, sy);
            for (c, total) in acc.iter_mut().enumerate() {
                *total += sample[c] as f32 * *weight as f32;
            }
        }

        let alpha = image.get_pixel(x, y)[3];
        Rgba([
            clamp_u8(acc[0] / scale),
            clamp_u8(acc[1] / scale),
            clamp_u8(acc[2] / scale),
            alpha,
        ])
    })
}

/// Replace chroma with the tint colour while keeping each pixel's luminance.
pub fn tint(mut image: RgbaImage, color: [u8; 3]) -> RgbaImage {
    let [tr, tg, tb] = color.map(|c| c as f32);
    let tint_luma = luma(tr, tg, tb).max(1.0);
    for p in image.pixels_mut() {
        let ratio = pixel_luma(p) / tint_luma;
        p[0] = clamp_u8(tr * ratio);
        p[1] = clamp_u8(tg * ratio);
        p[2] = clamp_u8(tb * ratio);
    }
    image
}

pub fn grayscale(mut image: RgbaImage) -> RgbaImage {
    for p in image.pixels_mut() {
        let l = clamp_u8(pixel_luma(p));
        p[0] = l;
        p[1] = l;
        p[2] = l;
    }
    image
}
