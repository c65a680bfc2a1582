use image::RgbaImage;
use tracing::instrument;

pub const DEFAULT_WATERMARK_TEXT: &str = "VISUASORT";

/// Opacity of the black panel behind the text.
const PANEL_ALPHA: f32 = 0.7;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Horizontal space taken by one glyph plus its trailing gap.
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;
/// Nominal line height for one unit of scale.
const GLYPH_LINE: u32 = GLYPH_HEIGHT + 1;

/// Position and size of the watermark panel, anchored to the bottom right
/// corner. A pure function of the image dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatermarkLayout {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub font_size: u32,
}

impl WatermarkLayout {
    pub fn for_image(image_width: u32, image_height: u32) -> WatermarkLayout {
        let w = image_width as f64;
        let h = image_height as f64;

        // Never more than 40% of the width, and keep a 20px margin on the left.
        let max_width = (w * 0.4).min(w - 20.0).max(1.0);
        let panel_width = (w * 0.12).min(max_width).max(250f64.min(max_width));
        let panel_height = (panel_width * 0.3).min(h * 0.2);
        let font_size = (panel_width * 0.12).max(16.0);

        let width = (panel_width.round() as u32).clamp(1, image_width.max(1));
        let height = (panel_height.round() as u32).clamp(1, image_height.max(1));

        WatermarkLayout {
            x: image_width.saturating_sub(width),
            y: image_height.saturating_sub(height),
            width,
            height,
            font_size: font_size.round() as u32,
        }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Composite `text` in white on a translucent black panel in the bottom right
/// corner of the image.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn add_watermark(image: RgbaImage, text: &str) -> RgbaImage {
    let mut image = image;
    if image.width() == 0 || image.height() == 0 {
        return image;
    }

    let layout = WatermarkLayout::for_image(image.width(), image.height());
    let keep = 1.0 - PANEL_ALPHA;
    for y in layout.y..layout.y + layout.height {
        for x in layout.x..layout.x + layout.width {
            let p = image.get_pixel_mut(x, y);
            for c in 0..3 {
                p[c] = (p[c] as f32 * keep).round() as u8;
            }
        }
    }

    draw_text(&mut image, &layout, text);
    image
}

fn draw_text(image: &mut RgbaImage, layout: &WatermarkLayout, text: &str) {
    let glyphs = text
        .chars()
        .map(|c| glyph(c.to_ascii_uppercase()))
        .collect::<Vec<_>>();
    if glyphs.is_empty() {
        return;
    }

    let columns = glyphs.len() as u32 * GLYPH_ADVANCE - 1;
    let mut scale = (layout.font_size / GLYPH_LINE).max(1);
    while scale > 1 && (columns * scale > layout.width || GLYPH_HEIGHT * scale > layout.height) {
        scale -= 1;
    }

    // Thicken strokes when there is room for it.
    let bold = u32::from(scale >= 2);
    let left = layout.x + layout.width.saturating_sub(columns * scale) / 2;
    let top = layout.y + layout.height.saturating_sub(GLYPH_HEIGHT * scale) / 2;

    for (index, rows) in glyphs.iter().enumerate() {
        let glyph_left = left + index as u32 * GLYPH_ADVANCE * scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0b10000 >> col) == 0 {
                    continue;
                }

                let gx = glyph_left + col * scale;
                let gy = top + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale + bold {
                        let (px, py) = (gx + dx, gy + dy);
                        if layout.contains(px, py) {
                            let p = image.get_pixel_mut(px, py);
                            p[0] = 255;
                            p[1] = 255;
                            p[2] = 255;
                        }
                    }
                }
            }
        }
    }
}

/// 5x7 bitmap glyphs, one byte per row with the leftmost pixel in bit 4.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        _ => [0; 7],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::solid;

    #[test]
    fn layout_for_typical_photo() {
        let layout = WatermarkLayout::for_image(2000, 1500);
        assert_eq!(
            layout,
            WatermarkLayout {
                x: 1750,
                y: 1425,
                width: 250,
                height: 75,
                font_size: 30,
            }
        );
    }

    #[test]
    fn layout_grows_with_large_images() {
        let layout = WatermarkLayout::for_image(4000, 3000);
        assert_eq!((layout.width, layout.height), (480, 144));
        assert_eq!((layout.x + layout.width, layout.y + layout.height), (4000, 3000));
    }

    #[test]
    fn layout_for_thumbnail() {
        let layout = WatermarkLayout::for_image(200, 200);
        assert_eq!((layout.width, layout.height, layout.font_size), (80, 24, 16));
        assert_eq!((layout.x, layout.y), (120, 176));
    }

    #[test]
    fn layout_fits_tiny_images() {
        for (w, h) in [(1, 1), (10, 10), (30, 5), (300, 2)] {
            let layout = WatermarkLayout::for_image(w, h);
            assert!(layout.width >= 1 && layout.width <= w);
            assert!(layout.height >= 1 && layout.height <= h);
            assert_eq!(layout.x + layout.width, w);
            assert_eq!(layout.y + layout.height, h);
        }
    }

    #[test]
    fn darkens_only_the_corner() {
        let out = add_watermark(solid(800, 600, 200), DEFAULT_WATERMARK_TEXT);
        assert_eq!(out.get_pixel(0, 0)[0], 200);
        assert_eq!(out.get_pixel(540, 590)[0], 200);
        // Panel background.
        assert_eq!(out.get_pixel(798, 598)[0], 60);
        // Some of the text is drawn in white.
        let layout = WatermarkLayout::for_image(800, 600);
        let white = (layout.y..layout.y + layout.height)
            .flat_map(|y| (layout.x..layout.x + layout.width).map(move |x| (x, y)))
            .filter(|(x, y)| out.get_pixel(*x, *y)[0] == 255)
            .count();
        assert!(white > 50, "white pixels {white}");
    }

    #[test]
    fn anchors_at_the_same_place_every_time() {
        let once = add_watermark(solid(300, 200, 100), "ABC");
        let twice = add_watermark(once.clone(), "ABC");
        let layout = WatermarkLayout::for_image(300, 200);
        for y in 0..200 {
            for x in 0..300 {
                if !layout.contains(x, y) {
                    assert_eq!(once.get_pixel(x, y), twice.get_pixel(x, y));
                }
            }
        }
    }
}
