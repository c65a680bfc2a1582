//! EXIF orientation handling. `image` does not apply the orientation tag when
//! decoding, so uploads from phones would otherwise come out sideways.

use std::io::Cursor;

use image::DynamicImage;
use tracing::{event, Level};

/// Read the EXIF orientation tag (1-8), if the file carries one.
pub fn read_orientation(bytes: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

/// Rotate and flip so that the image displays upright.
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

pub fn auto_orient(image: DynamicImage, bytes: &[u8]) -> DynamicImage {
    match read_orientation(bytes) {
        Some(orientation) if orientation != 1 => {
            event!(Level::DEBUG, orientation, "applying exif orientation");
            apply_orientation(image, orientation)
        }
        _ => image,
    }
}
