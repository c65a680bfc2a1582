use std::str::FromStr;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use crate::{
    ops::{Modulation, Sharpen},
    pass::{run_passes, ProcessingProfile, Step},
    Error,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    None,
    Vintage,
    Dramatic,
    BwArtistic,
    SoftPortrait,
}

const VINTAGE: &[&[Step]] = &[
    &[
        Step::Blur(3.0),
        Step::Tint([255, 220, 180]),
        Step::Modulate(Modulation::new(0.95, 0.7).with_hue(15.0)),
        Step::Gamma(1.3),
        Step::Convolve([0, -1, 0, -1, 5, -1, 0, -1, 0]),
    ],
    &[
        Step::Blur(1.0),
        Step::Sharpen(Sharpen::new(2.0, 1.0, 2.0)),
        Step::Modulate(Modulation::new(1.02, 0.95)),
    ],
];

const DRAMATIC: &[&[Step]] = &[
    &[
        Step::Blur(5.0),
        Step::Normalize,
        Step::Sharpen(Sharpen::new(5.0, 1.0, 6.0)),
        Step::Modulate(Modulation::new(0.9, 1.5).with_hue(-5.0)),
        Step::Gamma(1.2),
        Step::Convolve([-2, -1, 0, -1, 1, 1, 0, 1, 2]),
    ],
    &[
        Step::Blur(2.0),
        Step::Sharpen(Sharpen::new(3.0, 1.0, 4.0)),
        Step::Modulate(Modulation::new(0.98, 1.1)),
    ],
    &[Step::Normalize, Step::Sharpen(Sharpen::new(1.0, 1.0, 1.0))],
];

const BW_ARTISTIC: &[&[Step]] = &[
    &[
        Step::Blur(4.0),
        Step::Grayscale,
        Step::Normalize,
        Step::Sharpen(Sharpen::new(3.0, 1.0, 4.0)),
        Step::Gamma(1.1),
        Step::Convolve([-1, -1, -1, -1, 8, -1, -1, -1, -1]),
    ],
    &[
        Step::Blur(1.0),
        Step::Sharpen(Sharpen::new(2.0, 1.0, 3.0)),
        Step::Modulate(Modulation::new(1.05, 1.0)),
    ],
];

const SOFT_PORTRAIT: &[&[Step]] = &[
    &[
        Step::Blur(3.0),
        Step::Sharpen(Sharpen::new(2.0, 1.0, 3.0)),
        Step::Modulate(Modulation::new(1.02, 0.9)),
        Step::Convolve([1; 9]),
    ],
    &[Step::Blur(1.5), Step::Sharpen(Sharpen::new(1.0, 1.0, 2.0))],
];

impl FilterKind {
    pub const ALL: [FilterKind; 5] = [
        FilterKind::None,
        FilterKind::Vintage,
        FilterKind::Dramatic,
        FilterKind::BwArtistic,
        FilterKind::SoftPortrait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::Vintage => "vintage",
            FilterKind::Dramatic => "dramatic",
            FilterKind::BwArtistic => "bw_artistic",
            FilterKind::SoftPortrait => "soft_portrait",
        }
    }

    /// The name used in display names, e.g. "Soft Portrait".
    pub fn title(&self) -> &'static str {
        match self {
            FilterKind::None => "None",
            FilterKind::Vintage => "Vintage",
            FilterKind::Dramatic => "Dramatic",
            FilterKind::BwArtistic => "Bw Artistic",
            FilterKind::SoftPortrait => "Soft Portrait",
        }
    }

    pub fn passes(&self) -> &'static [&'static [Step]] {
        match self {
            FilterKind::None => &[],
            FilterKind::Vintage => VINTAGE,
            FilterKind::Dramatic => DRAMATIC,
            FilterKind::BwArtistic => BW_ARTISTIC,
            FilterKind::SoftPortrait => SOFT_PORTRAIT,
        }
    }

    /// Parse a filter name, treating anything unrecognized as `None`. Unknown
    /// names are logged so that typos in clients show up somewhere.
    pub fn parse_lenient(name: &str) -> FilterKind {
        match name.parse() {
            Ok(filter) => filter,
            Err(_) => {
                event!(Level::WARN, filter = %name, "unknown filter, applying none");
                FilterKind::None
            }
        }
    }
}

impl FromStr for FilterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Ok(FilterKind::None);
        }

        FilterKind::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownFilter(name.to_string()))
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn apply_filter(
    image: RgbaImage,
    filter: FilterKind,
    profile: ProcessingProfile,
) -> Result<RgbaImage, Error> {
    if filter == FilterKind::None {
        return Ok(image);
    }

    run_passes(image, profile.select(filter.passes()))
}
