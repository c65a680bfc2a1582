use std::str::FromStr;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{event, span, Level};

use crate::{
    ops::{self, Kernel, Modulation, Sharpen},
    resize, Error,
};

/// One pixel operation within a pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    /// Shrink so the longest edge is at most this many pixels.
    Bound(u32),
    Blur(f32),
    Sharpen(Sharpen),
    Normalize,
    Modulate(Modulation),
    Gamma(f32),
    Tint([u8; 3]),
    Grayscale,
    Convolve(Kernel),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Bound(_) => "resize",
            Step::Blur(_) => "blur",
            Step::Sharpen(_) => "sharpen",
            Step::Normalize => "normalize",
            Step::Modulate(_) => "modulate",
            Step::Gamma(_) => "gamma",
            Step::Tint(_) => "tint",
            Step::Grayscale => "grayscale",
            Step::Convolve(_) => "convolve",
        }
    }

    fn validate(&self, image: &RgbaImage) -> Result<(), Error> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::transform_error(self.name(), "image has no pixels"));
        }

        let valid = match self {
            Step::Bound(edge) => *edge > 0,
            Step::Blur(sigma) => *sigma > 0.0,
            Step::Sharpen(s) => s.sigma > 0.0,
            Step::Gamma(g) => *g > 0.0,
            Step::Modulate(m) => m.brightness >= 0.0 && m.saturation >= 0.0,
            Step::Normalize | Step::Tint(_) | Step::Grayscale | Step::Convolve(_) => true,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::transform_error(
                self.name(),
                format!("invalid parameters {self:?}"),
            ))
        }
    }

    pub fn apply(&self, image: RgbaImage) -> Result<RgbaImage, Error> {
        self.validate(&image)?;

        let output = match *self {
            Step::Bound(edge) => resize::bound_longest_edge(image, edge),
            Step::Blur(sigma) => ops::blur(&image, sigma),
            Step::Sharpen(params) => ops::sharpen(image, params),
            Step::Normalize => ops::normalize(image),
            Step::Modulate(m) => ops::modulate(image, m),
            Step::Gamma(g) => ops::gamma(image, g),
            Step::Tint(color) => ops::tint(image, color),
            Step::Grayscale => ops::grayscale(image),
            Step::Convolve(kernel) => ops::convolve(&image, &kernel),
        };

        Ok(output)
    }
}

/// Run each pass in order, feeding the output of one into the next.
pub fn run_passes(image: RgbaImage, passes: &[&[Step]]) -> Result<RgbaImage, Error> {
    let mut image = image;
    for (index, pass) in passes.iter().enumerate() {
        let span = span!(Level::DEBUG, "pass", index);
        let _enter = span.enter();
        for step in pass.iter() {
            image = step.apply(image)?;
        }
        event!(Level::TRACE, width = image.width(), height = image.height(), "pass done");
    }

    Ok(image)
}

/// How much of each multi-pass sequence to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingProfile {
    /// Every pass with the full parameter set.
    #[default]
    Full,
    /// Only the first pass of each sequence.
    Light,
}

impl ProcessingProfile {
    pub fn select<'a, T>(&self, passes: &'a [T]) -> &'a [T] {
        match self {
            ProcessingProfile::Full => passes,
            ProcessingProfile::Light => &passes[..passes.len().min(1)],
        }
    }
}

impl FromStr for ProcessingProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "light" => Ok(Self::Light),
            _ => Err(format!("Unknown processing profile {s}")),
        }
    }
}
