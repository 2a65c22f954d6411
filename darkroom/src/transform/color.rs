//! Per-pixel color operators: grayscale, colorize, thresholds.

use imageproc::image::Rgba;
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter};

use crate::error::{EditorError, Result};
use crate::image::PixelBuffer;

/// Luma at or below this is "dark" for [`threshold_colorize`].
pub const DEFAULT_MIDPOINT: u8 = 127;
/// Luma at or above this turns white in [`threshold`].
pub const DEFAULT_CUTOFF: u8 = 128;

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];

/// Offsets added to R, G and B before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColorBias {
    pub r: i32,
    pub g: i32,
    pub b: i32,
}

impl ColorBias {
    pub const fn new(r: i32, g: i32, b: i32) -> Self {
        ColorBias { r, g, b }
    }

    fn offset(&self, value: i32) -> [u8; 3] {
        [
            clamp_channel(value.saturating_add(self.r)),
            clamp_channel(value.saturating_add(self.g)),
            clamp_channel(value.saturating_add(self.b)),
        ]
    }
}

impl From<(i32, i32, i32)> for ColorBias {
    fn from((r, g, b): (i32, i32, i32)) -> Self {
        ColorBias::new(r, g, b)
    }
}

/// Named biases for [`threshold_colorize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, EnumCount, EnumIter)]
pub enum ColorPreset {
    Monochrome,
    OceanBlue,
    Purple,
}

impl ColorPreset {
    pub fn len() -> usize {
        Self::COUNT
    }

    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColorPreset::Monochrome => "monochrome",
            ColorPreset::OceanBlue => "ocean-blue",
            ColorPreset::Purple => "purple",
        }
    }

    pub fn bias(&self) -> ColorBias {
        match self {
            ColorPreset::Monochrome => ColorBias::new(0, 0, 0),
            ColorPreset::OceanBlue => ColorBias::new(0, 40, 110),
            ColorPreset::Purple => ColorBias::new(90, 0, 120),
        }
    }
}

#[derive(Debug)]
pub struct ParseError(String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("Invalid color preset: ")?;
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

impl TryFrom<&str> for ColorPreset {
    type Error = ParseError;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        let normalized = s.to_lowercase().replace([' ', '_'], "-");
        Self::iter()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| ParseError(s.to_string()))
    }
}

impl std::str::FromStr for ColorPreset {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

#[inline]
pub(crate) fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Rec. 601 luma, `round(0.299 R + 0.587 G + 0.114 B)` in integer arithmetic.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

pub(crate) fn ensure_not_empty(buf: &PixelBuffer) -> Result<()> {
    if buf.is_empty() {
        return Err(EditorError::InvalidHandle);
    }
    Ok(())
}

/// Apply `f` to the RGB of every pixel, keeping alpha.
fn map_rgb(buf: &PixelBuffer, f: impl Fn([u8; 3]) -> [u8; 3]) -> Result<PixelBuffer> {
    ensure_not_empty(buf)?;
    let mapped = imageproc::map::map_colors(buf.as_image(), |Rgba([r, g, b, a])| {
        let [r, g, b] = f([r, g, b]);
        Rgba([r, g, b, a])
    });
    Ok(mapped.into())
}

pub fn grayscale(buf: &PixelBuffer) -> Result<PixelBuffer> {
    map_rgb(buf, |[r, g, b]| {
        let y = luma(r, g, b);
        [y, y, y]
    })
}

/// Tint by adding `bias` to the channel average.
pub fn colorize(buf: &PixelBuffer, bias: ColorBias) -> Result<PixelBuffer> {
    map_rgb(buf, |[r, g, b]| {
        let avg = (r as i32 + g as i32 + b as i32) / 3;
        bias.offset(avg)
    })
}

/// Pixels brighter than `midpoint` turn white, the rest take `luma + bias`.
pub fn threshold_colorize(buf: &PixelBuffer, bias: ColorBias, midpoint: u8) -> Result<PixelBuffer> {
    map_rgb(buf, |[r, g, b]| {
        let y = luma(r, g, b);
        if y > midpoint {
            WHITE
        } else {
            bias.offset(y as i32)
        }
    })
}

/// Bilevel image: white where luma reaches `cutoff`, black elsewhere.
pub fn threshold(buf: &PixelBuffer, cutoff: u8) -> Result<PixelBuffer> {
    map_rgb(buf, |[r, g, b]| if luma(r, g, b) >= cutoff { WHITE } else { BLACK })
}
