//! Pixel-buffer operators and the named requests that select them

mod color;
mod kernel;

pub use color::{
    colorize, grayscale, luma, threshold, threshold_colorize, ColorBias, ColorPreset,
    DEFAULT_CUTOFF, DEFAULT_MIDPOINT,
};
pub use kernel::{convolve, Kernel, KernelError};

use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::image::PixelBuffer;

/// One operation the host can request against a photo.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Grayscale,
    Threshold { cutoff: u8 },
    Colorize(ColorBias),
    ThresholdColorize { bias: ColorBias, midpoint: u8 },
    Sharpen,
    EdgeDetect { grayscale: bool },
    Emboss,
    Convolve(Kernel),
}

impl Transform {
    /// Run the operator on `buf`, producing a fresh buffer.
    pub fn apply(&self, buf: &PixelBuffer) -> Result<PixelBuffer> {
        match self {
            Transform::Grayscale => grayscale(buf),
            Transform::Threshold { cutoff } => threshold(buf, *cutoff),
            Transform::Colorize(bias) => colorize(buf, *bias),
            Transform::ThresholdColorize { bias, midpoint } => {
                threshold_colorize(buf, *bias, *midpoint)
            }
            Transform::Sharpen => convolve(buf, &Kernel::sharpen()),
            Transform::EdgeDetect { grayscale: false } => convolve(buf, &Kernel::edge_detect()),
            Transform::EdgeDetect { grayscale: true } => {
                grayscale(&convolve(buf, &Kernel::edge_detect())?)
            }
            Transform::Emboss => convolve(buf, &Kernel::emboss()),
            Transform::Convolve(kernel) => convolve(buf, kernel),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::Grayscale => "grayscale",
            Transform::Threshold { .. } => "threshold",
            Transform::Colorize(_) => "colorize",
            Transform::ThresholdColorize { .. } => "threshold-colorize",
            Transform::Sharpen => "sharpen",
            Transform::EdgeDetect { grayscale: false } => "edge-detect",
            Transform::EdgeDetect { grayscale: true } => "edge-detect-gray",
            Transform::Emboss => "emboss",
            Transform::Convolve(_) => "convolve",
        }
    }

    /// Build a transform from a host request.
    ///
    /// `params` are the integers that came with the request:
    /// - `colorize` / `threshold-colorize`: `r g b`
    /// - `threshold`: optional cutoff
    /// - `convolve`: `k*k` weights, then divisor, then bias
    /// - preset names (`ocean-blue`, ...): none, threshold-colorize with the preset bias
    pub fn parse(name: &str, params: &[i32], config: &EditorConfig) -> Result<Self> {
        let normalized = name.trim().to_lowercase().replace([' ', '_'], "-");

        let expect = |expected: &str, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(EditorError::InvalidParameters {
                    name: normalized.clone(),
                    expected: expected.to_string(),
                    actual: params.len(),
                })
            }
        };

        let transform = match normalized.as_str() {
            "grayscale" | "greyscale" => {
                expect("0", params.is_empty())?;
                Transform::Grayscale
            }
            "threshold" => {
                expect("0 or 1", params.len() <= 1)?;
                let cutoff = match params.first() {
                    Some(&c) => u8::try_from(c).map_err(|_| EditorError::ParameterOutOfRange {
                        name: normalized.clone(),
                        value: c,
                        range: "0..=255".to_string(),
                    })?,
                    None => config.threshold_cutoff,
                };
                Transform::Threshold { cutoff }
            }
            "colorize" => {
                expect("3", params.len() == 3)?;
                Transform::Colorize(ColorBias::new(params[0], params[1], params[2]))
            }
            "threshold-colorize" => {
                expect("3", params.len() == 3)?;
                Transform::ThresholdColorize {
                    bias: ColorBias::new(params[0], params[1], params[2]),
                    midpoint: config.colorize_midpoint,
                }
            }
            "sharpen" => {
                expect("0", params.is_empty())?;
                Transform::Sharpen
            }
            "edge-detect" | "edge-detect-gray" => {
                expect("0", params.is_empty())?;
                Transform::EdgeDetect {
                    grayscale: normalized == "edge-detect-gray",
                }
            }
            "emboss" => {
                expect("0", params.is_empty())?;
                Transform::Emboss
            }
            "convolve" => {
                let weights = params.len().saturating_sub(2);
                let size = (weights as f64).sqrt() as usize;
                expect("k*k weights plus divisor and bias", params.len() >= 3 && size * size == weights)?;
                let (weights, tail) = params.split_at(weights);
                let kernel = Kernel::new(
                    size,
                    weights.iter().map(|&w| w as f32).collect(),
                    tail[0] as f32,
                    tail[1] as f32,
                )?;
                Transform::Convolve(kernel)
            }
            other => match ColorPreset::try_from(other) {
                Ok(preset) => {
                    expect("0", params.is_empty())?;
                    Transform::ThresholdColorize {
                        bias: preset.bias(),
                        midpoint: config.colorize_midpoint,
                    }
                }
                Err(_) => return Err(EditorError::UnknownTransform(name.to_string())),
            },
        };

        Ok(transform)
    }
}

impl From<ColorPreset> for Transform {
    fn from(preset: ColorPreset) -> Self {
        Transform::ThresholdColorize {
            bias: preset.bias(),
            midpoint: DEFAULT_MIDPOINT,
        }
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transform::Threshold { cutoff } => write!(f, "threshold({cutoff})"),
            Transform::Colorize(ColorBias { r, g, b }) => write!(f, "colorize({r}, {g}, {b})"),
            Transform::ThresholdColorize {
                bias: ColorBias { r, g, b },
                midpoint,
            } => write!(f, "threshold-colorize({r}, {g}, {b}; midpoint {midpoint})"),
            Transform::Convolve(kernel) => write!(f, "convolve({0}x{0})", kernel.size()),
            other => f.write_str(other.name()),
        }
    }
}
