//! Serialized classification models.
//!
//! A blob is `b"DRMODEL\0"`, a little-endian `u32` header length, a JSON
//! header describing the input and the layer graph, then every layer's
//! parameters as little-endian `f32`s in layer order.

use serde::{Deserialize, Serialize};

use super::labels::Labels;
use super::layers::{window_count, ConvParams, Shape};
use crate::error::InferenceError;

const MAGIC: &[u8; 8] = b"DRMODEL\0";
const PREAMBLE_LEN: usize = MAGIC.len() + 4;

/// Largest accepted input width or height.
pub const MAX_INPUT_SIDE: u32 = 2048;
/// Largest number of elements any layer may produce.
pub const MAX_TENSOR_LEN: usize = 1 << 26;

/// Expected input tensor: size after resizing and per-channel normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    #[serde(default = "default_std")]
    pub std: [f32; 3],
}

fn default_mean() -> [f32; 3] {
    [0.0; 3]
}

fn default_std() -> [f32; 3] {
    [1.0; 3]
}

impl Default for InputSpec {
    /// 224x224, pixels scaled to [0, 1] and otherwise untouched.
    fn default() -> Self {
        InputSpec {
            width: 224,
            height: 224,
            mean: default_mean(),
            std: default_std(),
        }
    }
}

fn one() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv2d {
        out_channels: usize,
        kernel: usize,
        #[serde(default = "one")]
        stride: usize,
        #[serde(default)]
        padding: usize,
        #[serde(default = "one")]
        groups: usize,
    },
    Relu,
    Relu6,
    MaxPool {
        kernel: usize,
        stride: usize,
    },
    AvgPool {
        kernel: usize,
        stride: usize,
    },
    GlobalAvgPool,
    Flatten,
    Dense {
        out_features: usize,
    },
    Softmax,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    #[serde(default)]
    input: InputSpec,
    layers: Vec<LayerSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
}

/// A layer with its parameters and the shapes it maps between.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Layer {
    pub spec: LayerSpec,
    pub input: Shape,
    pub output: Shape,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Parsed, shape-checked model ready for repeated inference.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    input: InputSpec,
    layers: Vec<Layer>,
    labels: Option<Labels>,
}

fn malformed(msg: impl Into<String>) -> InferenceError {
    InferenceError::MalformedModel(msg.into())
}

impl Model {
    pub fn from_bytes(data: &[u8]) -> Result<Self, InferenceError> {
        if data.len() < PREAMBLE_LEN || &data[..MAGIC.len()] != MAGIC {
            return Err(malformed("missing DRMODEL signature"));
        }

        let header_len = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
        let header_end = PREAMBLE_LEN
            .checked_add(header_len)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| malformed(format!("header length {header_len} overruns the blob")))?;

        let header: Header = serde_json::from_slice(&data[PREAMBLE_LEN..header_end])
            .map_err(|e| malformed(format!("invalid header: {e}")))?;

        let params = &data[header_end..];
        if params.len() % 4 != 0 {
            return Err(malformed(format!(
                "parameter section is {} bytes, not a whole number of f32s",
                params.len()
            )));
        }
        let params: Vec<f32> = params
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let model = Self::assemble(header, &params)?;
        log::debug!(
            "Loaded model: {} layers, input {}x{}, {} classes",
            model.layers.len(),
            model.input.width,
            model.input.height,
            model.num_classes()
        );
        Ok(model)
    }

    fn assemble(header: Header, params: &[f32]) -> Result<Self, InferenceError> {
        let input = header.input;
        if input.width == 0 || input.height == 0 {
            return Err(malformed("input size must be non-zero"));
        }
        if input.width > MAX_INPUT_SIDE || input.height > MAX_INPUT_SIDE {
            return Err(malformed(format!(
                "input size {}x{} exceeds {MAX_INPUT_SIDE}x{MAX_INPUT_SIDE}",
                input.width, input.height
            )));
        }
        if input.std.iter().any(|&s| s == 0.0 || !s.is_finite()) {
            return Err(malformed("input std must be finite and non-zero"));
        }
        if header.layers.is_empty() {
            return Err(malformed("model has no layers"));
        }

        let mut shape = Shape::new(3, input.height as usize, input.width as usize);
        let mut cursor = 0usize;
        let mut take = |count: usize, what: &str| -> Result<Vec<f32>, InferenceError> {
            let slice = cursor
                .checked_add(count)
                .and_then(|end| params.get(cursor..end))
                .ok_or_else(|| {
                    malformed(format!(
                        "{what} needs {count} parameters but only {} remain",
                        params.len() - cursor
                    ))
                })?;
            cursor += count;
            Ok(slice.to_vec())
        };

        let mut layers = Vec::with_capacity(header.layers.len());
        for (i, spec) in header.layers.iter().copied().enumerate() {
            let bad_shape = || malformed(format!("layer {i} ({spec:?}) cannot take a {shape} input"));

            let (output, weights, bias) = match spec {
                LayerSpec::Conv2d { .. } => {
                    let conv = conv_params(&spec).ok_or_else(bad_shape)?;
                    let output = conv.output_shape(shape).ok_or_else(bad_shape)?;
                    let count = conv.weight_count(shape.channels).ok_or_else(bad_shape)?;
                    let weights = take(count, "conv2d weights")?;
                    let bias = take(conv.out_channels, "conv2d bias")?;
                    (output, weights, bias)
                }
                LayerSpec::MaxPool { kernel, stride } | LayerSpec::AvgPool { kernel, stride } => {
                    let h = window_count(shape.height, kernel, stride).ok_or_else(bad_shape)?;
                    let w = window_count(shape.width, kernel, stride).ok_or_else(bad_shape)?;
                    (Shape::new(shape.channels, h, w), Vec::new(), Vec::new())
                }
                LayerSpec::GlobalAvgPool => (Shape::flat(shape.channels), Vec::new(), Vec::new()),
                LayerSpec::Flatten => (Shape::flat(shape.len()), Vec::new(), Vec::new()),
                LayerSpec::Dense { out_features } => {
                    if out_features == 0 {
                        return Err(bad_shape());
                    }
                    let count = out_features.checked_mul(shape.len()).ok_or_else(bad_shape)?;
                    let weights = take(count, "dense weights")?;
                    let bias = take(out_features, "dense bias")?;
                    (Shape::flat(out_features), weights, bias)
                }
                LayerSpec::Relu | LayerSpec::Relu6 => (shape, Vec::new(), Vec::new()),
                LayerSpec::Softmax => (Shape::flat(shape.len()), Vec::new(), Vec::new()),
            };

            match output.checked_len() {
                Some(len) if len > 0 && len <= MAX_TENSOR_LEN => {}
                _ => return Err(bad_shape()),
            }
            layers.push(Layer {
                spec,
                input: shape,
                output,
                weights,
                bias,
            });
            shape = output;
        }

        if cursor != params.len() {
            return Err(malformed(format!(
                "{} trailing parameters after the last layer",
                params.len() - cursor
            )));
        }

        let labels = (!header.labels.is_empty()).then(|| Labels::new(header.labels));

        Ok(Model {
            input,
            layers,
            labels,
        })
    }

    pub fn input(&self) -> &InputSpec {
        &self.input
    }

    pub(crate) fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Length of the class-probability vector.
    pub fn num_classes(&self) -> usize {
        self.layers.last().map_or(0, |l| l.output.len())
    }

    /// Labels embedded in the model header, if any.
    pub fn labels(&self) -> Option<&Labels> {
        self.labels.as_ref()
    }

    /// Replace the embedded labels with an externally supplied list.
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = Some(labels);
        self
    }
}

fn conv_params(spec: &LayerSpec) -> Option<ConvParams> {
    match *spec {
        LayerSpec::Conv2d {
            out_channels,
            kernel,
            stride,
            padding,
            groups,
        } if out_channels > 0 => Some(ConvParams {
            out_channels,
            kernel,
            stride,
            padding,
            groups,
        }),
        _ => None,
    }
}

/// Writes model blobs in the format [`Model::from_bytes`] reads.
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    input: InputSpec,
    layers: Vec<LayerSpec>,
    params: Vec<f32>,
    labels: Vec<String>,
}

impl ModelBuilder {
    pub fn new(input: InputSpec) -> Self {
        ModelBuilder {
            input,
            ..Default::default()
        }
    }

    /// Append a layer followed by its parameters (weights, then bias).
    pub fn layer(mut self, spec: LayerSpec, params: &[f32]) -> Self {
        self.layers.push(spec);
        self.params.extend_from_slice(params);
        self
    }

    pub fn labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header = Header {
            input: self.input,
            layers: self.layers,
            labels: self.labels,
        };
        let header = serde_json::to_vec(&header).expect("model header is always serializable");

        let mut out = Vec::with_capacity(PREAMBLE_LEN + header.len() + self.params.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        for p in &self.params {
            out.extend_from_slice(&p.to_le_bytes());
        }
        out
    }
}
