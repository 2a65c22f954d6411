//! Error types surfaced across the editor boundary.

use crate::photo::PhotoId;
use crate::transform::KernelError;

/// Failure to turn uploaded bytes into a pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The bytes claim a supported format but cannot be decoded.
    #[error("malformed image: {0}")]
    Malformed(String),

    /// The bytes are not PNG or JPEG.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
}

/// Failure while preparing or running a classification model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("malformed model: {0}")]
    MalformedModel(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("label index {index} out of range for {len} labels")]
    LabelIndexOutOfRange { index: u32, len: usize },
}

/// Everything the editor can report to its host.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A transform was handed an empty buffer.
    #[error("invalid photo handle: the image is empty")]
    InvalidHandle,

    /// The photo is held by another request and the caller asked not to wait.
    #[error("photo is busy with another request")]
    Busy,

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("no photo registered under {0}")]
    UnknownPhoto(PhotoId),

    #[error("unknown transform `{0}`")]
    UnknownTransform(String),

    #[error("transform `{name}` expects {expected} parameters, got {actual}")]
    InvalidParameters {
        name: String,
        expected: String,
        actual: usize,
    },

    #[error("transform `{name}` got {value}, expected a value in {range}")]
    ParameterOutOfRange {
        name: String,
        value: i32,
        range: String,
    },

    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// The transport wrapping (data URL / base64) could not be read.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
