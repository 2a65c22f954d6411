pub mod config;
pub mod editor;
pub mod error;
pub mod image;
pub mod inference;
pub mod photo;
pub mod transform;
pub mod transport;

// Re-export commonly used types
pub use config::EditorConfig;
pub use editor::{Editor, Upload};
pub use error::{DecodeError, EditorError, InferenceError, Result};
pub use image::{ImageFormat, PixelBuffer, PngCompression};
pub use inference::{Classification, Labels, Model};
pub use photo::{Photo, PhotoHandle, PhotoId};
pub use transform::{ColorBias, ColorPreset, Kernel, Transform};
