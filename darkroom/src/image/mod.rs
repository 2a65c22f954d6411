//! Pixel buffers and the PNG/JPEG codec around them

mod decode;
mod encode;

pub use decode::decode;
pub use encode::{compress_to_jpeg, compress_to_png, compress_to_webp, encode, PngCompression};

use imageproc::image::{Rgba, RgbaImage};

/// Decoded RGBA8 image, row-major with the origin at the top-left.
///
/// Always holds exactly `width * height` pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer(RgbaImage);

impl PixelBuffer {
    /// Allocate a fully transparent black buffer.
    pub fn new(width: u32, height: u32) -> Self {
        PixelBuffer(RgbaImage::new(width, height))
    }

    /// Buffer where every pixel is `rgba`.
    pub fn from_pixel(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        PixelBuffer(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    /// Wrap raw RGBA bytes. Returns `None` unless `pixels.len() == width * height * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        if pixels.len() != expected {
            return None;
        }
        RgbaImage::from_raw(width, height, pixels).map(PixelBuffer)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// True when the buffer has no pixels, which every transform rejects.
    pub fn is_empty(&self) -> bool {
        self.0.width() == 0 || self.0.height() == 0
    }

    /// Raw RGBA bytes, four per pixel.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.0.get_pixel(x, y).0
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        self.0.put_pixel(x, y, Rgba(rgba));
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.0
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(img: RgbaImage) -> Self {
        PixelBuffer(img)
    }
}

impl From<PixelBuffer> for RgbaImage {
    fn from(buf: PixelBuffer) -> Self {
        buf.0
    }
}

/// Encoding used when handing an image back to the host for display.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ImageFormat {
    Jpeg { quality: u8 },
    Png { compression: PngCompression },
    WebP { quality: u8 },
}

impl Default for ImageFormat {
    fn default() -> Self {
        ImageFormat::Png {
            compression: PngCompression::Fast,
        }
    }
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "jpg",
            ImageFormat::Png { .. } => "png",
            ImageFormat::WebP { .. } => "webp",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg { .. } => "image/jpeg",
            ImageFormat::Png { .. } => "image/png",
            ImageFormat::WebP { .. } => "image/webp",
        }
    }

    /// Only PNG re-decodes to the exact same pixels.
    pub fn is_lossless(&self) -> bool {
        matches!(self, ImageFormat::Png { .. })
    }

    /// Pick a format from a file extension, using `quality` for the lossy ones.
    pub fn from_extension(ext: &str, quality: u8) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png {
                compression: PngCompression::Default,
            }),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg { quality }),
            "webp" => Some(ImageFormat::WebP { quality }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 15]).is_none());
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 17]).is_none());
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn zero_area_buffer_is_empty() {
        assert!(PixelBuffer::new(0, 5).is_empty());
        assert!(PixelBuffer::new(5, 0).is_empty());
        assert!(!PixelBuffer::new(1, 1).is_empty());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ImageFormat::from_extension("JPG", 80),
            Some(ImageFormat::Jpeg { quality: 80 })
        );
        assert!(ImageFormat::from_extension("png", 80)
            .is_some_and(|f| f.is_lossless() && f.mime() == "image/png"));
        assert_eq!(ImageFormat::from_extension("gif", 80), None);
    }
}
