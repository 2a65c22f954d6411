//! Image encoding: JPEG, PNG, WebP

use imageproc::image::{DynamicImage, ExtendedColorType, RgbImage};
use webp::WebPMemory;

use super::{ImageFormat, PixelBuffer};

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

/// Compress an image to JPEG format with the specified quality
pub fn compress_to_jpeg<W>(
    buf: &PixelBuffer,
    writer: &mut W,
    quality: u8,
) -> imageproc::image::ImageResult<()>
where
    W: std::io::Write,
{
    let mut encoder =
        imageproc::image::codecs::jpeg::JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));

    // JPEG has no alpha channel
    encoder.encode_image(&to_rgb(buf))
}

/// Compress an image to PNG format with the specified compression level
pub fn compress_to_png<W>(
    buf: &PixelBuffer,
    writer: &mut W,
    compression: PngCompression,
) -> imageproc::image::ImageResult<()>
where
    W: std::io::Write,
{
    use imageproc::image::codecs::png::{CompressionType, FilterType, PngEncoder};
    use imageproc::image::ImageEncoder;

    let compression_type = match compression {
        PngCompression::Fast => CompressionType::Fast,
        PngCompression::Default => CompressionType::Default,
        PngCompression::Best => CompressionType::Best,
    };

    let encoder = PngEncoder::new_with_quality(writer, compression_type, FilterType::Adaptive);

    encoder.write_image(
        buf.as_bytes(),
        buf.width(),
        buf.height(),
        ExtendedColorType::Rgba8,
    )
}

/// Compress an image to WebP format with the specified quality
pub fn compress_to_webp(buf: &PixelBuffer, quality: u8) -> WebPMemory {
    let rgb = to_rgb(buf);
    webp::Encoder::from_rgb(rgb.as_raw(), buf.width(), buf.height()).encode(quality as f32)
}

/// Encode `buf` for display.
///
/// Empty buffers encode to an empty blob; every other buffer succeeds.
pub fn encode(buf: &PixelBuffer, format: ImageFormat) -> Vec<u8> {
    if buf.is_empty() {
        log::warn!("Refusing to encode an empty {}x{} buffer", buf.width(), buf.height());
        return Vec::new();
    }

    let (width, height) = buf.dimensions();
    let mut buffer = Vec::with_capacity((width * height) as usize);

    match format {
        ImageFormat::Jpeg { quality } => {
            compress_to_jpeg(buf, &mut buffer, quality).expect("Writing to vec should never fail");
        }
        ImageFormat::Png { compression } => {
            compress_to_png(buf, &mut buffer, compression)
                .expect("Writing to vec should never fail");
        }
        ImageFormat::WebP { quality } => {
            buffer.extend_from_slice(&compress_to_webp(buf, quality));
        }
    }

    log::trace!("Encoded {width}x{height} image as {} ({} bytes)", format.extension(), buffer.len());
    buffer
}

fn to_rgb(buf: &PixelBuffer) -> RgbImage {
    DynamicImage::ImageRgba8(buf.as_image().clone()).into_rgb8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::decode;
    use proptest::prelude::*;

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let mut buf = PixelBuffer::new(width, height);
        for y in 0..height {
            for x in 0..width {
                buf.put_pixel(x, y, [(x * 40) as u8, (y * 40) as u8, 200, 255 - x as u8]);
            }
        }
        buf
    }

    #[test]
    fn png_round_trip_is_exact() {
        let buf = gradient(5, 3);
        for compression in [PngCompression::Fast, PngCompression::Default, PngCompression::Best] {
            let bytes = encode(&buf, ImageFormat::Png { compression });
            assert_eq!(decode(&bytes, Some("image/png")).unwrap(), buf);
        }
    }

    #[test]
    fn jpeg_keeps_dimensions_and_drops_alpha() {
        let buf = gradient(8, 6);
        let bytes = encode(&buf, ImageFormat::Jpeg { quality: 90 });
        let decoded = decode(&bytes, None).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert!(decoded.as_bytes().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn webp_produces_riff_container() {
        let bytes = encode(&gradient(4, 4), ImageFormat::WebP { quality: 80 });
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn empty_buffer_encodes_to_nothing() {
        assert!(encode(&PixelBuffer::new(0, 0), ImageFormat::default()).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn png_round_trip_any_buffer(
            (width, height, pixels) in (1u32..12, 1u32..12).prop_flat_map(|(w, h)| {
                (Just(w), Just(h), proptest::collection::vec(any::<u8>(), (w * h * 4) as usize))
            })
        ) {
            let buf = PixelBuffer::from_raw(width, height, pixels).unwrap();
            let bytes = encode(&buf, ImageFormat::default());
            prop_assert_eq!(decode(&bytes, None).unwrap(), buf);
        }
    }
}
