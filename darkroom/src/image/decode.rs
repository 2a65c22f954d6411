//! Image decoding

use imageproc::image::{guess_format, load_from_memory_with_format, ImageFormat as Codec};

use super::PixelBuffer;
use crate::error::DecodeError;

/// Decode a PNG or JPEG byte stream into an RGBA buffer.
///
/// The format is sniffed from the magic bytes. `mime_hint` only matters when
/// sniffing fails: bytes the host labelled PNG/JPEG are reported as malformed
/// rather than unsupported.
pub fn decode(data: &[u8], mime_hint: Option<&str>) -> Result<PixelBuffer, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Malformed("empty input".to_string()));
    }

    let codec = match guess_format(data) {
        Ok(codec @ (Codec::Png | Codec::Jpeg)) => codec,
        Ok(other) => {
            return Err(DecodeError::UnsupportedFormat(format!("{other:?}")));
        }
        Err(_) => {
            return Err(match mime_hint.and_then(hinted_codec) {
                Some(codec) => DecodeError::Malformed(format!(
                    "bytes labelled {codec:?} do not start with a {codec:?} signature"
                )),
                None => DecodeError::UnsupportedFormat(
                    mime_hint.unwrap_or("unrecognized signature").to_string(),
                ),
            });
        }
    };

    let img = load_from_memory_with_format(data, codec)
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    log::debug!(
        "Decoded {codec:?} image {}x{} ({:?})",
        img.width(),
        img.height(),
        img.color()
    );

    Ok(PixelBuffer::from(img.into_rgba8()))
}

fn hinted_codec(mime: &str) -> Option<Codec> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" | "png" => Some(Codec::Png),
        "image/jpeg" | "image/jpg" | "jpeg" | "jpg" => Some(Codec::Jpeg),
        _ => None,
    }
}
