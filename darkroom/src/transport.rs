//! Data-URL and base64 wrapping used to move bytes across the host boundary.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;

use crate::error::{EditorError, Result};

/// Bytes unwrapped from the host, with the MIME type if a data URL named one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Unwrap a `data:<mime>;base64,<data>` URL or bare base64.
///
/// Whitespace inside the base64 text (line wrapping) is ignored and padding
/// is optional.
pub fn decode_payload(input: &str) -> Result<Payload> {
    let input = input.trim();

    let (mime, encoded) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| EditorError::Transport("data URL has no `,` separator".to_string()))?;
            let mut parts = meta.split(';');
            let mime = parts.next().filter(|m| !m.is_empty()).map(str::to_string);
            if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
                return Err(EditorError::Transport(
                    "only base64 data URLs are supported".to_string(),
                ));
            }
            (mime, data)
        }
        None => (None, input),
    };

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(&compact)
        .or_else(|_| STANDARD_NO_PAD.decode(&compact))
        .map_err(|e| EditorError::Transport(format!("invalid base64: {e}")))?;

    Ok(Payload { mime, bytes })
}

/// Unwrap a transported text file, such as a label list.
pub fn decode_text(input: &str) -> Result<String> {
    let payload = decode_payload(input)?;
    String::from_utf8(payload.bytes)
        .map_err(|e| EditorError::Transport(format!("payload is not UTF-8: {e}")))
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
