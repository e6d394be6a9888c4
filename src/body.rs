//! Body-building helpers.
//!
//! Free functions that produce a body byte buffer for a [`Frame`]; the
//! caller attaches the buffer with `set_body` and the matching
//! `content-type` via `append_content_type(mime, encoding)`.
//!
//! [`Frame`]: crate::frame::Frame

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

/// MIME type suggested for JSON bodies.
pub const JSON_MIME: &str = "text/json";

/// Encode a string into body bytes for the given native encoding tag.
///
/// - `utf16le`: UTF-16 code units, little endian.
/// - `base64`: base64 of the string's UTF-8 bytes.
/// - `utf8`, `ascii`, anything else: the UTF-8 bytes as-is.
pub fn from_text(text: &str, encoding: &str) -> Vec<u8> {
    match encoding {
        "utf16le" => text
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect(),
        "base64" => to_base64(text.as_bytes()),
        _ => text.as_bytes().to_vec(),
    }
}

/// Serialize a value to compact JSON body bytes. Pair with [`JSON_MIME`].
pub fn from_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(value)
}

/// Base64-encode an arbitrary buffer into a new body buffer.
pub fn to_base64(data: &[u8]) -> Vec<u8> {
    BASE64.encode(data).into_bytes()
}

/// Deep-copy a region of an existing buffer, clamped to its bounds.
pub fn copy_region(source: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let start = offset.min(source.len());
    let end = offset.saturating_add(len).min(source.len());
    source[start..end].to_vec()
}
