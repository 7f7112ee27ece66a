//! Small image byte strings for tests
//!
//! Ingest only sniffs magic bytes, so each fixture is a real signature
//! followed by a distinguishing tail.

use bytes::Bytes;

pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
pub const JPEG_SIGNATURE: &[u8] = b"\xff\xd8\xff\xe0";

/// 1x1 red pixel PNG, base64-encoded.
pub const ONE_PIXEL_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8DwHwAFBQIAX8jx0gAAAABJRU5ErkJggg==";

/// A PNG-signed payload whose tail is `tag`.
pub fn png(tag: &str) -> Bytes {
    Bytes::from([PNG_SIGNATURE, tag.as_bytes()].concat())
}

/// A JPEG-signed payload whose tail is `tag`.
pub fn jpeg(tag: &str) -> Bytes {
    Bytes::from([JPEG_SIGNATURE, tag.as_bytes()].concat())
}

/// Bytes no image format claims.
pub fn not_an_image() -> Bytes {
    Bytes::from_static(b"plain text, definitely not pixels")
}
