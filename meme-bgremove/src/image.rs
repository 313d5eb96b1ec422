//! Image references and binary image payloads.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// How many characters of a reference to show in logs.
const SUMMARY_LEN: usize = 64;

/// A reference to loadable image data: a URL, a data URI, or a handle URL.
///
/// No validation happens here. A malformed reference only fails once a
/// segmentation service tries to load it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Wrap a reference string.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Encode raw image bytes as a base64 data URI.
    #[must_use]
    pub fn from_bytes(content_type: &str, bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{content_type};base64,{encoded}"))
    }

    /// The reference string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a `data:` URI.
    #[must_use]
    pub fn is_data_uri(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// A short, log-friendly form. Data URIs are reduced to their media
    /// type and length.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_data_uri() {
            let media = self.0[5..].split([';', ',']).next().unwrap_or_default();
            return format!("data:{media} ({} bytes)", self.0.len());
        }
        match self.0.char_indices().nth(SUMMARY_LEN) {
            Some((cut, _)) => format!("{}...", &self.0[..cut]),
            None => self.0.clone(),
        }
    }
}

impl From<String> for ImageRef {
    fn from(reference: String) -> Self {
        Self(reference)
    }
}

impl From<&str> for ImageRef {
    fn from(reference: &str) -> Self {
        Self(reference.to_string())
    }
}

impl From<url::Url> for ImageRef {
    fn from(url: url::Url) -> Self {
        Self(url.into())
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binary image data returned by a segmentation service.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl ImagePayload {
    /// Wrap raw bytes with an optional MIME type.
    #[must_use]
    pub fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
        }
    }

    /// The raw image bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The MIME type the service declared, or one sniffed from the bytes.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type
            .as_deref()
            .or_else(|| sniff_content_type(&self.bytes))
    }

    /// Take the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type())
            .finish()
    }
}

/// Detect a MIME type from magic bytes.
#[must_use]
pub fn sniff_content_type(data: &[u8]) -> Option<&'static str> {
    // PNG: 89 50 4E 47
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        return Some("image/png");
    }
    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    // WebP: RIFF....WEBP
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}
