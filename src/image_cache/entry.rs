//! Cache Entry Types
//!
//! [`CacheKey`] is a normalized, validated image URL plus the SHA-256 digest
//! used as its disk file name. [`CachedImage`] is the owned byte payload with
//! the metadata recovered by decoding it.

use std::hash::{Hash, Hasher};

use bytes::Bytes;
use image::ImageFormat;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::ImageError;

/// Trim surrounding whitespace and drop control characters.
pub fn normalize_url(raw: &str) -> String {
    raw.trim().chars().filter(|c| !c.is_control()).collect()
}

/// Cache key - normalized URL and its digest
#[derive(Clone, Debug, Eq)]
pub struct CacheKey {
    /// Normalized URL
    url: String,
    /// Lowercase hex SHA-256 of `url`
    digest: String,
}

impl CacheKey {
    /// Normalize and validate a URL. Only absolute http(s) URLs are accepted.
    pub fn parse(raw: &str) -> Result<Self, ImageError> {
        let normalized = normalize_url(raw);
        let invalid = |reason: String| ImageError::InvalidUrl {
            url: normalized.clone(),
            reason,
        };

        if normalized.is_empty() {
            return Err(invalid("empty URL".into()));
        }

        let parsed = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".into()));
        }

        let url = String::from(parsed);
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        Ok(Self { url, digest })
    }

    /// Normalized URL
    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Disk file name
    #[inline]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Decoded image payload shared read-only with callers.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedImage {
    bytes: Bytes,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl CachedImage {
    /// Decode `bytes`; anything that is not a readable image is a
    /// [`ImageError::Decode`].
    pub fn decode(url: &str, bytes: Bytes) -> Result<Self, ImageError> {
        let decode_err = |reason: String| ImageError::Decode {
            url: url.to_string(),
            reason,
        };

        if bytes.is_empty() {
            return Err(decode_err("empty body".into()));
        }

        let format = image::guess_format(&bytes).map_err(|e| decode_err(e.to_string()))?;
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| decode_err(e.to_string()))?;

        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
            format,
        })
    }

    /// [`decode`](Self::decode) on the blocking pool. Full decodes are CPU
    /// bound and must stay off the async workers.
    pub async fn decode_blocking(url: &str, bytes: Bytes) -> Result<Self, ImageError> {
        let owned_url = url.to_string();
        tokio::task::spawn_blocking(move || Self::decode(&owned_url, bytes))
            .await
            .unwrap_or_else(|e| {
                Err(ImageError::Decode {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            })
    }

    /// Encoded bytes as fetched
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size in bytes, as charged against tier capacity
    #[inline]
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Encode a solid-colour PNG for tests.
#[cfg(test)]
pub(crate) fn test_png(width: u32, height: u32) -> Bytes {
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;

    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_pixel(width, height, Rgb([212, 175, 55]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("encode test png");
    Bytes::from(buf.into_inner())
}

// =============================================================================
// Tests
// =============================================================================
