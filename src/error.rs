//! Error types for the catalog core

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the catalog core
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document store could not be reached or answered with a failure
    #[error("Document store error: {0}")]
    Store(String),

    /// Query rejected before it was sent to the store
    #[error("Invalid query on {collection}: {reason}")]
    InvalidQuery { collection: String, reason: String },

    /// Catalog export could not be parsed
    #[error("Failed to parse catalog export: {0}")]
    ExportParse(#[from] serde_json::Error),

    // =========================================================================
    // Image Cache Errors
    // =========================================================================
    /// Classified image load failure
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Disk cache operation failed
    #[error("Disk cache error for {key}: {reason}")]
    DiskCache { key: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Classified failure for a single image URL.
///
/// Cloneable so one failed fetch can be handed to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// URL was malformed after normalization; no request was made
    #[error("Invalid image URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport failure or non-success HTTP status
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    /// Fetch did not complete within the configured timeout
    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    /// Response body was not a decodable image
    #[error("Failed to decode image from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Every interested caller withdrew before the fetch finished
    #[error("Image load cancelled for {url}")]
    Cancelled { url: String },
}

impl ImageError {
    /// Whether a later attempt may succeed.
    ///
    /// Invalid URLs are permanent placeholders; everything else can be retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ImageError::InvalidUrl { .. })
    }

    /// The URL the error refers to
    pub fn url(&self) -> &str {
        match self {
            ImageError::InvalidUrl { url, .. }
            | ImageError::Network { url, .. }
            | ImageError::Timeout { url }
            | ImageError::Decode { url, .. }
            | ImageError::Cancelled { url } => url,
        }
    }
}

/// A single catalog document that could not be decoded into its typed entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to decode {collection}/{document_id}: {reason}")]
pub struct DocumentDecodeError {
    /// Collection the document came from
    pub collection: String,
    /// Document identifier
    pub document_id: String,
    /// Field path and cause, as reported by the decoder
    pub reason: String,
}

// =============================================================================
// Tests
// =============================================================================
