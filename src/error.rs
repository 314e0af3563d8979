//! Unified error types for the thumbnail cache.

use std::fmt;

/// Errors raised by cache and thumbnail-generation operations.
#[derive(Debug)]
pub enum CacheError {
    /// A derived key digest was not a 64-character hex string
    InvalidDigest(String),
    /// Read/write error against the backing store
    Io(String),
    /// The source bytes could not be decoded into a usable image
    Decode(String),
    /// The source image has no usable dimensions
    InvalidSource(String),
    /// Cooperative cancellation was observed at a checkpoint
    Cancelled,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::InvalidDigest(msg) => write!(f, "invalid digest: {}", msg),
            CacheError::Io(msg) => write!(f, "I/O error: {}", msg),
            CacheError::Decode(msg) => write!(f, "image decode error: {}", msg),
            CacheError::InvalidSource(msg) => write!(f, "invalid source image: {}", msg),
            CacheError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        CacheError::Decode(err.to_string())
    }
}

/// Type alias for Results in this crate.
pub type Result<T> = std::result::Result<T, CacheError>;
