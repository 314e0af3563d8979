//! Cache and pipeline configuration.

use std::path::PathBuf;

/// Longer edge of generated thumbnails, in pixels.
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 128;

/// One gibibyte, the default on-disk capacity.
pub const GIB: u64 = 1024 * 1024 * 1024;

/// Construction-time configuration for a [`crate::ThumbnailService`].
///
/// All values are fixed for the lifetime of the service; there is no runtime
/// reconfiguration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory of the on-disk cache tree.
    pub cache_root: PathBuf,
    /// Capacity of the on-disk cache in bytes.
    pub capacity_bytes: u64,
    /// Target edge length for generated thumbnails.
    pub thumbnail_edge: u32,
}

impl CacheConfig {
    /// Creates a configuration with default capacity (1 GiB) and thumbnail
    /// edge (128 px).
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            capacity_bytes: GIB,
            thumbnail_edge: DEFAULT_THUMBNAIL_EDGE,
        }
    }

    /// Sets the on-disk capacity in bytes.
    pub fn capacity_bytes(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    /// Sets the thumbnail target edge length in pixels.
    pub fn thumbnail_edge(mut self, thumbnail_edge: u32) -> Self {
        self.thumbnail_edge = thumbnail_edge;
        self
    }
}
