//! Disk-backed, content-addressed thumbnail cache with a single-flight
//! generation queue.
//!
//! Expensive derived artifacts (image thumbnails) are produced once, stored
//! under a sharded on-disk layout keyed by a SHA-256 digest of the logical
//! key, and served from disk afterwards. A single background worker loop
//! drains all generation work, so concurrent requests never thrash the
//! decode/resize path, and concurrent requests for the *same* key share one
//! unit of work.
//!
//! Typical use:
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use std::sync::Arc;
//! use thumbcache::{CacheConfig, SourceFactory, ThumbnailService};
//!
//! let service = ThumbnailService::new(CacheConfig::new("/var/cache/thumbs"))?;
//! let source: SourceFactory = Arc::new(|| {
//!     let file = File::open("/photos/cat.jpg")?;
//!     Ok(Box::new(file) as Box<dyn Read + Send>)
//! });
//! let artifact = service.artifact("/photos/cat.jpg", source);
//!
//! // Non-blocking: a miss kicks off background generation; subscribe to
//! // learn when the value lands, then re-read.
//! artifact.subscribe(|property| println!("changed: {property:?}"));
//! let maybe_thumb = artifact.image();
//! # Ok::<(), thumbcache::CacheError>(())
//! ```

pub mod artifact;
pub mod cancel;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod service;
pub mod store;

pub use artifact::{ArtifactProperty, SubscriptionId, ThumbnailArtifact};
pub use cancel::CancellationToken;
pub use config::{CacheConfig, DEFAULT_THUMBNAIL_EDGE, GIB};
pub use error::{CacheError, Result};
pub use pipeline::{SourceFactory, Thumbnail};
pub use pool::CachePool;
pub use queue::{WorkQueue, WorkUnit};
pub use service::{InlineDispatcher, NotifyDispatcher, ThumbnailService};
pub use store::ContentAddressedStore;
