//! Thumbnail generation pipeline: decode → resize → encode → store.
//!
//! One invocation turns a cache-miss request into a stored PNG entry and an
//! in-memory [`Thumbnail`]. A populated cache short-circuits the whole chain:
//! the cached PNG is decoded and returned without touching the source.
//!
//! The cache-store step is fail-open: if the pool rejects the write, the
//! freshly generated thumbnail is still returned to the caller.

use crate::cancel::CancellationToken;
use crate::error::{CacheError, Result};
use crate::pool::CachePool;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use log::{debug, warn};
use std::io::{self, Cursor, Read};
use std::sync::Arc;

/// Zero-argument capability producing a fresh readable source stream,
/// positioned at its start. Invoked at most once per generation attempt.
pub type SourceFactory = Arc<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

/// Decoded thumbnail: tightly packed RGB8 pixels plus dimensions.
#[derive(Clone)]
pub struct Thumbnail {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    fn from_dynamic(img: &DynamicImage) -> Self {
        let rgb = img.to_rgb8();
        Self {
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
        }
    }
}

/// Produces the thumbnail for `key`, serving from `pool` when possible and
/// writing back to it after generation.
///
/// Cancellation is honored before the cache check, before decoding, before
/// resizing, and before encoding, so a unit whose token was tripped while it
/// sat in the queue does no work even when the cache is populated. Once the
/// store step begins the unit runs to completion, so a half-written cache
/// entry can never be observed.
pub fn produce(
    pool: &CachePool,
    key: &str,
    source: &SourceFactory,
    edge: u32,
    token: &CancellationToken,
) -> Result<Thumbnail> {
    token.checkpoint()?;
    if let Some(bytes) = pool.try_get(key) {
        match decode_cached(&bytes) {
            Ok(thumbnail) => {
                debug!("thumbnail for {} served from cache", key);
                return Ok(thumbnail);
            }
            // A corrupt entry falls through to regeneration; the fresh put
            // below overwrites it.
            Err(err) => warn!("cached thumbnail for {} unusable: {}", key, err),
        }
    }

    token.checkpoint()?;
    let mut reader = source()?;
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let img = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()?
        .decode()?;

    let (src_w, src_h) = (img.width(), img.height());
    if src_w == 0 || src_h == 0 {
        return Err(CacheError::InvalidSource(format!(
            "{}x{} source for {}",
            src_w, src_h, key
        )));
    }

    token.checkpoint()?;
    let (thumb_w, thumb_h) = thumbnail_dimensions(src_w, src_h, edge);
    let resized = img.resize_exact(thumb_w, thumb_h, FilterType::Lanczos3);

    token.checkpoint()?;
    let mut encoded = Vec::new();
    resized.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

    if !pool.put(key, &encoded) {
        warn!("thumbnail for {} not cached, serving uncached result", key);
    }
    Ok(Thumbnail::from_dynamic(&resized))
}

fn decode_cached(bytes: &[u8]) -> Result<Thumbnail> {
    let img = image::load_from_memory(bytes)?;
    Ok(Thumbnail::from_dynamic(&img))
}

/// Maps the longer source edge to `edge` and scales the shorter side
/// proportionally, rounded to nearest. Extreme aspect ratios clamp the short
/// side to one pixel.
fn thumbnail_dimensions(src_w: u32, src_h: u32, edge: u32) -> (u32, u32) {
    if src_w >= src_h {
        let scaled = (f64::from(edge) * f64::from(src_h) / f64::from(src_w)).round() as u32;
        (edge, scaled.max(1))
    } else {
        let scaled = (f64::from(edge) * f64::from(src_w) / f64::from(src_h)).round() as u32;
        (scaled.max(1), edge)
    }
}
