//! Target-size search over a decoded pixel buffer.
//!
//! Both searches are plain functions of `(backend, pixels, target, format,
//! config)`: they hold no state between calls and never mutate the source
//! buffer, so one image's search cannot affect another's.
//!
//! | Search | Varies | Strategy |
//! |---|---|---|
//! | [`search_quality`] | quality | optional max-quality probe, then binary search |
//! | [`search_resize`] | scale × quality | scale candidates around `sqrt(target/original)`, short descending quality sweep each |
//!
//! Each search returns its closest attempt even when nothing lands inside the
//! tolerance band. Encoder failures abort the search with [`SearchError`].

mod quality;
mod resize;

pub use quality::search_quality;
pub use resize::search_resize;

use crate::codec::Blob;
use crate::imaging::{BackendError, Dimensions, EncodeParams, ImageBackend};
use crate::types::{CancelToken, CompressionTarget};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Search cancelled")]
    Cancelled,
}

/// One trial encode and how far it landed from the target.
#[derive(Debug, Clone)]
pub struct EncodeAttempt {
    pub dimensions: Dimensions,
    pub quality: f32,
    pub blob: Blob,
    /// `|size - target|` in bytes.
    pub difference: u64,
}

impl EncodeAttempt {
    pub fn size(&self) -> u64 {
        self.blob.size()
    }
}

/// Result of one search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Closest attempt seen, or the first one inside the tolerance band.
    pub best: EncodeAttempt,
    /// `best` is inside the tolerance band.
    pub hit: bool,
    /// Even the highest quality tried came out below the target, so lowering
    /// resolution cannot help.
    pub saturated: bool,
}

impl SearchOutcome {
    fn hit(best: EncodeAttempt) -> Self {
        Self {
            best,
            hit: true,
            saturated: false,
        }
    }

    fn miss(best: EncodeAttempt) -> Self {
        Self {
            best,
            hit: false,
            saturated: false,
        }
    }
}

/// Encode `pixels` once and measure it against `target`.
fn attempt<B: ImageBackend + ?Sized>(
    backend: &B,
    pixels: &DynamicImage,
    params: &EncodeParams,
    target: &CompressionTarget,
    cancel: &CancelToken,
) -> Result<EncodeAttempt, SearchError> {
    if cancel.is_cancelled() {
        return Err(SearchError::Cancelled);
    }
    let blob = backend.encode(pixels, params)?;
    Ok(EncodeAttempt {
        dimensions: Dimensions::of(pixels),
        quality: params.quality.value(),
        difference: blob.size().abs_diff(target.size),
        blob,
    })
}

/// Keep whichever attempt is closer to the target; ties keep the incumbent.
fn closer(current: Option<EncodeAttempt>, candidate: EncodeAttempt) -> EncodeAttempt {
    match current {
        Some(current) if current.difference <= candidate.difference => current,
        _ => candidate,
    }
}
