//! Resize search: trade resolution for bytes when quality alone misses.

use super::{EncodeAttempt, SearchError, SearchOutcome, attempt, closer};
use crate::config::ResizeConfig;
use crate::format::OutputFormat;
use crate::imaging::calculations::{resize_plan, scale_candidates, seed_scale};
use crate::imaging::{Dimensions, EncodeParams, ImageBackend};
use crate::types::{CancelToken, CompressionTarget};
use image::DynamicImage;
use tracing::debug;

/// Sweep scaled copies of `pixels` for an encode that lands near `target`.
///
/// The seed scale comes from the ratio of `target` to `original_size` (the
/// source file size in bytes). Each distinct candidate size is resampled once
/// from the original buffer and encoded at every quality in
/// `config.qualities`, highest first. The first attempt inside the tolerance
/// band is returned; otherwise the closest attempt across all candidates.
///
/// Returns `Ok(None)` when every candidate falls below `min_dimension`.
pub fn search_resize<B: ImageBackend + ?Sized>(
    backend: &B,
    pixels: &DynamicImage,
    original_size: u64,
    target: &CompressionTarget,
    format: OutputFormat,
    config: &ResizeConfig,
    cancel: &CancelToken,
) -> Result<Option<SearchOutcome>, SearchError> {
    let source = Dimensions::of(pixels);
    let seed = seed_scale(target.size, original_size, config.min_scale, config.max_scale);
    let candidates = scale_candidates(seed, &config.variations, config.min_scale, config.max_scale);
    let plan = resize_plan(source, &candidates, config.min_dimension);
    debug!(
        "resize search: seed scale {seed:.3}, {} candidate sizes",
        plan.len()
    );

    // Quality does not move a lossless encode, so one pass per size is enough.
    let sweep = if format.is_lossy() {
        &config.qualities[..]
    } else {
        &config.qualities[..config.qualities.len().min(1)]
    };

    let mut best: Option<EncodeAttempt> = None;
    for (scale, dims) in plan {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let resized;
        let buffer = if dims == source {
            pixels
        } else {
            resized = backend.resize(pixels, dims);
            &resized
        };

        for &quality in sweep {
            let params = EncodeParams::new(format, quality);
            let current = attempt(backend, buffer, &params, target, cancel)?;
            debug!(
                "scale {scale:.3} ({}x{}) q={quality:.2}: size={} diff={}",
                dims.width,
                dims.height,
                current.size(),
                current.difference
            );
            if target.is_hit(current.size()) {
                return Ok(Some(SearchOutcome::hit(current)));
            }
            best = Some(closer(best.take(), current));
        }
    }

    Ok(best.map(SearchOutcome::miss))
}
