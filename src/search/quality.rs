//! Quality search at a fixed resolution.

use super::{EncodeAttempt, SearchError, SearchOutcome, attempt, closer};
use crate::config::SearchConfig;
use crate::format::OutputFormat;
use crate::imaging::{EncodeParams, ImageBackend};
use crate::types::{CancelToken, CompressionTarget};
use image::DynamicImage;
use tracing::debug;

/// Find the encoder quality whose output lands closest to `target`.
///
/// With `probe_max_quality`, one encode at `max_quality` runs first: if that
/// is already at or under the target the search stops there, marked
/// saturated. Otherwise the quality interval `[min_quality, max_quality]` is
/// halved around each midpoint encode until an attempt is inside the
/// tolerance band, `max_iterations` encodes have run, or the interval is
/// narrower than `min_interval`.
///
/// Formats whose size does not depend on quality get a single encode.
pub fn search_quality<B: ImageBackend + ?Sized>(
    backend: &B,
    pixels: &DynamicImage,
    target: &CompressionTarget,
    format: OutputFormat,
    config: &SearchConfig,
    cancel: &CancelToken,
) -> Result<SearchOutcome, SearchError> {
    let mut best: Option<EncodeAttempt> = None;

    if config.probe_max_quality || !format.is_lossy() {
        let params = EncodeParams::new(format, config.max_quality);
        let probe = attempt(backend, pixels, &params, target, cancel)?;
        debug!(
            "probe q={:.3} size={} target={}",
            probe.quality,
            probe.size(),
            target.size
        );
        if target.is_hit(probe.size()) {
            return Ok(SearchOutcome::hit(probe));
        }
        if probe.size() < target.size || !format.is_lossy() {
            let saturated = probe.size() < target.size;
            return Ok(SearchOutcome {
                best: probe,
                hit: false,
                saturated,
            });
        }
        best = Some(probe);
    }

    let mut low = config.min_quality;
    let mut high = config.max_quality;
    let mut iterations = 0;

    loop {
        let mid = (low + high) / 2.0;
        let params = EncodeParams::new(format, mid);
        let current = attempt(backend, pixels, &params, target, cancel)?;
        iterations += 1;
        debug!(
            "iteration {iterations}: q={mid:.3} size={} diff={}",
            current.size(),
            current.difference
        );

        if target.is_hit(current.size()) {
            return Ok(SearchOutcome::hit(current));
        }
        if current.size() > target.size {
            high = mid;
        } else {
            low = mid;
        }

        let closest = closer(best.take(), current);
        if iterations >= config.max_iterations || high - low <= config.min_interval {
            debug!(
                "quality search exhausted after {iterations} encodes, best q={:.3} diff={}",
                closest.quality, closest.difference
            );
            return Ok(SearchOutcome::miss(closest));
        }
        best = Some(closest);
    }
}
