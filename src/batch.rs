//! Batch policy layer: per-image targets, pre-validation, and the sequential
//! batch runner.
//!
//! ## Modes
//!
//! | Mode | Target for an image of size `S` |
//! |---|---|
//! | [`BatchMode::Uniform`] | the same byte count for every image |
//! | [`BatchMode::Proportional`] | `S × (1 − p/100)`, `p` in `(0, max_reduction_percent]` |
//! | [`BatchMode::Adaptive`] | [`adaptive_target`]`(S)`, a step function of `S` alone |
//!
//! ## Advisories
//!
//! Planning never blocks on an individual image. Each planned target may
//! carry an [`Advisory`]:
//!
//! - [`Advisory::NotCompressible`]: the target is at or above
//!   `batch.passthrough_ratio` of the original. The image is not sent to the
//!   orchestrator and ends in `Error` with a validation failure.
//! - [`Advisory::Aggressive`]: the target is below `batch.aggressive_ratio`
//!   of the original. It still runs; the caller is expected to confirm first
//!   ([`BatchPlan::needs_confirmation`]).
//!
//! Only a request that makes no sense as a whole (no images, zero target,
//! reduction out of range) fails planning with a [`ValidationError`].
//!
//! ## Running
//!
//! [`run_batch`] compresses images one at a time, in submission order. Each
//! image is finished before the next starts, progress events are sent in that
//! same order, and a failed image never stops the batch. The [`CancelToken`]
//! is checked before each image and inside the searches; everything not yet
//! finished when it fires stays `Pending`.

use crate::compress::Compressor;
use crate::config::CompressorConfig;
use crate::format::FormatHint;
use crate::imaging::{Dimensions, ImageBackend};
use crate::types::{
    CancelToken, CompressionResult, CompressionStatus, CompressionTarget, ErrorKind,
    ResultSummary, SourceImage, ValidationError,
};
use serde::Serialize;
use std::sync::mpsc::Sender;
use tracing::{info, warn};

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;

/// How targets are derived for a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchMode {
    /// Same absolute target for every image.
    Uniform { target_bytes: u64 },
    /// Shrink every image by the same percentage.
    Proportional { reduction_percent: f64 },
    /// Per-image target from the size step function.
    Adaptive,
}

impl BatchMode {
    /// Uniform mode from a target given in KB.
    pub fn uniform_kb(kb: u64) -> Result<Self, ValidationError> {
        let target_bytes = kb
            .checked_mul(KB)
            .ok_or(ValidationError::TargetTooLarge(kb))?;
        Ok(Self::Uniform { target_bytes })
    }
}

/// Caller-facing flag on a planned target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    /// Target is too close to (or above) the original to be worth encoding.
    NotCompressible,
    /// Target is a very small fraction of the original.
    Aggressive,
}

/// Planned target for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedTarget {
    pub name: String,
    pub original_size: u64,
    pub target_size: u64,
    /// `None` when the image is rejected as not compressible.
    #[serde(skip)]
    pub target: Option<CompressionTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<Advisory>,
    /// Header dimensions, once [`BatchPlan::identify`] has read them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

impl PlannedTarget {
    /// Target as a fraction of the original size.
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            return f64::INFINITY;
        }
        self.target_size as f64 / self.original_size as f64
    }
}

/// One [`PlannedTarget`] per submitted image, in submission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchPlan {
    pub targets: Vec<PlannedTarget>,
}

impl BatchPlan {
    pub fn with_advisory(&self, advisory: Advisory) -> impl Iterator<Item = &PlannedTarget> {
        self.targets
            .iter()
            .filter(move |t| t.advisory == Some(advisory))
    }

    /// At least one target is flagged [`Advisory::Aggressive`].
    pub fn needs_confirmation(&self) -> bool {
        self.with_advisory(Advisory::Aggressive).next().is_some()
    }

    /// Fill in each target's pixel dimensions from the image header.
    ///
    /// Unreadable headers are logged and leave the dimensions unset; the
    /// image still fails with a decode error when it runs.
    pub fn identify<B: ImageBackend>(&mut self, compressor: &Compressor<B>, images: &[SourceImage]) {
        for (planned, image) in self.targets.iter_mut().zip(images) {
            match compressor.identify(image) {
                Ok(dims) => planned.dimensions = Some(dims),
                Err(e) => warn!("{}: {e}", image.name),
            }
        }
    }

    /// Number of images that will reach the orchestrator.
    pub fn runnable(&self) -> usize {
        self.targets.iter().filter(|t| t.target.is_some()).count()
    }
}

/// Adaptive target for an original of `original` bytes.
///
/// | Original | Target |
/// |---|---|
/// | ≤ 100 KB | 80% |
/// | ≤ 500 KB | 70% |
/// | ≤ 1 MB | 60% |
/// | ≤ 3 MB | 50% |
/// | ≤ 5 MB | 40% |
/// | > 5 MB | 30%, at least 500 KB |
///
/// Every target is at least 10 KB.
///
/// ```
/// # use imgfit::batch::adaptive_target;
/// assert_eq!(adaptive_target(200 * 1024), 143_360);
/// assert_eq!(adaptive_target(20 * 1024), 16_384);
/// assert_eq!(adaptive_target(5 * 1024), 10 * 1024);
/// ```
pub fn adaptive_target(original: u64) -> u64 {
    let ratio = match original {
        s if s <= 100 * KB => 0.8,
        s if s <= 500 * KB => 0.7,
        s if s <= MB => 0.6,
        s if s <= 3 * MB => 0.5,
        s if s <= 5 * MB => 0.4,
        _ => 0.3,
    };
    let mut target = (original as f64 * ratio).round() as u64;
    if original > 5 * MB {
        target = target.max(500 * KB);
    }
    target.max(10 * KB)
}

/// Suggested uniform target for a set of images, in bytes.
///
/// 65% of the average original size in whole KB, at least 20 KB. Above
/// 500 KB the suggestion is 80% of the average instead. Returns `None` for an
/// empty set.
pub fn recommend_target(images: &[SourceImage]) -> Option<u64> {
    if images.is_empty() {
        return None;
    }
    let total: u64 = images.iter().map(SourceImage::byte_len).sum();
    let average = total as f64 / images.len() as f64;
    let mut kb = (average * 0.65 / KB as f64).round() as u64;
    if kb < 20 {
        kb = 20;
    }
    if kb > 500 {
        kb = (average * 0.8 / KB as f64).round() as u64;
    }
    Some(kb * KB)
}

/// Derive one target per image, with advisories.
pub fn plan_batch(
    images: &[SourceImage],
    mode: BatchMode,
    format: FormatHint,
    config: &CompressorConfig,
) -> Result<BatchPlan, ValidationError> {
    if images.is_empty() {
        return Err(ValidationError::NoImages);
    }
    match mode {
        BatchMode::Uniform { target_bytes: 0 } => return Err(ValidationError::NonPositiveTarget),
        BatchMode::Proportional { reduction_percent } => {
            let max = config.batch.max_reduction_percent;
            if !(reduction_percent > 0.0 && reduction_percent <= max) {
                return Err(ValidationError::ReductionOutOfRange {
                    value: reduction_percent,
                    max,
                });
            }
        }
        _ => {}
    }

    let mut targets = Vec::with_capacity(images.len());
    for image in images {
        let original = image.byte_len();
        let size = match mode {
            BatchMode::Uniform { target_bytes } => target_bytes,
            BatchMode::Proportional { reduction_percent } => {
                ((original as f64 * (1.0 - reduction_percent / 100.0)).round() as u64).max(1)
            }
            BatchMode::Adaptive => adaptive_target(original),
        };
        let target = CompressionTarget::new(size, config.search.tolerance, format)?;
        let ratio = target.ratio_of(original);

        let (target, advisory) = if ratio >= config.batch.passthrough_ratio {
            (None, Some(Advisory::NotCompressible))
        } else if ratio < config.batch.aggressive_ratio {
            (Some(target), Some(Advisory::Aggressive))
        } else {
            (Some(target), None)
        };

        targets.push(PlannedTarget {
            name: image.name.clone(),
            original_size: original,
            target_size: size,
            target,
            advisory,
            dimensions: None,
        });
    }
    Ok(BatchPlan { targets })
}

/// Progress events, sent in submission order.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    ImageStarted {
        index: usize,
        name: String,
    },
    ImageFinished {
        index: usize,
        summary: ResultSummary,
    },
}

/// Outcome of a batch run. `results` has one entry per submitted image.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub results: Vec<CompressionResult>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn count(&self, status: CompressionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn summaries(&self) -> Vec<ResultSummary> {
        self.results.iter().map(CompressionResult::summary).collect()
    }
}

fn emit(events: Option<&Sender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening
        let _ = tx.send(event);
    }
}

fn rejected(image: &SourceImage, planned: &PlannedTarget) -> CompressionResult {
    let mut result = CompressionResult::pending(image);
    result.target = Some(planned.target_size);
    result.fail(
        ErrorKind::Validation,
        format!(
            "Target size {} bytes is too close to the original {} bytes",
            planned.target_size, planned.original_size
        ),
    );
    result
}

/// Sequential driver shared by compression and conversion.
fn run_each<F>(
    images: &[SourceImage],
    cancel: &CancelToken,
    events: Option<&Sender<BatchEvent>>,
    mut process: F,
) -> BatchReport
where
    F: FnMut(usize, &SourceImage) -> CompressionResult,
{
    let mut results = Vec::with_capacity(images.len());
    let mut cancelled = false;

    for (index, image) in images.iter().enumerate() {
        if cancelled || cancel.is_cancelled() {
            cancelled = true;
            results.push(CompressionResult::pending(image));
            continue;
        }
        emit(
            events,
            BatchEvent::ImageStarted {
                index,
                name: image.name.clone(),
            },
        );
        let result = process(index, image);
        if result.status == CompressionStatus::Pending {
            cancelled = true;
        } else {
            emit(
                events,
                BatchEvent::ImageFinished {
                    index,
                    summary: result.summary(),
                },
            );
        }
        results.push(result);
    }

    let report = BatchReport { results, cancelled };
    info!(
        "batch finished: {} completed, {} failed, {} pending",
        report.count(CompressionStatus::Completed),
        report.count(CompressionStatus::Error),
        report.count(CompressionStatus::Pending)
    );
    report
}

/// Compress every image toward its planned target.
///
/// `plan` must come from [`plan_batch`] over the same `images`, in the same
/// order.
pub fn run_batch<B: ImageBackend>(
    compressor: &Compressor<B>,
    images: &[SourceImage],
    plan: &BatchPlan,
    cancel: &CancelToken,
    events: Option<&Sender<BatchEvent>>,
) -> BatchReport {
    run_each(images, cancel, events, |index, image| {
        match plan.targets.get(index) {
            Some(planned) => match &planned.target {
                Some(target) => compressor.compress(image, target, cancel),
                None => rejected(image, planned),
            },
            None => {
                let mut result = CompressionResult::pending(image);
                result.fail(ErrorKind::Validation, "No target planned for this image");
                result
            }
        }
    })
}

/// Convert every image to WebP at `quality`.
pub fn run_conversion<B: ImageBackend>(
    compressor: &Compressor<B>,
    images: &[SourceImage],
    quality: f32,
    cancel: &CancelToken,
    events: Option<&Sender<BatchEvent>>,
) -> BatchReport {
    run_each(images, cancel, events, |_, image| {
        compressor.convert(image, quality, cancel)
    })
}
