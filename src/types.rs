//! Shared types passed between the batch layer, the orchestrator, and callers.
//!
//! The lifecycle is linear: a [`SourceImage`] is created when a file is
//! admitted, the batch layer derives one [`CompressionTarget`] per image, and
//! the orchestrator produces one [`CompressionResult`] per image. None of the
//! inputs are mutated during a run.

use crate::codec::Blob;
use crate::format::{FormatHint, OutputFormat};
use crate::imaging::Dimensions;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Raised before any encode attempt when the batch request makes no sense.
///
/// A validation error blocks the whole invocation: there is nothing to
/// partially succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No images selected")]
    NoImages,
    #[error("Target size must be greater than zero")]
    NonPositiveTarget,
    #[error("Target size of {0} KB is too large")]
    TargetTooLarge(u64),
    #[error("Reduction must be within (0, {max}] percent, got {value}")]
    ReductionOutOfRange { value: f64, max: f64 },
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// An input image exactly as the caller handed it over.
///
/// Pixel dimensions are only known once the bytes are decoded; the
/// orchestrator records them on the [`CompressionResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Display name, usually the original filename.
    pub name: String,
    /// Declared MIME type (e.g. `image/png`).
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Desired output size for one image, fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionTarget {
    /// Target byte size. Always greater than zero.
    pub size: u64,
    /// Acceptable absolute deviation from `size`, in bytes.
    pub tolerance: u64,
    pub format: FormatHint,
}

impl CompressionTarget {
    /// Build a target whose tolerance is `tolerance_ratio` of `size`.
    pub fn new(size: u64, tolerance_ratio: f64, format: FormatHint) -> Result<Self, ValidationError> {
        if size == 0 {
            return Err(ValidationError::NonPositiveTarget);
        }
        Ok(Self {
            size,
            tolerance: (size as f64 * tolerance_ratio).round() as u64,
            format,
        })
    }

    /// Target size as a fraction of `original`.
    pub fn ratio_of(&self, original: u64) -> f64 {
        if original == 0 {
            return f64::INFINITY;
        }
        self.size as f64 / original as f64
    }

    pub fn is_hit(&self, size: u64) -> bool {
        size.abs_diff(self.size) <= self.tolerance
    }
}

/// Per-image state: `Pending → Processing → {Completed, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl CompressionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Error)
                // Rejected by pre-validation without ever starting.
                | (Self::Pending, Self::Error)
                // Cancelled mid-image: back to the queue.
                | (Self::Processing, Self::Pending)
        )
    }
}

/// Structured error category exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    Encode,
    Validation,
    Cancelled,
}

/// Message category for whatever renders results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl ErrorKind {
    pub fn severity(self) -> Severity {
        match self {
            Self::Decode | Self::Encode | Self::Validation => Severity::Error,
            Self::Cancelled => Severity::Info,
        }
    }
}

/// Why an image did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Which path produced the final bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Target within the passthrough band: one light encode, or the original bytes.
    Passthrough,
    /// Quality search at native resolution.
    Quality,
    /// Quality sweep at a reduced resolution.
    Resize,
    /// Fixed degraded-quality encode at native resolution.
    Fallback,
    /// Fixed-quality format conversion, no target.
    Convert,
}

/// Final outcome for one image, owned by the caller afterwards.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub name: String,
    pub original_size: u64,
    pub status: CompressionStatus,
    pub output: Option<Blob>,
    pub format: Option<OutputFormat>,
    /// Decoded source dimensions.
    pub source_dimensions: Option<Dimensions>,
    /// Dimensions of the encoded output.
    pub dimensions: Option<Dimensions>,
    /// Encoder quality of the chosen attempt, if one was encoded.
    pub quality: Option<f32>,
    pub strategy: Option<Strategy>,
    pub target: Option<u64>,
    pub within_tolerance: bool,
    pub failure: Option<ImageFailure>,
}

impl CompressionResult {
    pub fn pending(source: &SourceImage) -> Self {
        Self {
            name: source.name.clone(),
            original_size: source.byte_len(),
            status: CompressionStatus::Pending,
            output: None,
            format: None,
            source_dimensions: None,
            dimensions: None,
            quality: None,
            strategy: None,
            target: None,
            within_tolerance: false,
            failure: None,
        }
    }

    /// Move to `next`, refusing transitions the state machine does not allow.
    pub fn transition(&mut self, next: CompressionStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Achieved byte size; zero until an output exists.
    pub fn size(&self) -> u64 {
        self.output.as_ref().map_or(0, Blob::size)
    }

    /// `(original - compressed) / original`. Negative when the output grew.
    pub fn reduction_ratio(&self) -> f64 {
        if self.original_size == 0 || self.output.is_none() {
            return 0.0;
        }
        (self.original_size as f64 - self.size() as f64) / self.original_size as f64
    }

    /// Completed, but the best effort missed the tolerance band.
    pub fn tolerance_miss(&self) -> bool {
        self.status == CompressionStatus::Completed && self.target.is_some() && !self.within_tolerance
    }

    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.transition(CompressionStatus::Error);
        self.output = None;
        self.failure = Some(ImageFailure {
            kind,
            message: message.into(),
        });
    }

    /// Serializable view without the encoded bytes.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            name: self.name.clone(),
            status: self.status,
            original_size: self.original_size,
            size: self.size(),
            target: self.target,
            reduction_ratio: self.reduction_ratio(),
            format: self.format.map(OutputFormat::mime),
            dimensions: self.dimensions,
            quality: self.quality,
            strategy: self.strategy,
            within_tolerance: self.within_tolerance,
            failure: self.failure.clone(),
        }
    }
}

/// Byte-free snapshot of a [`CompressionResult`], used for progress events
/// and the JSON report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub name: String,
    pub status: CompressionStatus,
    pub original_size: u64,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u64>,
    pub reduction_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub within_tolerance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ImageFailure>,
}

/// Cooperative cancellation flag, checked between images and between
/// search iterations. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(len: usize) -> SourceImage {
        SourceImage::new("photo.jpg", "image/jpeg", vec![0u8; len])
    }

    #[test]
    fn target_rejects_zero_size() {
        assert_eq!(
            CompressionTarget::new(0, 0.05, FormatHint::Keep),
            Err(ValidationError::NonPositiveTarget)
        );
    }

    #[test]
    fn target_tolerance_is_fraction_of_size() {
        let target = CompressionTarget::new(200 * 1024, 0.05, FormatHint::Keep).unwrap();
        assert_eq!(target.tolerance, 10240);
        assert!(target.is_hit(200 * 1024 + 10240));
        assert!(target.is_hit(200 * 1024 - 10240));
        assert!(!target.is_hit(200 * 1024 + 10241));
    }

    #[test]
    fn target_ratio_of_original() {
        let target = CompressionTarget::new(250, 0.05, FormatHint::Keep).unwrap();
        assert_eq!(target.ratio_of(1000), 0.25);
        assert!(target.ratio_of(0).is_infinite());
    }

    #[test]
    fn status_allows_only_forward_transitions() {
        use CompressionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Error));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Error.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Completed.is_terminal());
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn result_transition_refuses_illegal_moves() {
        let mut result = CompressionResult::pending(&source(10));
        assert!(!result.transition(CompressionStatus::Completed));
        assert_eq!(result.status, CompressionStatus::Pending);
        assert!(result.transition(CompressionStatus::Processing));
        assert!(result.transition(CompressionStatus::Completed));
        assert!(!result.transition(CompressionStatus::Processing));
    }

    #[test]
    fn reduction_ratio_from_sizes() {
        let mut result = CompressionResult::pending(&source(1000));
        assert_eq!(result.reduction_ratio(), 0.0);
        result.output = Some(Blob::new(vec![0u8; 250], OutputFormat::Jpeg));
        assert_eq!(result.size(), 250);
        assert_eq!(result.reduction_ratio(), 0.75);
    }

    #[test]
    fn fail_records_kind_and_drops_output() {
        let mut result = CompressionResult::pending(&source(100));
        result.transition(CompressionStatus::Processing);
        result.output = Some(Blob::new(vec![1, 2, 3], OutputFormat::Png));
        result.fail(ErrorKind::Decode, "corrupt");
        assert_eq!(result.status, CompressionStatus::Error);
        assert_eq!(result.size(), 0);
        assert_eq!(result.failure.as_ref().unwrap().kind, ErrorKind::Decode);
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(ErrorKind::Decode.severity(), Severity::Error);
        assert_eq!(ErrorKind::Validation.severity(), Severity::Error);
        assert_eq!(ErrorKind::Cancelled.severity(), Severity::Info);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn summary_serializes_without_bytes() {
        let mut result = CompressionResult::pending(&source(1000));
        result.transition(CompressionStatus::Processing);
        result.output = Some(Blob::new(vec![0u8; 400], OutputFormat::WebP));
        result.format = Some(OutputFormat::WebP);
        result.transition(CompressionStatus::Completed);

        let json = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["size"], 400);
        assert_eq!(json["format"], "image/webp");
        assert!(json.get("failure").is_none());
    }
}
