//! Compression orchestrator: one image in, one [`CompressionResult`] out.
//!
//! ## Strategy
//!
//! 1. Pick the output format ([`select_format`]).
//! 2. Decode once. The decoded buffer is shared read-only by every attempt.
//! 3. Target at or above `batch.passthrough_ratio` of the original: a single
//!    encode at `fallback.minimal_quality`, or the original bytes if that
//!    encode would grow the file.
//! 4. Otherwise [`search_quality`] at native resolution. If it misses by more
//!    than `search.retry_threshold` and was not saturated, [`search_resize`]
//!    runs and the closer of the two results wins.
//! 5. If the searches produce no encode, one `fallback.quality` encode at
//!    native resolution.
//! 6. A result larger than the original is replaced by the fallback encode or
//!    the original bytes, whichever is smaller and allowed.
//!
//! Every failure is contained to the image: [`Compressor::compress`] never
//! panics and never returns an error, it records one on the result instead.

use crate::codec::Blob;
use crate::config::CompressorConfig;
use crate::format::{FormatHint, OutputFormat, select_format};
use crate::imaging::{BackendError, Dimensions, EncodeParams, ImageBackend, RustBackend};
use crate::search::{EncodeAttempt, SearchError, search_quality, search_resize};
use crate::types::{
    CancelToken, CompressionResult, CompressionStatus, CompressionTarget, ErrorKind, SourceImage,
    Strategy,
};
use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Encode(String),
    #[error("Cancelled")]
    Cancelled,
}

impl CompressError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::Encode(_) => ErrorKind::Encode,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<BackendError> for CompressError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Decode(_) => Self::Decode(e.to_string()),
            BackendError::Encode(_) => Self::Encode(e.to_string()),
        }
    }
}

/// The encode chosen for one image.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub blob: Blob,
    pub source_dimensions: Dimensions,
    pub dimensions: Dimensions,
    /// `None` when the original bytes were kept.
    pub quality: Option<f32>,
    pub strategy: Strategy,
}

impl Compressed {
    fn from_attempt(attempt: EncodeAttempt, source: Dimensions, strategy: Strategy) -> Self {
        Self {
            source_dimensions: source,
            dimensions: attempt.dimensions,
            quality: Some(attempt.quality),
            blob: attempt.blob,
            strategy,
        }
    }

    fn original(blob: Blob, source: Dimensions) -> Self {
        Self {
            blob,
            source_dimensions: source,
            dimensions: source,
            quality: None,
            strategy: Strategy::Passthrough,
        }
    }

    pub fn size(&self) -> u64 {
        self.blob.size()
    }
}

/// The original bytes as an output, when the request allows returning them.
///
/// The source must be in a format this crate can emit, and an explicit format
/// override must name that same format.
fn reusable_original(source: &SourceImage, hint: FormatHint) -> Option<Blob> {
    let format = OutputFormat::from_mime(&source.mime)?;
    match hint {
        FormatHint::Explicit(wanted) if wanted != format => None,
        _ => Some(Blob::new(source.bytes.to_vec(), format)),
    }
}

/// Per-image compression engine over an [`ImageBackend`].
pub struct Compressor<B: ImageBackend = RustBackend> {
    backend: B,
    config: CompressorConfig,
}

impl Compressor<RustBackend> {
    pub fn new(config: CompressorConfig) -> Self {
        Self::with_backend(RustBackend::new(), config)
    }
}

impl<B: ImageBackend> Compressor<B> {
    pub fn with_backend(backend: B, config: CompressorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Pixel dimensions of `source` from its header.
    pub fn identify(&self, source: &SourceImage) -> Result<Dimensions, CompressError> {
        Ok(self.backend.identify(source)?)
    }

    /// Compress one image toward `target`.
    ///
    /// The result is `Completed` (possibly outside tolerance), `Error` with a
    /// structured failure, or `Pending` if `cancel` fired before it finished.
    pub fn compress(
        &self,
        source: &SourceImage,
        target: &CompressionTarget,
        cancel: &CancelToken,
    ) -> CompressionResult {
        let mut result = CompressionResult::pending(source);
        result.target = Some(target.size);
        result.transition(CompressionStatus::Processing);

        match self.try_compress(source, target, cancel) {
            Ok(compressed) => {
                result.within_tolerance = target.is_hit(compressed.size());
                if !result.within_tolerance {
                    warn!(
                        "{}: best result {} bytes misses target {} bytes by {}",
                        source.name,
                        compressed.size(),
                        target.size,
                        compressed.size().abs_diff(target.size)
                    );
                }
                self.complete(&mut result, compressed);
            }
            Err(CompressError::Cancelled) => {
                info!("{}: cancelled", source.name);
                result.transition(CompressionStatus::Pending);
            }
            Err(e) => {
                warn!("{}: {e}", source.name);
                result.fail(e.kind(), e.to_string());
            }
        }
        result
    }

    /// Convert one image to WebP at a fixed quality, without a size target.
    pub fn convert(&self, source: &SourceImage, quality: f32, cancel: &CancelToken) -> CompressionResult {
        let mut result = CompressionResult::pending(source);
        result.transition(CompressionStatus::Processing);

        match self.try_convert(source, quality, cancel) {
            Ok(compressed) => self.complete(&mut result, compressed),
            Err(CompressError::Cancelled) => {
                result.transition(CompressionStatus::Pending);
            }
            Err(e) => {
                warn!("{}: {e}", source.name);
                result.fail(e.kind(), e.to_string());
            }
        }
        result
    }

    fn complete(&self, result: &mut CompressionResult, compressed: Compressed) {
        info!(
            "{}: {} → {} bytes as {} ({:?}, {}x{})",
            result.name,
            result.original_size,
            compressed.size(),
            compressed.blob.format(),
            compressed.strategy,
            compressed.dimensions.width,
            compressed.dimensions.height
        );
        result.format = Some(compressed.blob.format());
        result.source_dimensions = Some(compressed.source_dimensions);
        result.dimensions = Some(compressed.dimensions);
        result.quality = compressed.quality;
        result.strategy = Some(compressed.strategy);
        result.output = Some(compressed.blob);
        result.transition(CompressionStatus::Completed);
    }

    /// [`compress`](Self::compress) without the result bookkeeping.
    pub fn try_compress(
        &self,
        source: &SourceImage,
        target: &CompressionTarget,
        cancel: &CancelToken,
    ) -> Result<Compressed, CompressError> {
        let original = source.byte_len();
        let format = select_format(
            &source.mime,
            target.size,
            original,
            target.format,
            self.config.format.lossy_threshold,
        );
        if cancel.is_cancelled() {
            return Err(CompressError::Cancelled);
        }

        let pixels = self.backend.decode(source)?;
        let source_dims = Dimensions::of(&pixels);
        debug!(
            "{}: {}x{}, {} bytes → {} bytes as {format}",
            source.name, source_dims.width, source_dims.height, original, target.size
        );

        if target.ratio_of(original) >= self.config.batch.passthrough_ratio {
            return self.passthrough(source, target, &pixels, format);
        }

        let chosen = match self.search(&pixels, original, target, format, cancel) {
            Ok(found) => found,
            Err(SearchError::Cancelled) => return Err(CompressError::Cancelled),
            Err(SearchError::Backend(e)) => {
                warn!("{}: search failed ({e}), using fallback quality", source.name);
                self.fallback(&pixels, format)?
            }
        };

        if chosen.size() > original && target.size < original {
            return Ok(self.never_inflate(source, target, &pixels, format, chosen));
        }
        Ok(chosen)
    }

    fn search(
        &self,
        pixels: &DynamicImage,
        original: u64,
        target: &CompressionTarget,
        format: OutputFormat,
        cancel: &CancelToken,
    ) -> Result<Compressed, SearchError> {
        let source_dims = Dimensions::of(pixels);
        let by_quality = search_quality(
            &self.backend,
            pixels,
            target,
            format,
            &self.config.search,
            cancel,
        )?;
        let retry_limit = (target.size as f64 * self.config.search.retry_threshold) as u64;
        if by_quality.hit || by_quality.saturated || by_quality.best.difference <= retry_limit {
            return Ok(Compressed::from_attempt(
                by_quality.best,
                source_dims,
                Strategy::Quality,
            ));
        }

        debug!(
            "quality search missed by {} bytes, trying smaller sizes",
            by_quality.best.difference
        );
        let by_resize = match search_resize(
            &self.backend,
            pixels,
            original,
            target,
            format,
            &self.config.resize,
            cancel,
        ) {
            Ok(found) => found,
            Err(SearchError::Cancelled) => return Err(SearchError::Cancelled),
            Err(SearchError::Backend(e)) => {
                warn!("resize search failed ({e}), keeping quality result");
                None
            }
        };

        Ok(match by_resize {
            Some(resized) if resized.best.difference < by_quality.best.difference => {
                Compressed::from_attempt(resized.best, source_dims, Strategy::Resize)
            }
            _ => Compressed::from_attempt(by_quality.best, source_dims, Strategy::Quality),
        })
    }

    /// Single degraded-quality encode at native resolution.
    fn fallback(&self, pixels: &DynamicImage, format: OutputFormat) -> Result<Compressed, CompressError> {
        let params = EncodeParams::new(format, self.config.fallback.quality);
        let blob = self.backend.encode(pixels, &params)?;
        let dims = Dimensions::of(pixels);
        Ok(Compressed {
            blob,
            source_dimensions: dims,
            dimensions: dims,
            quality: Some(params.quality.value()),
            strategy: Strategy::Fallback,
        })
    }

    fn passthrough(
        &self,
        source: &SourceImage,
        target: &CompressionTarget,
        pixels: &DynamicImage,
        format: OutputFormat,
    ) -> Result<Compressed, CompressError> {
        let dims = Dimensions::of(pixels);
        let params = EncodeParams::new(format, self.config.fallback.minimal_quality);
        let encoded = self.backend.encode(pixels, &params);

        if let Ok(blob) = &encoded
            && blob.size() <= source.byte_len()
        {
            return Ok(Compressed {
                blob: blob.clone(),
                source_dimensions: dims,
                dimensions: dims,
                quality: Some(params.quality.value()),
                strategy: Strategy::Passthrough,
            });
        }
        if let Some(original) = reusable_original(source, target.format) {
            debug!("{}: light encode does not shrink, keeping original bytes", source.name);
            return Ok(Compressed::original(original, dims));
        }
        let blob = encoded?;
        Ok(Compressed {
            blob,
            source_dimensions: dims,
            dimensions: dims,
            quality: Some(params.quality.value()),
            strategy: Strategy::Passthrough,
        })
    }

    /// Replace a result that grew past the original.
    fn never_inflate(
        &self,
        source: &SourceImage,
        target: &CompressionTarget,
        pixels: &DynamicImage,
        format: OutputFormat,
        chosen: Compressed,
    ) -> Compressed {
        let original = source.byte_len();
        warn!(
            "{}: best result {} bytes is larger than the original {} bytes",
            source.name,
            chosen.size(),
            original
        );
        let mut best = chosen;
        if best.strategy != Strategy::Fallback
            && let Ok(degraded) = self.fallback(pixels, format)
            && degraded.size() < best.size()
        {
            best = degraded;
        }
        if best.size() > original
            && let Some(blob) = reusable_original(source, target.format)
        {
            return Compressed::original(blob, best.source_dimensions);
        }
        best
    }

    fn try_convert(
        &self,
        source: &SourceImage,
        quality: f32,
        cancel: &CancelToken,
    ) -> Result<Compressed, CompressError> {
        if cancel.is_cancelled() {
            return Err(CompressError::Cancelled);
        }
        let pixels = self.backend.decode(source)?;
        let dims = Dimensions::of(&pixels);
        let params = EncodeParams::new(OutputFormat::WebP, quality);
        let blob = self.backend.encode(&pixels, &params)?;
        Ok(Compressed {
            blob,
            source_dimensions: dims,
            dimensions: dims,
            quality: Some(params.quality.value()),
            strategy: Strategy::Convert,
        })
    }
}
