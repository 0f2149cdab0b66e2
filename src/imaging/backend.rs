//! Image backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four primitives the search code
//! needs: identify, decode, resize, and encode. Everything above this seam is
//! pure search logic over an immutable pixel buffer.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use
//! [`tests::MockBackend`], whose encoded size is a deterministic function of
//! dimensions and quality.

use super::params::EncodeParams;
use crate::codec::Blob;
use crate::types::SourceImage;
use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(pixels: &DynamicImage) -> Self {
        Self::new(pixels.width(), pixels.height())
    }

    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Trait for image backends.
///
/// Implementations must not keep state between calls: every resize returns a
/// fresh buffer and every encode reads only its arguments.
pub trait ImageBackend: Sync {
    /// Read dimensions from the header, without a full decode where possible.
    fn identify(&self, source: &SourceImage) -> Result<Dimensions, BackendError>;

    /// Decode the source bytes into a pixel buffer.
    fn decode(&self, source: &SourceImage) -> Result<DynamicImage, BackendError>;

    /// Resample to exactly `to`.
    fn resize(&self, pixels: &DynamicImage, to: Dimensions) -> DynamicImage;

    /// Encode the pixel buffer with the given format and quality.
    fn encode(&self, pixels: &DynamicImage, params: &EncodeParams) -> Result<Blob, BackendError>;
}
