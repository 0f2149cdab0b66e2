//! Parameter types for encode operations.
//!
//! These describe *what* to encode, not *how*. The search code builds them and
//! the [`backend`](super::backend) turns them into bytes, which is what lets
//! the tests swap in a mock encoder with a predictable size curve.
//!
//! - [`Quality`]: lossy encoder quality on the 0–1 scale, kept strictly
//!   inside `(0, 1)` so no attempt ever asks for a degenerate encode.
//! - [`EncodeParams`]: output format plus quality for one trial encode.

use crate::format::OutputFormat;

/// Encoder quality, clamped to `[Quality::MIN, Quality::MAX]` on construction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quality(f32);

impl Quality {
    pub const MIN: f32 = 0.01;
    pub const MAX: f32 = 0.99;

    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(Self::MIN);
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Quality on the 1–99 integer scale used by JPEG and AVIF encoders.
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 99.0) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(0.8)
    }
}

/// One trial encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
}

impl EncodeParams {
    pub fn new(format: OutputFormat, quality: f32) -> Self {
        Self {
            format,
            quality: Quality::new(quality),
        }
    }
}
