//! Output format selection.
//!
//! [`select_format`] never fails: an explicit override wins, otherwise the
//! source format and the requested size ratio decide, with JPEG as the
//! universal fallback.
//!
//! | Source | Ratio | Output |
//! |---|---|---|
//! | any | any, with override | override |
//! | PNG / BMP / GIF | < `lossy_threshold` | JPEG |
//! | JPEG | any | JPEG |
//! | WebP | any | WebP |
//! | AVIF | any | AVIF |
//! | anything else | any | JPEG |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An encoder this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Avif,
}

impl OutputFormat {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// File extension used for downloads.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
        }
    }

    /// Whether the quality parameter changes the encoded size.
    pub fn is_lossy(self) -> bool {
        !matches!(self, Self::Png)
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            "image/avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Map a symbolic name (`jpeg`, `jpg`, `png`, `webp`, `avif`) to a format.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::WebP => "WebP",
            Self::Avif => "AVIF",
        })
    }
}

/// Caller preference for the output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatHint {
    /// Let [`select_format`] decide from the source format.
    #[default]
    Keep,
    Explicit(OutputFormat),
}

impl FromStr for FormatHint {
    type Err = String;

    /// Accepts `same` or any name understood by [`OutputFormat::from_name`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("same") {
            return Ok(Self::Keep);
        }
        OutputFormat::from_name(s)
            .map(Self::Explicit)
            .ok_or_else(|| format!("unknown format '{s}' (expected same, jpeg, png, webp, or avif)"))
    }
}

fn is_lossless_raster(mime: &str) -> bool {
    matches!(
        mime.trim().to_ascii_lowercase().as_str(),
        "image/png" | "image/bmp" | "image/gif"
    )
}

/// Choose the output encoding for one image.
///
/// `lossy_threshold` is the target/source ratio below which a lossless source
/// is moved to a lossy encoder.
pub fn select_format(
    source_mime: &str,
    target_size: u64,
    source_size: u64,
    hint: FormatHint,
    lossy_threshold: f64,
) -> OutputFormat {
    if let FormatHint::Explicit(format) = hint {
        return format;
    }

    let ratio = if source_size == 0 {
        1.0
    } else {
        target_size as f64 / source_size as f64
    };

    if is_lossless_raster(source_mime) && ratio < lossy_threshold {
        return OutputFormat::Jpeg;
    }

    match OutputFormat::from_mime(source_mime) {
        Some(OutputFormat::Jpeg) => OutputFormat::Jpeg,
        Some(OutputFormat::WebP) => OutputFormat::WebP,
        Some(OutputFormat::Avif) => OutputFormat::Avif,
        _ => OutputFormat::Jpeg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 0.8;

    #[test]
    fn override_is_honored_verbatim() {
        let hint = FormatHint::Explicit(OutputFormat::Png);
        assert_eq!(
            select_format("image/jpeg", 100, 1000, hint, THRESHOLD),
            OutputFormat::Png
        );
    }

    #[test]
    fn png_with_strong_reduction_goes_lossy() {
        assert_eq!(
            select_format("image/png", 100, 1000, FormatHint::Keep, THRESHOLD),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn png_with_mild_reduction_falls_back_to_jpeg() {
        assert_eq!(
            select_format("image/png", 900, 1000, FormatHint::Keep, THRESHOLD),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn lossy_sources_keep_their_format() {
        for (mime, expected) in [
            ("image/jpeg", OutputFormat::Jpeg),
            ("image/jpg", OutputFormat::Jpeg),
            ("image/webp", OutputFormat::WebP),
            ("image/avif", OutputFormat::Avif),
        ] {
            assert_eq!(
                select_format(mime, 100, 1000, FormatHint::Keep, THRESHOLD),
                expected,
                "{mime}"
            );
        }
    }

    #[test]
    fn unknown_source_defaults_to_jpeg() {
        assert_eq!(
            select_format("image/x-icon", 100, 1000, FormatHint::Keep, THRESHOLD),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn zero_source_size_does_not_panic() {
        assert_eq!(
            select_format("image/png", 100, 0, FormatHint::Keep, THRESHOLD),
            OutputFormat::Jpeg
        );
    }

    #[test]
    fn hint_parses_from_names() {
        assert_eq!("same".parse::<FormatHint>(), Ok(FormatHint::Keep));
        assert_eq!(
            "JPG".parse::<FormatHint>(),
            Ok(FormatHint::Explicit(OutputFormat::Jpeg))
        );
        assert_eq!(
            "webp".parse::<FormatHint>(),
            Ok(FormatHint::Explicit(OutputFormat::WebP))
        );
        assert!("tiff".parse::<FormatHint>().is_err());
    }

    #[test]
    fn mime_and_extension_mapping() {
        assert_eq!(OutputFormat::Jpeg.mime(), "image/jpeg");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::from_mime("IMAGE/PNG"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_mime("image/gif"), None);
        assert!(!OutputFormat::Png.is_lossy());
        assert!(OutputFormat::Avif.is_lossy());
    }
}
