//! Pure Rust image backend, statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF, BMP) | `image::ImageReader` with format sniffing |
//! | Decode (AVIF) | [`avif`](super::avif): `avif-parse` + `rav1d` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (RGB, alpha flattened) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless, best compression) |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//!
//! Every encode writes into a fresh in-memory buffer; nothing is shared
//! between calls.

use super::avif;
use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{EncodeParams, Quality};
use crate::codec::Blob;
use crate::format::OutputFormat;
use crate::types::SourceImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageReader};
use std::io::Cursor;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn is_avif(source: &SourceImage) -> bool {
    source.mime.eq_ignore_ascii_case("image/avif") || avif::sniff(&source.bytes)
}

fn reader(source: &SourceImage) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    ImageReader::new(Cursor::new(&source.bytes[..]))
        .with_guessed_format()
        .map_err(|e| BackendError::Decode(format!("Failed to read {}: {e}", source.name)))
}

fn encode_jpeg(pixels: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let rgb = pixels.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.percent())
        .write_image(rgb.as_raw(), w, h, image::ExtendedColorType::Rgb8)
        .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(pixels: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilterType::Adaptive);
    let written = if pixels.color().has_alpha() {
        let rgba = pixels.to_rgba8();
        let (w, h) = rgba.dimensions();
        encoder.write_image(rgba.as_raw(), w, h, image::ExtendedColorType::Rgba8)
    } else {
        let rgb = pixels.to_rgb8();
        let (w, h) = rgb.dimensions();
        encoder.write_image(rgb.as_raw(), w, h, image::ExtendedColorType::Rgb8)
    };
    written.map_err(|e| BackendError::Encode(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_webp(pixels: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    // libwebp takes quality on a 0-100 float scale
    let q = quality.value() * 100.0;
    let encoded = if pixels.color().has_alpha() {
        let rgba = pixels.to_rgba8();
        let (w, h) = rgba.dimensions();
        webp::Encoder::from_rgba(&rgba, w, h).encode_simple(false, q)
    } else {
        let rgb = pixels.to_rgb8();
        let (w, h) = rgb.dimensions();
        webp::Encoder::from_rgb(&rgb, w, h).encode_simple(false, q)
    };
    // Oversized sides (above 16383 px) are reported here, not as a panic
    let encoded = encoded.map_err(|e| BackendError::Encode(format!("WebP encode failed: {e:?}")))?;
    Ok(encoded.to_vec())
}

fn encode_avif(pixels: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder =
        image::codecs::avif::AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, quality.percent());
    pixels
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::Encode(format!("AVIF encode failed: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &SourceImage) -> Result<Dimensions, BackendError> {
        if is_avif(source) {
            return avif::identify(&source.bytes);
        }
        let (width, height) = reader(source)?.into_dimensions().map_err(|e| {
            BackendError::Decode(format!("Failed to read dimensions of {}: {e}", source.name))
        })?;
        Ok(Dimensions::new(width, height))
    }

    fn decode(&self, source: &SourceImage) -> Result<DynamicImage, BackendError> {
        if is_avif(source) {
            return avif::decode(&source.bytes);
        }
        reader(source)?
            .decode()
            .map_err(|e| BackendError::Decode(format!("Failed to decode {}: {e}", source.name)))
    }

    fn resize(&self, pixels: &DynamicImage, to: Dimensions) -> DynamicImage {
        pixels.resize_exact(to.width, to.height, FilterType::Lanczos3)
    }

    fn encode(&self, pixels: &DynamicImage, params: &EncodeParams) -> Result<Blob, BackendError> {
        let bytes = match params.format {
            OutputFormat::Jpeg => encode_jpeg(pixels, params.quality)?,
            OutputFormat::Png => encode_png(pixels)?,
            OutputFormat::WebP => encode_webp(pixels, params.quality)?,
            OutputFormat::Avif => encode_avif(pixels, params.quality)?,
        };
        Ok(Blob::new(bytes, params.format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{RgbImage, RgbaImage};

    /// Noisy gradient so quality has a visible effect on size.
    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x * 7 + y * 13) % 256) as u8])
        }))
    }

    fn jpeg_source(width: u32, height: u32) -> SourceImage {
        let bytes = encode_jpeg(&gradient(width, height), Quality::new(0.9)).unwrap();
        SourceImage::new("test.jpg", "image/jpeg", bytes)
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let backend = RustBackend::new();
        let dims = backend.identify(&jpeg_source(200, 150)).unwrap();
        assert_eq!(dims, Dimensions::new(200, 150));
    }

    #[test]
    fn decode_garbage_errors() {
        let backend = RustBackend::new();
        let source = SourceImage::new("broken.jpg", "image/jpeg", b"not an image".to_vec());
        assert!(matches!(backend.decode(&source), Err(BackendError::Decode(_))));
    }

    #[test]
    fn decode_ignores_wrong_declared_mime() {
        let backend = RustBackend::new();
        let mut source = jpeg_source(40, 30);
        source.mime = "image/png".into();
        let pixels = backend.decode(&source).unwrap();
        assert_eq!(Dimensions::of(&pixels), Dimensions::new(40, 30));
    }

    #[test]
    fn resize_is_exact() {
        let backend = RustBackend::new();
        let resized = backend.resize(&gradient(400, 300), Dimensions::new(123, 77));
        assert_eq!(Dimensions::of(&resized), Dimensions::new(123, 77));
    }

    #[test]
    fn jpeg_size_grows_with_quality() {
        let backend = RustBackend::new();
        let pixels = gradient(256, 256);
        let low = backend
            .encode(&pixels, &EncodeParams::new(OutputFormat::Jpeg, 0.2))
            .unwrap();
        let high = backend
            .encode(&pixels, &EncodeParams::new(OutputFormat::Jpeg, 0.9))
            .unwrap();
        assert!(low.size() < high.size());
        assert_eq!(&low.as_bytes()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn jpeg_flattens_alpha() {
        let backend = RustBackend::new();
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, image::Rgba([10, 20, 30, 128])));
        let blob = backend
            .encode(&rgba, &EncodeParams::new(OutputFormat::Jpeg, 0.8))
            .unwrap();
        assert_eq!(blob.format(), OutputFormat::Jpeg);
        assert!(blob.size() > 0);
    }

    #[test]
    fn webp_size_grows_with_quality() {
        let backend = RustBackend::new();
        let pixels = gradient(256, 256);
        let low = backend
            .encode(&pixels, &EncodeParams::new(OutputFormat::WebP, 0.1))
            .unwrap();
        let high = backend
            .encode(&pixels, &EncodeParams::new(OutputFormat::WebP, 0.9))
            .unwrap();
        assert!(low.size() < high.size());
        assert_eq!(&low.as_bytes()[..4], b"RIFF");
    }

    #[test]
    fn webp_rejects_sides_beyond_its_limit() {
        let backend = RustBackend::new();
        let wide = DynamicImage::new_rgb8(17_000, 16);
        assert!(matches!(
            backend.encode(&wide, &EncodeParams::new(OutputFormat::WebP, 0.8)),
            Err(BackendError::Encode(_))
        ));
    }

    #[test]
    fn png_output_decodes_back() {
        let backend = RustBackend::new();
        let blob = backend
            .encode(&gradient(50, 40), &EncodeParams::new(OutputFormat::Png, 0.5))
            .unwrap();
        let source = SourceImage::new("out.png", blob.mime(), blob.into_bytes());
        let pixels = backend.decode(&source).unwrap();
        assert_eq!(Dimensions::of(&pixels), Dimensions::new(50, 40));
    }

    #[test]
    fn avif_encode_then_decode() {
        let backend = RustBackend::new();
        let blob = backend
            .encode(&gradient(48, 32), &EncodeParams::new(OutputFormat::Avif, 0.6))
            .unwrap();
        let source = SourceImage::new("out.avif", blob.mime(), blob.into_bytes());
        assert_eq!(backend.identify(&source).unwrap(), Dimensions::new(48, 32));
        let pixels = backend.decode(&source).unwrap();
        assert_eq!(Dimensions::of(&pixels), Dimensions::new(48, 32));
    }
}
