//! End-to-end runs against the pure-Rust backend.
//!
//! Inputs are synthetic images built in memory, so exact byte sizes depend on
//! encoder versions. Assertions stick to what must hold for any encoder:
//! statuses, formats, decodability, and never growing past the original.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imgfit::batch::{self, BatchEvent, BatchMode};
use imgfit::codec::Blob;
use imgfit::compress::Compressor;
use imgfit::config::CompressorConfig;
use imgfit::format::{FormatHint, OutputFormat};
use imgfit::intake::{self, Tool};
use imgfit::naming;
use imgfit::types::{
    CancelToken, CompressionStatus, CompressionTarget, ErrorKind, SourceImage, Strategy,
};
use std::io::Cursor;
use std::sync::mpsc;
use tempfile::TempDir;

/// Gradient with noise: compresses like a photo, not like a flat fill.
fn photo(width: u32, height: u32) -> DynamicImage {
    let mut seed = 0x2545_f491u32;
    let img = RgbImage::from_fn(width, height, |x, y| {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let noise = (seed >> 26) as u8;
        Rgb([
            ((x * 255 / width) as u8).wrapping_add(noise),
            ((y * 255 / height) as u8).wrapping_add(noise / 2),
            (((x + y) * 255 / (width + height)) as u8).saturating_sub(noise),
        ])
    });
    DynamicImage::ImageRgb8(img)
}

fn jpeg_source(name: &str, width: u32, height: u32) -> SourceImage {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 95)
        .encode_image(&photo(width, height))
        .unwrap();
    SourceImage::new(name, "image/jpeg", bytes)
}

fn png_source(name: &str, width: u32, height: u32) -> SourceImage {
    let mut bytes = Vec::new();
    photo(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    SourceImage::new(name, "image/png", bytes)
}

fn target(size: u64, format: FormatHint) -> CompressionTarget {
    CompressionTarget::new(size, 0.05, format).unwrap()
}

#[test]
fn jpeg_halved_stays_jpeg_and_shrinks() {
    let source = jpeg_source("photo.jpg", 320, 240);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.compress(
        &source,
        &target(source.byte_len() / 2, FormatHint::Keep),
        &CancelToken::new(),
    );

    assert_eq!(result.status, CompressionStatus::Completed);
    assert_eq!(result.format, Some(OutputFormat::Jpeg));
    assert!(result.size() > 0);
    assert!(result.size() <= source.byte_len());

    let blob = result.output.as_ref().unwrap();
    let decoded = image::load_from_memory_with_format(blob.as_bytes(), ImageFormat::Jpeg).unwrap();
    let dims = result.dimensions.unwrap();
    assert_eq!((decoded.width(), decoded.height()), (dims.width, dims.height));
}

#[test]
fn png_with_small_target_becomes_jpeg() {
    let source = png_source("chart.png", 256, 256);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.compress(
        &source,
        &target(source.byte_len() / 5, FormatHint::Keep),
        &CancelToken::new(),
    );

    assert_eq!(result.status, CompressionStatus::Completed);
    assert_eq!(result.format, Some(OutputFormat::Jpeg));
    assert!(result.size() < source.byte_len());
}

#[test]
fn explicit_webp_override() {
    let source = jpeg_source("photo.jpg", 200, 150);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.compress(
        &source,
        &target(source.byte_len() / 3, FormatHint::Explicit(OutputFormat::WebP)),
        &CancelToken::new(),
    );

    assert_eq!(result.status, CompressionStatus::Completed);
    assert_eq!(result.format, Some(OutputFormat::WebP));
    let blob = result.output.as_ref().unwrap();
    assert_eq!(
        image::guess_format(blob.as_bytes()).unwrap(),
        ImageFormat::WebP
    );
}

#[test]
fn unreachable_target_resizes_or_falls_back() {
    // Far below what quality alone can reach at this resolution
    let source = jpeg_source("big.jpg", 640, 480);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.compress(
        &source,
        &target(2_000, FormatHint::Keep),
        &CancelToken::new(),
    );

    assert_eq!(result.status, CompressionStatus::Completed);
    assert!(result.size() < source.byte_len());
    assert!(matches!(
        result.strategy,
        Some(Strategy::Resize | Strategy::Quality | Strategy::Fallback)
    ));
    let dims = result.dimensions.unwrap();
    assert!(dims.width <= 640 && dims.height <= 480);
}

#[test]
fn target_near_original_passes_through() {
    let source = jpeg_source("photo.jpg", 160, 120);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.compress(
        &source,
        &target(source.byte_len(), FormatHint::Keep),
        &CancelToken::new(),
    );

    assert_eq!(result.status, CompressionStatus::Completed);
    assert_eq!(result.strategy, Some(Strategy::Passthrough));
    assert!(result.size() <= source.byte_len());
}

#[test]
fn corrupt_input_is_a_decode_error() {
    let source = SourceImage::new("broken.jpg", "image/jpeg", vec![0xFF, 0xD8, 0x00, 0x01, 0x02]);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.compress(
        &source,
        &target(1_000, FormatHint::Keep),
        &CancelToken::new(),
    );

    assert_eq!(result.status, CompressionStatus::Error);
    assert_eq!(result.failure.unwrap().kind, ErrorKind::Decode);
    assert!(result.output.is_none());
}

#[test]
fn convert_png_to_webp() {
    let source = png_source("logo.png", 128, 128);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.convert(&source, 0.8, &CancelToken::new());

    assert_eq!(result.status, CompressionStatus::Completed);
    assert_eq!(result.format, Some(OutputFormat::WebP));
    assert_eq!(result.strategy, Some(Strategy::Convert));
    let decoded = image::load_from_memory(result.output.unwrap().as_bytes()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (128, 128));
}

#[test]
fn svg_conversion_fails_per_image() {
    let svg = SourceImage::new(
        "icon.svg",
        "image/svg+xml",
        b"<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"4\" height=\"4\"/>".to_vec(),
    );
    let png = png_source("ok.png", 32, 32);
    let compressor = Compressor::new(CompressorConfig::default());
    let report = batch::run_conversion(&compressor, &[svg, png], 0.8, &CancelToken::new(), None);

    assert_eq!(report.results[0].status, CompressionStatus::Error);
    assert_eq!(
        report.results[0].failure.as_ref().unwrap().kind,
        ErrorKind::Decode
    );
    assert_eq!(report.results[1].status, CompressionStatus::Completed);
}

#[test]
fn webp_encoder_limit_fails_the_image_not_the_batch() {
    // libwebp refuses sides above 16383 px
    let panorama = jpeg_source("panorama.jpg", 17_000, 16);
    let small = png_source("ok.png", 32, 32);
    let compressor = Compressor::new(CompressorConfig::default());

    let report = batch::run_conversion(
        &compressor,
        &[panorama.clone(), small],
        0.8,
        &CancelToken::new(),
        None,
    );
    assert_eq!(report.results[0].status, CompressionStatus::Error);
    assert_eq!(
        report.results[0].failure.as_ref().unwrap().kind,
        ErrorKind::Encode
    );
    assert_eq!(report.results[1].status, CompressionStatus::Completed);

    // The fallback encode is WebP too, so it fails the same way
    let result = compressor.compress(
        &panorama,
        &target(panorama.byte_len() / 3, FormatHint::Explicit(OutputFormat::WebP)),
        &CancelToken::new(),
    );
    assert_eq!(result.status, CompressionStatus::Error);
    assert_eq!(result.failure.unwrap().kind, ErrorKind::Encode);
    assert!(result.output.is_none());
}

#[test]
fn batch_writes_named_outputs_and_report() {
    let images = vec![
        jpeg_source("one.jpg", 240, 180),
        png_source("two.png", 200, 200),
    ];
    let config = CompressorConfig::default();
    let plan = batch::plan_batch(
        &images,
        BatchMode::Proportional {
            reduction_percent: 50.0,
        },
        FormatHint::Keep,
        &config,
    )
    .unwrap();
    let compressor = Compressor::new(config);
    let (tx, rx) = mpsc::channel();
    let report = batch::run_batch(&compressor, &images, &plan, &CancelToken::new(), Some(&tx));
    drop(tx);

    let events: Vec<BatchEvent> = rx.iter().collect();
    assert_eq!(events.len(), 4);
    assert!(!report.cancelled);

    let out = TempDir::new().unwrap();
    for result in &report.results {
        assert_eq!(result.status, CompressionStatus::Completed);
        let blob = result.output.as_ref().unwrap();
        let path = out
            .path()
            .join(naming::compressed_file_name(&result.name, blob.format()));
        blob.write_to(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), blob.size());
    }
    assert!(out.path().join("one_compressed.jpg").exists());

    let json = serde_json::to_value(report.summaries()).unwrap();
    assert_eq!(json[0]["name"], "one.jpg");
    assert_eq!(json[0]["status"], "completed");
    assert!(json[1]["size"].as_u64().unwrap() > 0);
}

#[test]
fn data_url_carries_the_encoded_bytes() {
    let source = jpeg_source("photo.jpg", 64, 64);
    let compressor = Compressor::new(CompressorConfig::default());
    let result = compressor.convert(&source, 0.5, &CancelToken::new());
    let blob = result.output.unwrap();

    let url = blob.to_data_url();
    assert!(url.starts_with("data:image/webp;base64,"));
    let back = Blob::from_data_url(&url).unwrap();
    assert_eq!(back.as_bytes(), blob.as_bytes());
    assert_eq!(back.format(), OutputFormat::WebP);
}

#[test]
fn intake_skips_tiff_from_a_directory() {
    let dir = TempDir::new().unwrap();
    let jpeg = jpeg_source("a.jpg", 32, 32);
    std::fs::write(dir.path().join("a.jpg"), &*jpeg.bytes).unwrap();
    std::fs::write(dir.path().join("scan.tiff"), b"II*\0").unwrap();

    let intake = intake::load(Tool::Compress, &[dir.path().to_path_buf()]).unwrap();
    assert_eq!(intake.accepted.len(), 1);
    assert_eq!(intake.accepted[0].mime, "image/jpeg");
    assert_eq!(intake.skipped, ["scan.tiff"]);
    assert!(intake.warning(Tool::Compress).unwrap().contains("scan.tiff"));
}

#[test]
fn same_named_inputs_get_distinct_outputs() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    let jpeg = jpeg_source("a.jpg", 48, 48);
    std::fs::write(dir.path().join("a.jpg"), &*jpeg.bytes).unwrap();
    std::fs::write(dir.path().join("nested").join("a.jpg"), &*jpeg.bytes).unwrap();

    let images = intake::load(Tool::Convert, &[dir.path().to_path_buf()])
        .unwrap()
        .accepted;
    assert_eq!(images.len(), 2);
    let compressor = Compressor::new(CompressorConfig::default());
    let report = batch::run_conversion(&compressor, &images, 0.8, &CancelToken::new(), None);

    let out = TempDir::new().unwrap();
    let mut names = naming::OutputNames::new();
    for result in &report.results {
        let name = names.claim(&naming::converted_file_name(&result.name));
        result.output.as_ref().unwrap().write_to(&out.path().join(name)).unwrap();
    }
    assert!(out.path().join("a.webp").exists());
    assert!(out.path().join("a_2.webp").exists());
}

#[test]
fn plan_reads_header_dimensions() {
    let images = vec![
        jpeg_source("wide.jpg", 300, 100),
        SourceImage::new("broken.png", "image/png", b"not a png".to_vec()),
    ];
    let config = CompressorConfig::default();
    let mut plan = batch::plan_batch(&images, BatchMode::Adaptive, FormatHint::Keep, &config).unwrap();
    plan.identify(&Compressor::new(config), &images);

    let dims = plan.targets[0].dimensions.unwrap();
    assert_eq!((dims.width, dims.height), (300, 100));
    assert!(plan.targets[1].dimensions.is_none());
}
