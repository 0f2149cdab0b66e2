//! # imgfit
//!
//! Re-encode images so their byte size lands as close as possible to a target.
//! Quality is searched first; resolution is only traded away when quality alone
//! cannot reach the target.
//!
//! # Architecture: Per-Image Pipeline
//!
//! Every image goes through the same steps, independently of every other image
//! in the batch:
//!
//! ```text
//! 1. Intake     files    →  SourceImage       (allow-list per tool, MIME sniffing)
//! 2. Plan       images   →  BatchPlan         (one target per image + advisories)
//! 3. Compress   image    →  CompressionResult (format, quality search, resize search)
//! ```
//!
//! The batch runner drives step 3 sequentially, in submission order, and
//! streams progress events to whoever is listening.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`intake`] | Reads files and directories, filters them against each tool's accepted formats |
//! | [`batch`] | Uniform / proportional / adaptive targets, advisories, the sequential batch runner |
//! | [`compress`] | Per-image orchestrator: passthrough, quality search, resize search, fallback |
//! | [`search`] | Quality binary search and resize sweep over a decoded pixel buffer |
//! | [`format`] | Output format selection from source type, target ratio, and override |
//! | [`imaging`] | `ImageBackend` trait, the pure-Rust backend, dimension math, AVIF decoding |
//! | [`codec`] | Encoded blobs: data URLs and file output |
//! | [`config`] | `config.toml` loading, validation, and merging over stock defaults |
//! | [`types`] | Shared types: source images, targets, statuses, results, cancellation |
//! | [`naming`] | Output filename derivation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Quality Before Resolution
//!
//! Dropping encoder quality is far less visible than dropping pixels, so the
//! resize search only runs when the quality search misses by more than
//! `search.retry_threshold`. Whichever of the two lands closer to the target
//! wins.
//!
//! ## Decode Once
//!
//! Each source is decoded exactly once. Every trial encode, and every resized
//! copy, is derived from that one buffer, so repeated attempts never compound
//! resampling or compression artifacts.
//!
//! ## Backend Trait
//!
//! All pixel work goes through [`imaging::ImageBackend`]. The production
//! backend is pure Rust (`image`, `webp`, `rav1d`). Tests use a mock backend
//! with a deterministic size model, so the search logic is verified without
//! real encoders.
//!
//! ## Never Worse Than the Input
//!
//! When the target is below the original, the result is never larger than the
//! original: an oversized encode is replaced by a degraded fallback or by the
//! original bytes.

pub mod batch;
pub mod codec;
pub mod compress;
pub mod config;
pub mod format;
pub mod imaging;
pub mod intake;
pub mod naming;
pub mod output;
pub mod search;
pub mod types;
