//! Compressor configuration module.
//!
//! Handles loading, validating, and merging `config.toml` files. Every tuned
//! constant of the search lives here, so a deployment can retune against its
//! own encoders without a rebuild. Stock defaults are the base layer; a user
//! file only overrides the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [search]
//! tolerance = 0.05          # Hit band, as a fraction of the target size
//! retry_threshold = 0.15    # Miss beyond which resize search runs
//! min_quality = 0.05        # Binary search lower bound
//! max_quality = 0.95        # Binary search upper bound
//! max_iterations = 15       # Binary search iteration cap
//! min_interval = 0.02       # Stop once the quality interval is this narrow
//! probe_max_quality = true  # Encode at max_quality first
//!
//! [resize]
//! min_scale = 0.2
//! max_scale = 1.0
//! variations = [-0.1, 0.0, 0.05, 0.1, 0.15, 0.2, -0.05, -0.15]
//! min_dimension = 100       # Smallest allowed side, in pixels
//! qualities = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4]
//!
//! [fallback]
//! quality = 0.1             # Last-resort encode quality
//! minimal_quality = 0.85    # Light encode for near-original targets
//!
//! [format]
//! lossy_threshold = 0.8     # PNG/BMP/GIF below this ratio go to JPEG
//!
//! [batch]
//! passthrough_ratio = 0.98  # Targets at or above this ratio skip the search
//! aggressive_ratio = 0.05   # Targets below this ratio need confirmation
//! max_reduction_percent = 90.0
//!
//! [convert]
//! quality = 0.8             # WebP conversion quality
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse: override just the values you want:
//!
//! ```toml
//! [search]
//! tolerance = 0.03
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up when no explicit config path is given.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Compressor configuration loaded from `config.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressorConfig {
    /// Quality binary search at native resolution.
    pub search: SearchConfig,
    /// Resolution fallback when quality alone misses.
    pub resize: ResizeConfig,
    /// Last-resort and near-original encodes.
    pub fallback: FallbackConfig,
    /// Output format selection.
    pub format: FormatConfig,
    /// Batch target planning and advisories.
    pub batch: BatchConfig,
    /// Fixed-quality WebP conversion.
    pub convert: ConvertConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub tolerance: f64,
    pub retry_threshold: f64,
    pub min_quality: f32,
    pub max_quality: f32,
    pub max_iterations: u32,
    pub min_interval: f32,
    pub probe_max_quality: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            retry_threshold: 0.15,
            min_quality: 0.05,
            max_quality: 0.95,
            max_iterations: 15,
            min_interval: 0.02,
            probe_max_quality: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Offsets added to the seed scale, tried in order.
    pub variations: Vec<f64>,
    pub min_dimension: u32,
    /// Descending quality sweep run at each candidate size.
    pub qualities: Vec<f32>,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.2,
            max_scale: 1.0,
            variations: vec![-0.1, 0.0, 0.05, 0.1, 0.15, 0.2, -0.05, -0.15],
            min_dimension: 100,
            qualities: vec![0.9, 0.8, 0.7, 0.6, 0.5, 0.4],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    pub quality: f32,
    pub minimal_quality: f32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            quality: 0.1,
            minimal_quality: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatConfig {
    pub lossy_threshold: f64,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            lossy_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub passthrough_ratio: f64,
    pub aggressive_ratio: f64,
    pub max_reduction_percent: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            passthrough_ratio: 0.98,
            aggressive_ratio: 0.05,
            max_reduction_percent: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    pub quality: f32,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self { quality: 0.8 }
    }
}

fn check(ok: bool, message: &str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.into()))
    }
}

fn is_unit_open(value: f32) -> bool {
    value > 0.0 && value < 1.0
}

impl CompressorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.search;
        check(
            s.tolerance > 0.0 && s.tolerance < 1.0,
            "search.tolerance must be within (0, 1)",
        )?;
        check(
            s.retry_threshold >= s.tolerance,
            "search.retry_threshold must be at least search.tolerance",
        )?;
        check(
            is_unit_open(s.min_quality) && is_unit_open(s.max_quality),
            "search.min_quality and search.max_quality must be within (0, 1)",
        )?;
        check(
            s.min_quality < s.max_quality,
            "search.min_quality must be below search.max_quality",
        )?;
        check(s.max_iterations > 0, "search.max_iterations must be non-zero")?;
        check(s.min_interval > 0.0, "search.min_interval must be positive")?;

        let r = &self.resize;
        check(
            r.min_scale > 0.0 && r.min_scale <= r.max_scale && r.max_scale <= 1.0,
            "resize scales must satisfy 0 < min_scale <= max_scale <= 1",
        )?;
        check(!r.variations.is_empty(), "resize.variations must not be empty")?;
        check(!r.qualities.is_empty(), "resize.qualities must not be empty")?;
        check(
            r.qualities.iter().all(|&q| is_unit_open(q)),
            "resize.qualities must be within (0, 1)",
        )?;
        check(r.min_dimension > 0, "resize.min_dimension must be non-zero")?;

        check(
            is_unit_open(self.fallback.quality) && is_unit_open(self.fallback.minimal_quality),
            "fallback qualities must be within (0, 1)",
        )?;
        check(
            self.format.lossy_threshold > 0.0 && self.format.lossy_threshold <= 1.0,
            "format.lossy_threshold must be within (0, 1]",
        )?;

        let b = &self.batch;
        check(
            b.passthrough_ratio > 0.0 && b.passthrough_ratio <= 1.0,
            "batch.passthrough_ratio must be within (0, 1]",
        )?;
        check(
            b.aggressive_ratio > 0.0 && b.aggressive_ratio < b.passthrough_ratio,
            "batch.aggressive_ratio must be within (0, batch.passthrough_ratio)",
        )?;
        check(
            b.max_reduction_percent > 0.0 && b.max_reduction_percent < 100.0,
            "batch.max_reduction_percent must be within (0, 100)",
        )?;

        check(
            is_unit_open(self.convert.quality),
            "convert.quality must be within (0, 1)",
        )
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(CompressorConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CompressorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CompressorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<CompressorConfig, ConfigError> {
    load_config_file(&dir.join(CONFIG_FILE_NAME))
}

/// Like [`load_config`], for an explicit file path. A missing file yields the
/// stock defaults.
pub fn load_config_file(path: &Path) -> Result<CompressorConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgfit Configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Quality search (native resolution)
# ---------------------------------------------------------------------------
[search]
# Acceptable deviation from the target, as a fraction of the target size.
tolerance = 0.05

# When the best quality-search result misses the target by more than this
# fraction, the resize search runs.
retry_threshold = 0.15

# Quality bounds for the binary search (0 = worst, 1 = best).
min_quality = 0.05
max_quality = 0.95

# Iteration cap, and the interval width at which the search stops.
max_iterations = 15
min_interval = 0.02

# Encode once at max_quality before searching. If that already fits under
# the target, the image is accepted without further iterations.
probe_max_quality = true

# ---------------------------------------------------------------------------
# Resize search (used when quality alone cannot reach the target)
# ---------------------------------------------------------------------------
[resize]
# The seed scale is sqrt(target / original), clamped to [min_scale, max_scale].
min_scale = 0.2
max_scale = 1.0

# Offsets tried around the seed scale, in this order.
variations = [-0.1, 0.0, 0.05, 0.1, 0.15, 0.2, -0.05, -0.15]

# Candidates with either side below this many pixels are skipped.
min_dimension = 100

# Qualities swept at each candidate size, highest first.
qualities = [0.9, 0.8, 0.7, 0.6, 0.5, 0.4]

# ---------------------------------------------------------------------------
# Fallback encodes
# ---------------------------------------------------------------------------
[fallback]
# Last-resort quality when the searches produce nothing usable.
quality = 0.1

# Single light encode used when the target is close to the original size.
minimal_quality = 0.85

# ---------------------------------------------------------------------------
# Output format selection
# ---------------------------------------------------------------------------
[format]
# PNG, BMP, and GIF sources asked for less than this fraction of their size
# are re-encoded as JPEG.
lossy_threshold = 0.8

# ---------------------------------------------------------------------------
# Batch planning
# ---------------------------------------------------------------------------
[batch]
# Targets at or above this fraction of the original are not searched.
passthrough_ratio = 0.98

# Targets below this fraction of the original are flagged as very aggressive.
aggressive_ratio = 0.05

# Upper bound for --reduce, in percent.
max_reduction_percent = 90.0

# ---------------------------------------------------------------------------
# WebP conversion
# ---------------------------------------------------------------------------
[convert]
quality = 0.8
"##
}
