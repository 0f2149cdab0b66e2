//! Blob codec: encoded image bytes tagged with their output format.
//!
//! Every encode produces a [`Blob`]. Callers either save it directly
//! ([`Blob::write_to`]) or move it through text channels as a
//! `data:<mime>;base64,<payload>` URL.

use crate::format::OutputFormat;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Not a data URL")]
    MissingScheme,
    #[error("Data URL header is malformed: {0}")]
    MalformedHeader(String),
    #[error("Unsupported data URL MIME type: {0}")]
    UnsupportedMime(String),
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// An encoded image buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Vec<u8>,
    format: OutputFormat,
}

impl Blob {
    pub fn new(bytes: Vec<u8>, format: OutputFormat) -> Self {
        Self { bytes, format }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Render as `data:<mime>;base64,<payload>`.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime(), STANDARD.encode(&self.bytes))
    }

    /// Parse a base64 data URL back into a blob.
    pub fn from_data_url(url: &str) -> Result<Self, CodecError> {
        let rest = url.strip_prefix("data:").ok_or(CodecError::MissingScheme)?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| CodecError::MalformedHeader(truncate(rest)))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| CodecError::MalformedHeader(header.to_string()))?;
        let format =
            OutputFormat::from_mime(mime).ok_or_else(|| CodecError::UnsupportedMime(mime.to_string()))?;
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(Self { bytes, format })
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(32).collect()
}
