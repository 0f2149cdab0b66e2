//! File intake: read images from disk and filter them against each tool's
//! accepted input formats.
//!
//! The two tools accept different sets:
//!
//! | Tool | Accepted |
//! |---|---|
//! | [`Tool::Compress`] | JPEG, PNG, WebP, AVIF |
//! | [`Tool::Convert`] | JPEG, PNG, GIF, BMP, SVG |
//!
//! Anything else is excluded before decode and named in a single warning.
//! The MIME type comes from the file extension, or from the leading bytes
//! when the extension is unknown.

use crate::types::SourceImage;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

const COMPRESS_MIMES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/avif",
];

const CONVERT_MIMES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/svg+xml",
];

/// Which operation the files are admitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Compress,
    Convert,
}

impl Tool {
    pub fn accepted_mimes(self) -> &'static [&'static str] {
        match self {
            Self::Compress => COMPRESS_MIMES,
            Self::Convert => CONVERT_MIMES,
        }
    }

    pub fn accepts(self, mime: &str) -> bool {
        self.accepted_mimes().contains(&mime)
    }

    fn supported_list(self) -> &'static str {
        match self {
            Self::Compress => "JPG, PNG, WEBP, and AVIF",
            Self::Convert => "JPG, PNG, GIF, BMP, and SVG",
        }
    }
}

/// Outcome of filtering a selection for one tool.
#[derive(Debug, Clone, Default)]
pub struct Intake {
    pub accepted: Vec<SourceImage>,
    /// Names of the excluded files, in selection order.
    pub skipped: Vec<String>,
}

impl Intake {
    /// User-facing warning naming every skipped file, or `None` if nothing
    /// was skipped.
    pub fn warning(&self, tool: Tool) -> Option<String> {
        if self.skipped.is_empty() {
            return None;
        }
        Some(format!(
            "{} file(s) skipped ({}). Only {} formats are supported.",
            self.skipped.len(),
            self.skipped.join(", "),
            tool.supported_list()
        ))
    }
}

/// Split `files` into those `tool` accepts and the names of the rest.
pub fn admit(tool: Tool, files: Vec<SourceImage>) -> Intake {
    let mut intake = Intake::default();
    for file in files {
        if tool.accepts(&file.mime) {
            intake.accepted.push(file);
        } else {
            intake.skipped.push(file.name);
        }
    }
    intake
}

/// MIME type for a file extension, case-insensitive.
pub fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "heic" | "heif" => "image/heic",
        _ => return None,
    };
    Some(mime)
}

/// MIME type from the leading bytes of a file.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }
    let head = &bytes[..bytes.len().min(256)];
    let text = String::from_utf8_lossy(head);
    if text.contains("<svg") {
        return Some("image/svg+xml");
    }
    None
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read one file into a [`SourceImage`].
///
/// Files whose type cannot be determined get `application/octet-stream`, so
/// [`admit`] reports them as skipped rather than dropping them silently.
pub fn read_image(path: &Path) -> Result<SourceImage, IntakeError> {
    let bytes = fs::read(path).map_err(|source| IntakeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mime = mime_from_extension(path)
        .or_else(|| sniff_mime(&bytes))
        .unwrap_or("application/octet-stream");
    Ok(SourceImage::new(file_name(path), mime, bytes))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Expand `paths` into image files, in argument order.
///
/// Files named directly are always returned. Directories are walked
/// recursively in name order and contribute only files with an image
/// extension; hidden entries are ignored.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, IntakeError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let walker = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() && mime_from_extension(entry.path()).is_some() {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

/// Read every image under `paths` and filter the selection for `tool`.
pub fn load(tool: Tool, paths: &[PathBuf]) -> Result<Intake, IntakeError> {
    let files = collect_files(paths)?
        .iter()
        .map(|p| read_image(p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(admit(tool, files))
}
