//! Output filename derivation.
//!
//! Every output name is derived from the input name's stem, the part before
//! the last dot:
//! - `holiday.jpg` compressed to JPEG → `holiday_compressed.jpg`
//! - `scan.png` compressed to JPEG → `scan_compressed.jpg`
//! - `logo.png` converted → `logo.webp`
//!
//! A name without an extension keeps the whole name as its stem. A leading
//! dot (`.hidden`) is part of the stem, not an extension separator.
//!
//! Inputs from different directories can share a file name, and `a.png` and
//! `a.jpg` both compress to `a_compressed.jpg`. [`OutputNames`] hands out
//! each name once per output directory, numbering repeats `_2`, `_3`, ...

use crate::format::OutputFormat;
use std::collections::HashSet;

/// Split `name` into stem and extension at the last dot.
///
/// - `"photo.final.jpg"` → (`"photo.final"`, `Some("jpg")`)
/// - `"README"` → (`"README"`, `None`)
/// - `".hidden"` → (`".hidden"`, `None`)
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], Some(&name[pos + 1..])),
        _ => (name, None),
    }
}

/// `<stem>_compressed.<ext>`, with the extension of the output format.
pub fn compressed_file_name(name: &str, format: OutputFormat) -> String {
    let (stem, _) = split_name(name);
    format!("{stem}_compressed.{}", format.extension())
}

/// `<stem>.webp`
pub fn converted_file_name(name: &str) -> String {
    let (stem, _) = split_name(name);
    format!("{stem}.{}", OutputFormat::WebP.extension())
}

/// Names already written to one output directory.
///
/// Names are compared case-insensitively, so outputs stay distinct on
/// case-insensitive filesystems too.
#[derive(Debug, Default)]
pub struct OutputNames {
    taken: HashSet<String>,
}

impl OutputNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name` for a file the caller writes itself (e.g. a report).
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_lowercase());
    }

    /// `name` if it is still free, otherwise `<stem>_<n>.<ext>` with the
    /// smallest free `n` from 2. The returned name is taken from then on.
    pub fn claim(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_lowercase()) {
            return name.to_string();
        }
        let (stem, ext) = split_name(name);
        let mut n = 2u32;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            };
            if self.taken.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }
}
