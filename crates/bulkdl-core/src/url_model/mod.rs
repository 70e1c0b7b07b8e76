//! Output-name derivation.
//!
//! Derives safe local filenames from metadata, the URL path, or a
//! Content-Disposition header, and applies the conversion extension rule.

mod content_disposition;
mod extension;
mod path;
mod sanitize;

pub use content_disposition::parse_content_disposition_filename;
pub use extension::{normalize_format, with_target_extension};
pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Default filename when neither the URL nor the headers yield anything usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Derives a safe filename for a direct HTTP download.
///
/// Prefers the filename from `content_disposition`, otherwise the last path
/// segment of `url`, sanitized. Falls back to [`DEFAULT_FILENAME`].
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(parse_content_disposition_filename)
        .filter(|s| !s.is_empty())
        .or_else(|| filename_from_url_path(url));

    candidate
        .as_deref()
        .and_then(safe_name)
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Sanitizes `raw`, returning `None` when nothing usable is left.
pub fn safe_name(raw: &str) -> Option<String> {
    let sanitized = sanitize_filename(raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        None
    } else {
        Some(sanitized)
    }
}
