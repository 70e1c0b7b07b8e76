//! Target-format extension handling for converted outputs.

use std::path::{Path, PathBuf};

/// Normalizes a user-supplied format id: trims whitespace and a leading dot.
/// Returns `None` for blank input.
pub fn normalize_format(format: &str) -> Option<String> {
    let f = format.trim().trim_start_matches('.').trim();
    if f.is_empty() {
        None
    } else {
        Some(f.to_string())
    }
}

/// Rewrites `output` to end in `.format` unless its extension already matches
/// (ASCII case-insensitive). An output without extension gains one.
pub fn with_target_extension(output: &Path, format: &str) -> PathBuf {
    let matches = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(format));
    if matches {
        return output.to_path_buf();
    }
    output.with_extension(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_differing_extension() {
        assert_eq!(
            with_target_extension(Path::new("a.mp4"), "mp3"),
            PathBuf::from("a.mp3")
        );
        assert_eq!(
            with_target_extension(Path::new("music/set.webm"), "ogg"),
            PathBuf::from("music/set.ogg")
        );
    }

    #[test]
    fn keeps_matching_extension() {
        assert_eq!(
            with_target_extension(Path::new("a.mp4"), "mp4"),
            PathBuf::from("a.mp4")
        );
        assert_eq!(
            with_target_extension(Path::new("A.MP4"), "mp4"),
            PathBuf::from("A.MP4")
        );
    }

    #[test]
    fn adds_missing_extension() {
        assert_eq!(
            with_target_extension(Path::new("track"), "flac"),
            PathBuf::from("track.flac")
        );
    }

    #[test]
    fn normalize_format_strips_dot() {
        assert_eq!(normalize_format(" .mp3 ").as_deref(), Some("mp3"));
        assert_eq!(normalize_format("   "), None);
        assert_eq!(normalize_format("."), None);
    }
}
