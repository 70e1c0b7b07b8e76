//! Filename sanitization for names coming from metadata, headers or URLs.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Sanitizes a candidate filename so it names a single file in the target
/// directory.
///
/// - Replaces NUL, `/`, `\` and control characters with `_`
/// - Collapses runs of `_`
/// - Trims leading/trailing spaces, dots and underscores
/// - Limits length to 255 bytes on a char boundary
///
/// Interior spaces are kept; media titles commonly contain them.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;

    for c in name.chars() {
        let c = if c == '\0' || c == '/' || c == '\\' || c.is_control() {
            '_'
        } else {
            c
        };
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        out.push(c);
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.' || c == '_');
    if trimmed.len() <= NAME_MAX {
        return trimmed.to_string();
    }
    let mut take = NAME_MAX;
    while take > 0 && !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}
