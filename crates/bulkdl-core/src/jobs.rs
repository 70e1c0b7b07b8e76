//! Job sources: a single literal job, a JSON document, or a URL list file.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::item::RawJob;

/// One job from a literal `url [target]` invocation.
pub fn single(url: &str, target: Option<PathBuf>, convert: Option<&str>) -> RawJob {
    let mut job = RawJob::new(url);
    job.output = target;
    if let Some(format) = convert {
        job = job.with_convert(format);
    }
    job
}

/// Reads a line-delimited URL list. Blank lines and `#` comments are skipped;
/// every job gets its name from metadata.
pub fn read_list(path: &Path) -> Result<Vec<RawJob>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read URL list: {}", path.display()))?;
    Ok(parse_list(&data))
}

pub fn parse_list(data: &str) -> Vec<RawJob> {
    data.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(RawJob::new)
        .collect()
}

/// Reads a JSON array of `{url, output?, convert?}` objects.
pub fn read_json(path: &Path) -> Result<Vec<RawJob>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read job file: {}", path.display()))?;
    let jobs: Vec<RawJob> = serde_json::from_str(&data)
        .with_context(|| format!("invalid job file: {}", path.display()))?;
    Ok(jobs)
}

/// Applies a conversion format to every job that has none.
pub fn apply_default_convert(jobs: &mut [RawJob], format: &str) {
    for job in jobs.iter_mut().filter(|j| j.convert.is_none()) {
        job.convert = Some(crate::item::ConvertValue::Format(format.to_string()));
    }
}
