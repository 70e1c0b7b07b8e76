//! Job descriptors and per-item records.
//!
//! A [`RawJob`] is what a job source supplies (`url`, optional `output`,
//! optional `convert`). [`ItemRecord`] is the mutable state the orchestrator
//! keeps for each job across the run and hands back for inspection.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ItemError, JobError};
use crate::url_model;

/// `convert` as written in a job document: a format id, or a boolean flag.
/// `false` means no conversion; `true` is rejected because it names no format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConvertValue {
    Flag(bool),
    Format(String),
}

/// One requested download as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJob {
    /// Source locator. Missing in a document deserializes to empty and is
    /// rejected at construction.
    #[serde(default)]
    pub url: String,
    /// Destination path; resolved from metadata when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<ConvertValue>,
}

impl RawJob {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_convert(mut self, format: impl Into<String>) -> Self {
        self.convert = Some(ConvertValue::Format(format.into()));
        self
    }
}

/// State of one item across the run.
///
/// `finished` flips to true exactly once, `file` is computed at most once and
/// `error` is set at most once; the orchestrator enforces this through the
/// crate-private mutators below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub url: String,
    pub output: Option<PathBuf>,
    /// Normalized target format, `None` for no conversion.
    pub convert: Option<String>,
    pub finished: bool,
    /// Absolute destination, set once `output` and `convert` are resolved.
    pub file: Option<PathBuf>,
    pub error: Option<ItemError>,
    pub bytes_transferred: u64,
    pub assigned_worker: Option<usize>,
}

impl ItemRecord {
    /// Validates a raw job. `index` is only used for error reporting.
    pub fn from_raw(index: usize, raw: RawJob) -> Result<Self, JobError> {
        let url = raw.url.trim().to_string();
        if url.is_empty() {
            return Err(JobError::MissingUrl { index });
        }
        let convert = match raw.convert {
            None | Some(ConvertValue::Flag(false)) => None,
            Some(ConvertValue::Flag(true)) => return Err(JobError::InvalidConvert { index }),
            Some(ConvertValue::Format(f)) => Some(
                url_model::normalize_format(&f).ok_or(JobError::InvalidConvert { index })?,
            ),
        };
        let output = raw.output.filter(|p| !p.as_os_str().is_empty());
        Ok(Self {
            url,
            output,
            convert,
            finished: false,
            file: None,
            error: None,
            bytes_transferred: 0,
            assigned_worker: None,
        })
    }

    /// Title shown for this item: the destination file name, else the URL.
    pub fn title(&self) -> String {
        self.file
            .as_deref()
            .or(self.output.as_deref())
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.url.clone())
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Computes `file` from `output`, `convert` and `cwd` the first time it
    /// is called; later calls return the stored value. `None` while `output`
    /// is unresolved. A conversion also rewrites the extension of the stored
    /// `output`.
    pub(crate) fn resolve_file(&mut self, cwd: &Path) -> Option<&Path> {
        if self.file.is_none() {
            let output = self.output.as_deref()?;
            if let Some(format) = self.convert.as_deref() {
                self.output = Some(url_model::with_target_extension(output, format));
            }
            let output = self.output.as_deref()?;
            self.file = Some(resolve_file(output, None, cwd));
        }
        self.file.as_deref()
    }

    pub(crate) fn add_bytes(&mut self, n: u64) {
        self.bytes_transferred = self.bytes_transferred.saturating_add(n);
    }

    /// Terminal transition. Returns false (and changes nothing) when the item
    /// was already finished.
    pub(crate) fn finish(&mut self, outcome: Result<(), ItemError>) -> bool {
        if self.finished {
            tracing::warn!(url = %self.url, "ignoring second terminal transition");
            return false;
        }
        if let Err(e) = outcome {
            self.error = Some(e);
        }
        self.finished = true;
        true
    }
}

/// Destination path for `output`: extension rewritten to `convert` when it
/// differs, then anchored at `cwd` when relative.
pub fn resolve_file(output: &Path, convert: Option<&str>, cwd: &Path) -> PathBuf {
    let output = match convert {
        Some(format) => url_model::with_target_extension(output, format),
        None => output.to_path_buf(),
    };
    if output.is_absolute() {
        output
    } else {
        cwd.join(output)
    }
}
