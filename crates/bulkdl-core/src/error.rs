//! Error types for job construction, per-item failures, and the fetch/transcode backends.

use std::path::PathBuf;
use thiserror::Error;

/// Structurally invalid input to `BulkDownload::new`. These are the only
/// errors the orchestrator returns synchronously.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job list is empty")]
    NoJobs,

    #[error("worker count must be at least 1")]
    NoWorkers,

    /// Entry at `index` has a missing or blank `url`.
    #[error("job {index}: missing url")]
    MissingUrl { index: usize },

    /// `convert` was `true` or blank; a conversion needs a format id.
    #[error("job {index}: convert needs a target format (e.g. \"mp3\")")]
    InvalidConvert { index: usize },

    #[error("cannot resolve base directory: {0}")]
    BaseDir(#[source] std::io::Error),
}

/// Terminal failure attached to one item. Cloneable so item snapshots can
/// carry it after the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    /// Could not determine a default output name.
    #[error("metadata lookup failed: {0}")]
    Metadata(String),

    /// Network/source error while fetching.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Converter process failed or exited non-zero.
    #[error("transcode failed: {0}")]
    Transcode(String),

    /// Local file could not be written or finalized.
    #[error("write failed: {0}")]
    Write(String),

    /// The worker holding the item stopped abnormally.
    #[error("worker aborted before the item finished")]
    Aborted,
}

/// Errors from a fetch backend.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {code} from {url}")]
    Http { url: String, code: u32 },

    #[error("curl: {0}")]
    Curl(#[from] curl::Error),

    /// External downloader exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Process {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metadata: {0}")]
    Metadata(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The producer side of the stream went away without a terminal event.
    #[error("fetch stream closed unexpectedly")]
    Disconnected,
}

/// Errors from a transcode backend.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("converter not found at {path}")]
    NotFound { path: PathBuf },

    #[error("conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscodeError {
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Reason plus the last line of converter stderr, for item error messages.
    pub fn summary(&self) -> String {
        match self {
            Self::ConversionFailed {
                reason,
                stderr: Some(stderr),
            } => match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
                Some(last) => format!("{reason}: {}", last.trim()),
                None => reason.clone(),
            },
            other => other.to_string(),
        }
    }
}
