//! Bounded-concurrency orchestrator.
//!
//! [`BulkDownload`] owns the item records and a fixed worker count. On
//! [`execute`](BulkDownload::execute) it spawns that many workers; each one
//! claims the next unclaimed index, resolves the output name if needed,
//! skips items whose destination already exists, otherwise runs a
//! [`Task`](crate::task::Task), and claims again until the queue is empty.
//! A failed item is recorded and never stops the run.

mod shared;
mod worker;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::config::BulkConfig;
use crate::error::JobError;
use crate::fetch::{self, Fetcher};
use crate::item::{ItemRecord, RawJob};
use crate::progress::{NoProgress, ProgressSink};
use crate::transcode::{FfmpegTranscoder, Transcoder};

use shared::Shared;

/// Fetch and transcode collaborators used by every worker.
#[derive(Clone)]
pub struct Backends {
    pub fetcher: Arc<dyn Fetcher>,
    pub transcoder: Arc<dyn Transcoder>,
}

impl Backends {
    pub fn new(fetcher: Arc<dyn Fetcher>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            fetcher,
            transcoder,
        }
    }

    /// Fetcher selected by `cfg.backend`, ffmpeg for conversions.
    pub fn from_config(cfg: &BulkConfig) -> Self {
        Self {
            fetcher: fetch::from_config(cfg),
            transcoder: Arc::new(FfmpegTranscoder::new(cfg.ffmpeg.clone())),
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("fetcher", &self.fetcher.name())
            .field("transcoder", &self.transcoder.name())
            .finish()
    }
}

/// A batch of items and the settings to download them with.
pub struct BulkDownload {
    items: Vec<ItemRecord>,
    workers: usize,
    cwd: PathBuf,
    overwrite: bool,
    backends: Backends,
    progress: Arc<dyn ProgressSink>,
    total_bytes: u64,
}

impl BulkDownload {
    /// Validates `jobs` and captures the settings. Fails on an empty job
    /// list, zero workers, a missing url or an unusable `convert`; a missing
    /// `output` is resolved later from metadata. A relative `cwd` is taken
    /// relative to the process working directory.
    pub fn new(
        jobs: Vec<RawJob>,
        workers: usize,
        cwd: impl AsRef<Path>,
        backends: Backends,
    ) -> Result<Self, JobError> {
        if jobs.is_empty() {
            return Err(JobError::NoJobs);
        }
        if workers == 0 {
            return Err(JobError::NoWorkers);
        }
        let items = jobs
            .into_iter()
            .enumerate()
            .map(|(index, raw)| ItemRecord::from_raw(index, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let cwd = cwd.as_ref();
        let cwd = if cwd.is_absolute() {
            cwd.to_path_buf()
        } else {
            std::env::current_dir().map_err(JobError::BaseDir)?.join(cwd)
        };

        Ok(Self {
            items,
            workers,
            cwd,
            overwrite: false,
            backends,
            progress: Arc::new(NoProgress),
            total_bytes: 0,
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace existing destinations instead of skipping them.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Starts the workers and returns immediately. The returned future
    /// resolves to this orchestrator once every item is terminal; its items
    /// can then be inspected. Must be called within a tokio runtime.
    pub fn execute(self) -> Completion {
        let workers = self.workers.min(self.items.len());
        tracing::info!(
            items = self.items.len(),
            workers,
            cwd = %self.cwd.display(),
            fetcher = self.backends.fetcher.name(),
            "starting bulk download"
        );
        let (done_tx, done_rx) = oneshot::channel();
        let shared = Arc::new(Shared::new(self, done_tx));
        Completion {
            handle: tokio::spawn(supervise(shared, workers, done_rx)),
        }
    }

    /// Items that ended with an error, in their original order.
    pub fn extract_errors(&self) -> Vec<ItemRecord> {
        self.items.iter().filter(|i| i.is_error()).cloned().collect()
    }

    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in a terminal state.
    pub fn completed(&self) -> usize {
        self.items.iter().filter(|i| i.finished).count()
    }

    /// Bytes transferred across all items.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

impl std::fmt::Debug for BulkDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkDownload")
            .field("items", &self.items.len())
            .field("workers", &self.workers)
            .field("cwd", &self.cwd)
            .field("overwrite", &self.overwrite)
            .field("backends", &self.backends)
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

/// Resolves once every item is terminal. A `JoinError` only occurs when
/// the runtime shuts down underneath the run.
#[must_use = "the download runs in the background; await the completion to inspect results"]
pub struct Completion {
    handle: JoinHandle<BulkDownload>,
}

impl Future for Completion {
    type Output = Result<BulkDownload, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

/// Joins all workers, then hands the records back.
async fn supervise(
    shared: Arc<Shared>,
    workers: usize,
    done: oneshot::Receiver<()>,
) -> BulkDownload {
    let mut join_set = JoinSet::new();
    for slot in 0..workers {
        join_set.spawn(worker::run_worker(Arc::clone(&shared), slot));
    }

    while let Some(res) = join_set.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "worker stopped abnormally");
        }
    }

    // Items held by a panicked worker never finished on their own.
    shared.abort_unfinished();
    if done.await.is_err() {
        tracing::warn!("completion signal dropped before firing");
    }

    Shared::into_bulk(shared)
}
