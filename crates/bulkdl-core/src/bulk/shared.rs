//! State shared by the workers of one run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use super::{Backends, BulkDownload};
use crate::error::ItemError;
use crate::item::ItemRecord;
use crate::progress::{OverviewStats, ProgressSink};
use crate::task::{TaskContext, TaskEvent};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(super) struct Shared {
    items: Vec<Mutex<ItemRecord>>,
    /// Next unclaimed index.
    cursor: AtomicUsize,
    completed: AtomicUsize,
    total_bytes: AtomicU64,
    pub(super) workers: usize,
    pub(super) cwd: PathBuf,
    pub(super) overwrite: bool,
    pub(super) backends: Backends,
    pub(super) progress: Arc<dyn ProgressSink>,
    /// Taken by whichever completion fires the signal.
    done: Mutex<Option<oneshot::Sender<()>>>,
}

impl Shared {
    pub(super) fn new(bulk: BulkDownload, done: oneshot::Sender<()>) -> Self {
        Self {
            items: bulk.items.into_iter().map(Mutex::new).collect(),
            cursor: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            total_bytes: AtomicU64::new(bulk.total_bytes),
            workers: bulk.workers,
            cwd: bulk.cwd,
            overwrite: bulk.overwrite,
            backends: bulk.backends,
            progress: bulk.progress,
            done: Mutex::new(Some(done)),
        }
    }

    /// Claims the next index, or `None` once the queue is exhausted.
    pub(super) fn claim_next(&self) -> Option<usize> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        (index < self.items.len()).then_some(index)
    }

    /// Runs `f` with the item locked. Never call across an await point.
    pub(super) fn with_item<R>(&self, index: usize, f: impl FnOnce(&mut ItemRecord) -> R) -> R {
        f(&mut lock(&self.items[index]))
    }

    /// Routes one task event to the item record and the progress sink.
    pub(super) fn on_task_event(&self, ctx: &TaskContext, event: TaskEvent) {
        match event {
            TaskEvent::Started { size } => {
                self.progress.item_started(ctx.slot, &ctx.title, size);
            }
            TaskEvent::Progress { bytes } => {
                self.with_item(ctx.index, |item| item.add_bytes(bytes));
                self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
                self.progress.item_progress(ctx.slot, bytes);
            }
        }
    }

    /// Terminal transition for `index`: records the outcome, reports the
    /// overview and checks for overall completion.
    ///
    /// The counter, the overview and the completion signal are serialized
    /// under `done`, so overviews arrive in order and none follow `finish`.
    pub(super) fn complete(&self, index: usize, outcome: Result<(), ItemError>) {
        let changed = self.with_item(index, |item| item.finish(outcome));
        if !changed {
            return;
        }
        let mut done = lock(&self.done);
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if done.is_none() {
            return;
        }
        let total = self.items.len();
        let total_bytes = self.total_bytes.load(Ordering::Relaxed);
        self.progress.overview(OverviewStats {
            completed,
            total,
            total_bytes,
        });
        // Each item is counted once, so this is "every item finished".
        if completed < total {
            return;
        }
        if let Some(tx) = done.take() {
            tracing::info!(items = total, total_bytes, "all items finished");
            let _ = tx.send(());
            self.progress.finish();
        }
    }

    /// Marks every unfinished item as aborted.
    pub(super) fn abort_unfinished(&self) {
        for index in 0..self.items.len() {
            let finished = self.with_item(index, |item| item.finished);
            if !finished {
                tracing::warn!(index, "item left unfinished by its worker");
                self.complete(index, Err(ItemError::Aborted));
            }
        }
    }

    /// Rebuilds the orchestrator once every worker has been joined.
    pub(super) fn into_bulk(shared: Arc<Self>) -> BulkDownload {
        match Arc::try_unwrap(shared) {
            Ok(s) => {
                let total_bytes = s.total_bytes.load(Ordering::SeqCst);
                BulkDownload {
                    items: s
                        .items
                        .into_iter()
                        .map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
                        .collect(),
                    workers: s.workers,
                    cwd: s.cwd,
                    overwrite: s.overwrite,
                    backends: s.backends,
                    progress: s.progress,
                    total_bytes,
                }
            }
            Err(s) => BulkDownload {
                items: s.items.iter().map(|m| lock(m).clone()).collect(),
                workers: s.workers,
                cwd: s.cwd.clone(),
                overwrite: s.overwrite,
                backends: s.backends.clone(),
                progress: Arc::clone(&s.progress),
                total_bytes: s.total_bytes.load(Ordering::SeqCst),
            },
        }
    }
}
