//! Progress events emitted by the orchestrator.
//!
//! The orchestrator reports through a [`ProgressSink`]; rendering is the
//! caller's business (the CLI draws terminal bars). Per-slot events are only
//! sent for items that actually start a transfer: skipped items and metadata
//! failures show up in the overview alone.

/// Aggregate snapshot sent once per item completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverviewStats {
    /// Items that reached a terminal state (success, skip or error).
    pub completed: usize,
    pub total: usize,
    /// Bytes transferred across all workers so far.
    pub total_bytes: u64,
}

impl OverviewStats {
    /// Fraction of items done in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

/// Receiver of orchestrator progress. Implementations must be cheap and
/// non-blocking; they are called from worker tasks.
pub trait ProgressSink: Send + Sync {
    /// A transfer started on `slot`; `size` is the fetch size hint.
    fn item_started(&self, slot: usize, title: &str, size: Option<u64>);

    /// `bytes` more were transferred on `slot`.
    fn item_progress(&self, slot: usize, bytes: u64);

    /// The transfer on `slot` ended (successfully or not).
    fn item_finished(&self, slot: usize);

    /// An item reached a terminal state.
    fn overview(&self, stats: OverviewStats);

    /// Every item is terminal; no more events follow.
    fn finish(&self) {}
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn item_started(&self, _slot: usize, _title: &str, _size: Option<u64>) {}
    fn item_progress(&self, _slot: usize, _bytes: u64) {}
    fn item_finished(&self, _slot: usize) {}
    fn overview(&self, _stats: OverviewStats) {}
}
