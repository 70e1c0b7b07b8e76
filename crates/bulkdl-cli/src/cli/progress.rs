//! Terminal progress: one overview bar plus one bar per active worker slot.

use bulkdl_core::progress::{OverviewStats, ProgressSink};
use indicatif::{DecimalBytes, MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Width of the title column.
pub const TITLE_WIDTH: usize = 25;

const OVERVIEW_STYLE: &str = "{prefix:25} [{bar:30.green/white}] {pos}/{len} files | {msg}";
const SLOT_STYLE: &str =
    "{prefix:25} [{bar:30.cyan/blue}] {decimal_bytes}/{decimal_total_bytes} @ {decimal_bytes_per_sec}";
const SLOT_UNKNOWN_STYLE: &str = "{prefix:25} {spinner:.cyan} {decimal_bytes} @ {decimal_bytes_per_sec}";
const PB_CHARS: &str = "━━╌";

fn style(template: &str) -> ProgressStyle {
    match ProgressStyle::with_template(template) {
        Ok(s) => s.progress_chars(PB_CHARS),
        Err(_) => ProgressStyle::default_bar(),
    }
}

/// Shortens `title` to [`TITLE_WIDTH`] columns, keeping its extension
/// (`a-very-long-recording-name.flac` → `a-very-long-recordi….flac`).
pub fn formatted_title(title: &str) -> String {
    let name = Path::new(title)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| title.to_string());
    if name.chars().count() <= TITLE_WIDTH {
        return name;
    }
    let ext = Path::new(&name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .filter(|e| e.chars().count() < TITLE_WIDTH / 2)
        .unwrap_or_default();
    let keep = TITLE_WIDTH - 1 - ext.chars().count();
    let head: String = name.chars().take(keep).collect();
    format!("{head}…{ext}")
}

/// [`ProgressSink`] drawing with indicatif.
pub struct TerminalProgress {
    multi: MultiProgress,
    overview: ProgressBar,
    slots: Mutex<HashMap<usize, ProgressBar>>,
}

impl TerminalProgress {
    pub fn new(total: usize, slots: usize) -> Self {
        let multi = MultiProgress::new();
        let overview = multi.add(ProgressBar::new(total as u64));
        overview.set_style(style(OVERVIEW_STYLE));
        overview.set_prefix("Download:");
        overview.set_message(DecimalBytes(0).to_string());
        Self {
            multi,
            overview,
            slots: Mutex::new(HashMap::with_capacity(slots)),
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<usize, ProgressBar>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressSink for TerminalProgress {
    fn item_started(&self, slot: usize, title: &str, size: Option<u64>) {
        let bar = match size {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(style(SLOT_STYLE));
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(style(SLOT_UNKNOWN_STYLE));
                bar
            }
        };
        bar.set_prefix(formatted_title(title));
        let bar = self.multi.add(bar);
        if let Some(old) = self.slots().insert(slot, bar) {
            old.finish_and_clear();
        }
    }

    fn item_progress(&self, slot: usize, bytes: u64) {
        if let Some(bar) = self.slots().get(&slot) {
            bar.inc(bytes);
        }
    }

    fn item_finished(&self, slot: usize) {
        if let Some(bar) = self.slots().remove(&slot) {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }

    fn overview(&self, stats: OverviewStats) {
        self.overview.set_position(stats.completed as u64);
        self.overview
            .set_message(DecimalBytes(stats.total_bytes).to_string());
    }

    fn finish(&self) {
        for (_, bar) in self.slots().drain() {
            bar.finish_and_clear();
        }
        self.overview.finish();
    }
}
