//! Bulk media downloader core: item records, job sources, the bounded
//! worker pool and the fetch/transcode backends it drives.

pub mod bulk;
pub mod config;
pub mod error;
pub mod fetch;
pub mod item;
pub mod jobs;
pub mod logging;
pub mod progress;
pub mod storage;
pub mod task;
pub mod transcode;
pub mod url_model;

mod process;

pub use bulk::{Backends, BulkDownload, Completion};
pub use error::{FetchError, ItemError, JobError, TranscodeError};
pub use item::{ItemRecord, RawJob};
pub use progress::{NoProgress, OverviewStats, ProgressSink};
