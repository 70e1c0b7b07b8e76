//! Fetch backends.
//!
//! A [`Fetcher`] resolves metadata for a URL and opens a [`FetchStream`]:
//! one `Info` event with the size hint, any number of `Chunk`s, then `Done`
//! or an error. Backends: [`YtDlpFetcher`] for media sites and
//! [`HttpFetcher`] (libcurl) for direct links.

mod head;
mod http;
mod ytdlp;

pub use head::{probe, HeadResult};
pub use http::HttpFetcher;
pub use ytdlp::{parse_info_json, YtDlpFetcher};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::{BulkConfig, FetchBackend};
use crate::error::FetchError;

/// Chunks buffered between a producer and the task before backpressure.
pub const STREAM_BUFFER: usize = 16;

/// Metadata needed before a download starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Default output file name (a single, sanitized path component).
    pub filename: String,
    /// Expected size in bytes, when known.
    pub size: Option<u64>,
}

/// One event on a fetch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// Sent once, before any data.
    Info { size: Option<u64> },
    Chunk(Vec<u8>),
    /// Terminal success.
    Done,
}

/// Receiving side of a fetch. Ending without `Done` or an error counts as a
/// failure ([`FetchError::Disconnected`]).
pub struct FetchStream {
    rx: mpsc::Receiver<Result<FetchEvent, FetchError>>,
    finished: bool,
}

/// Producer side handed to backend tasks.
pub type FetchSender = mpsc::Sender<Result<FetchEvent, FetchError>>;

impl FetchStream {
    pub fn channel(buffer: usize) -> (FetchSender, FetchStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, FetchStream { rx, finished: false })
    }

    /// A stream that replays `events`; used by in-memory fetchers.
    pub fn from_events(events: Vec<Result<FetchEvent, FetchError>>) -> FetchStream {
        let (tx, stream) = FetchStream::channel(events.len().max(1));
        for ev in events {
            // Capacity equals the event count, so try_send cannot fail.
            let _ = tx.try_send(ev);
        }
        stream
    }

    /// Next event; `None` after a terminal event has been returned.
    pub async fn next(&mut self) -> Option<Result<FetchEvent, FetchError>> {
        if self.finished {
            return None;
        }
        let ev = self.rx.recv().await.unwrap_or(Err(FetchError::Disconnected));
        if matches!(ev, Ok(FetchEvent::Done) | Err(_)) {
            self.finished = true;
        }
        Some(ev)
    }
}

/// Source of remote media.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Looks up the default file name and size for `url`.
    async fn resolve_metadata(&self, url: &str) -> Result<Metadata, FetchError>;

    /// Starts fetching `url`. Errors after this point arrive on the stream.
    async fn begin_fetch(&self, url: &str) -> Result<FetchStream, FetchError>;
}

/// Builds the fetcher selected in `cfg`.
pub fn from_config(cfg: &BulkConfig) -> Arc<dyn Fetcher> {
    match cfg.backend {
        FetchBackend::Ytdlp => Arc::new(YtDlpFetcher::new(cfg.ytdlp.clone())),
        FetchBackend::Http => Arc::new(HttpFetcher::new(cfg.http.clone())),
    }
}
