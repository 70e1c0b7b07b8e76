//! In-memory fetcher, transcoder and progress sink.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bulkdl_core::fetch::{FetchEvent, FetchStream, Fetcher, Metadata};
use bulkdl_core::progress::{OverviewStats, ProgressSink};
use bulkdl_core::transcode::{TranscodeSession, Transcoder};
use bulkdl_core::{Backends, FetchError, TranscodeError};

/// What the fake serves for one URL.
#[derive(Debug, Clone, Default)]
pub struct Source {
    /// Metadata file name; `None` makes metadata lookup fail.
    pub filename: Option<String>,
    pub body: Vec<u8>,
    /// Fail the stream after this many bytes.
    pub fail_after: Option<usize>,
}

impl Source {
    pub fn media(filename: &str, body: &[u8]) -> Self {
        Self {
            filename: Some(filename.to_string()),
            body: body.to_vec(),
            fail_after: None,
        }
    }

    pub fn failing(filename: &str, body: &[u8], after: usize) -> Self {
        Self {
            fail_after: Some(after),
            ..Self::media(filename, body)
        }
    }
}

/// Serves [`Source`]s in chunks of `chunk` bytes and records every call.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    sources: HashMap<String, Source>,
    chunk: usize,
    delay: Option<Duration>,
    metadata_calls: Mutex<Vec<String>>,
    fetch_calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            chunk: 4,
            ..Self::default()
        }
    }

    pub fn with(mut self, url: &str, source: Source) -> Self {
        self.sources.insert(url.to_string(), source);
        self
    }

    /// Sleep between chunks so workers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn metadata_calls(&self) -> Vec<String> {
        self.metadata_calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> Vec<String> {
        self.fetch_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    fn name(&self) -> &str {
        "fake"
    }

    async fn resolve_metadata(&self, url: &str) -> Result<Metadata, FetchError> {
        self.metadata_calls.lock().unwrap().push(url.to_string());
        let source = self.sources.get(url);
        match source.and_then(|s| s.filename.clone()) {
            Some(filename) => Ok(Metadata {
                filename,
                size: source.map(|s| s.body.len() as u64),
            }),
            None => Err(FetchError::Metadata(format!("no metadata for {url}"))),
        }
    }

    async fn begin_fetch(&self, url: &str) -> Result<FetchStream, FetchError> {
        self.fetch_calls.lock().unwrap().push(url.to_string());
        let Some(source) = self.sources.get(url).cloned() else {
            return Err(FetchError::Http {
                url: url.to_string(),
                code: 404,
            });
        };
        let (tx, stream) = FetchStream::channel(4);
        let chunk = self.chunk.max(1);
        let delay = self.delay;
        let url = url.to_string();
        tokio::spawn(async move {
            let size = Some(source.body.len() as u64);
            if tx.send(Ok(FetchEvent::Info { size })).await.is_err() {
                return;
            }
            let limit = source.fail_after.unwrap_or(source.body.len());
            for part in source.body[..limit.min(source.body.len())].chunks(chunk) {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                if tx.send(Ok(FetchEvent::Chunk(part.to_vec()))).await.is_err() {
                    return;
                }
            }
            let terminal = match source.fail_after {
                Some(_) => Err(FetchError::Http { url, code: 500 }),
                None => Ok(FetchEvent::Done),
            };
            let _ = tx.send(terminal).await;
        });
        Ok(stream)
    }
}

/// Writes `"<format>:" + input` to the output; optionally fails on finish.
#[derive(Debug, Default)]
pub struct FakeTranscoder {
    pub fail: bool,
    pub started: Mutex<Vec<(String, PathBuf)>>,
}

impl FakeTranscoder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

struct FakeSession {
    format: String,
    output: PathBuf,
    buf: Vec<u8>,
    fail: bool,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start(
        &self,
        format: &str,
        output: &Path,
    ) -> Result<Box<dyn TranscodeSession>, TranscodeError> {
        self.started
            .lock()
            .unwrap()
            .push((format.to_string(), output.to_path_buf()));
        Ok(Box::new(FakeSession {
            format: format.to_string(),
            output: output.to_path_buf(),
            buf: Vec::new(),
            fail: self.fail,
        }))
    }
}

#[async_trait]
impl TranscodeSession for FakeSession {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), TranscodeError> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), TranscodeError> {
        if self.fail {
            return Err(TranscodeError::conversion_failed(
                "ffmpeg exited with exit status: 1",
                Some("pipe:0: Invalid data found when processing input".into()),
            ));
        }
        let mut out = format!("{}:", self.format).into_bytes();
        out.extend_from_slice(&self.buf);
        std::fs::write(&self.output, out)?;
        Ok(())
    }

    async fn abort(self: Box<Self>) {}
}

/// One recorded progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started {
        slot: usize,
        title: String,
        size: Option<u64>,
    },
    Progress {
        slot: usize,
        bytes: u64,
    },
    Finished {
        slot: usize,
    },
    Overview(OverviewStats),
    Finish,
}

/// Records every event and the peak number of simultaneously active slots.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    active: Mutex<(usize, usize)>,
    finishes: Mutex<usize>,
    /// Sleep inside `overview` when `completed` equals the first value.
    slow_overview: Option<(usize, Duration)>,
}

impl RecordingSink {
    pub fn with_slow_overview(completed: usize, delay: Duration) -> Self {
        Self {
            slow_overview: Some((completed, delay)),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn started_titles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Started { title, .. } => Some(title),
                _ => None,
            })
            .collect()
    }

    pub fn overviews(&self) -> Vec<OverviewStats> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Overview(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.active.lock().unwrap().1
    }

    pub fn finish_count(&self) -> usize {
        *self.finishes.lock().unwrap()
    }
}

impl ProgressSink for RecordingSink {
    fn item_started(&self, slot: usize, title: &str, size: Option<u64>) {
        let mut active = self.active.lock().unwrap();
        active.0 += 1;
        active.1 = active.1.max(active.0);
        self.events.lock().unwrap().push(Event::Started {
            slot,
            title: title.to_string(),
            size,
        });
    }

    fn item_progress(&self, slot: usize, bytes: u64) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Progress { slot, bytes });
    }

    fn item_finished(&self, slot: usize) {
        self.active.lock().unwrap().0 -= 1;
        self.events.lock().unwrap().push(Event::Finished { slot });
    }

    fn overview(&self, stats: OverviewStats) {
        if let Some((completed, delay)) = self.slow_overview {
            if stats.completed == completed {
                std::thread::sleep(delay);
            }
        }
        self.events.lock().unwrap().push(Event::Overview(stats));
    }

    fn finish(&self) {
        *self.finishes.lock().unwrap() += 1;
        self.events.lock().unwrap().push(Event::Finish);
    }
}

pub fn backends(fetcher: &Arc<FakeFetcher>, transcoder: &Arc<FakeTranscoder>) -> Backends {
    Backends::new(
        Arc::clone(fetcher) as Arc<dyn Fetcher>,
        Arc::clone(transcoder) as Arc<dyn Transcoder>,
    )
}
