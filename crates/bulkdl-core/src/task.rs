//! One fetch → (transcode) → write pipeline for a single item.
//!
//! States: `Created → Fetching → Writing → Finished`, with `Converting`
//! between `Writing` and `Finished` when a target format is set, and `Error`
//! reachable from any non-terminal state. The task reports a size hint and
//! incremental byte counts through a callback and returns its outcome once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{FetchError, ItemError, TranscodeError};
use crate::fetch::{FetchEvent, Fetcher};
use crate::storage::{self, StorageWriter};
use crate::transcode::{TranscodeSession, Transcoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Fetching,
    Writing,
    Converting,
    Finished,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Error)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Created, Fetching) => true,
            (Fetching, Writing) => true,
            (Writing, Converting) | (Writing, Finished) => true,
            (Converting, Finished) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Progress reported while a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// Data started flowing; `size` is the fetch size hint. Sent once.
    Started { size: Option<u64> },
    /// `bytes` more were received (incremental, never zero).
    Progress { bytes: u64 },
}

/// Identifies the item a task belongs to when its events are handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub slot: usize,
    pub index: usize,
    pub title: String,
}

/// Where fetched bytes go.
enum Sink {
    Direct(StorageWriter),
    Convert {
        session: Box<dyn TranscodeSession>,
        temp: PathBuf,
    },
}

impl Sink {
    async fn write(&mut self, data: &[u8]) -> Result<(), ItemError> {
        match self {
            Sink::Direct(w) => w.write(data).await.map_err(write_error),
            Sink::Convert { session, .. } => session.write(data).await.map_err(transcode_error),
        }
    }

    async fn abort(self) {
        match self {
            Sink::Direct(w) => w.abandon().await,
            Sink::Convert { session, temp } => {
                session.abort().await;
                storage::discard(&temp).await;
            }
        }
    }
}

fn fetch_error(e: FetchError) -> ItemError {
    ItemError::Fetch(e.to_string())
}

fn transcode_error(e: TranscodeError) -> ItemError {
    ItemError::Transcode(e.summary())
}

fn write_error(e: anyhow::Error) -> ItemError {
    ItemError::Write(format!("{e:#}"))
}

pub struct Task {
    url: String,
    file: PathBuf,
    convert: Option<String>,
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    state: TaskState,
}

impl Task {
    /// `file` is the final absolute destination; `convert` the normalized
    /// target format, if any.
    pub fn new(
        url: impl Into<String>,
        file: impl Into<PathBuf>,
        convert: Option<String>,
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            url: url.into(),
            file: file.into(),
            convert,
            fetcher,
            transcoder,
            state: TaskState::Created,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    fn advance(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal task transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(url = %self.url, from = ?self.state, to = ?next, "task state");
        self.state = next;
    }

    /// Runs the pipeline to completion and returns the number of bytes
    /// fetched. Consumes the task; the outcome is produced exactly once.
    pub async fn run<F>(mut self, mut on_event: F) -> Result<u64, ItemError>
    where
        F: FnMut(TaskEvent) + Send,
    {
        let result = self.drive(&mut on_event).await;
        match &result {
            Ok(bytes) => {
                self.advance(TaskState::Finished);
                tracing::debug!(url = %self.url, file = %self.file.display(), bytes, "task finished");
            }
            Err(e) => {
                self.advance(TaskState::Error);
                tracing::debug!(url = %self.url, error = %e, "task failed");
            }
        }
        result
    }

    async fn drive<F>(&mut self, on_event: &mut F) -> Result<u64, ItemError>
    where
        F: FnMut(TaskEvent) + Send,
    {
        self.advance(TaskState::Fetching);
        let mut stream = self
            .fetcher
            .begin_fetch(&self.url)
            .await
            .map_err(fetch_error)?;

        let mut sink: Option<Sink> = None;
        let mut started = false;
        let mut total = 0u64;

        while let Some(event) = stream.next().await {
            match event {
                Ok(FetchEvent::Info { size }) => {
                    if !started {
                        started = true;
                        on_event(TaskEvent::Started { size });
                    }
                }
                Ok(FetchEvent::Chunk(data)) => {
                    if !started {
                        started = true;
                        on_event(TaskEvent::Started { size: None });
                    }
                    if data.is_empty() {
                        continue;
                    }
                    if sink.is_none() {
                        sink = Some(self.open_sink().await?);
                    }
                    let written = match sink.as_mut() {
                        Some(s) => s.write(&data).await,
                        None => Ok(()),
                    };
                    if let Err(e) = written {
                        if let Some(s) = sink.take() {
                            s.abort().await;
                        }
                        return Err(e);
                    }
                    let n = data.len() as u64;
                    total += n;
                    on_event(TaskEvent::Progress { bytes: n });
                }
                Ok(FetchEvent::Done) => break,
                Err(e) => {
                    if let Some(s) = sink.take() {
                        s.abort().await;
                    }
                    return Err(fetch_error(e));
                }
            }
        }

        // Empty body: still produce the (empty) output.
        let sink = match sink {
            Some(s) => s,
            None => self.open_sink().await?,
        };
        self.close_sink(sink).await?;
        Ok(total)
    }

    async fn open_sink(&mut self) -> Result<Sink, ItemError> {
        self.advance(TaskState::Writing);
        match self.convert.as_deref() {
            None => StorageWriter::create(&self.file)
                .await
                .map(Sink::Direct)
                .map_err(write_error),
            Some(format) => {
                storage::ensure_parent(&self.file)
                    .await
                    .map_err(write_error)?;
                let temp = storage::convert_temp_path(&self.file);
                let session = self
                    .transcoder
                    .start(format, &temp)
                    .await
                    .map_err(transcode_error)?;
                Ok(Sink::Convert { session, temp })
            }
        }
    }

    async fn close_sink(&mut self, sink: Sink) -> Result<(), ItemError> {
        match sink {
            Sink::Direct(w) => {
                let temp = w.temp_path().to_path_buf();
                if let Err(e) = w.finalize(&self.file).await {
                    storage::discard(&temp).await;
                    return Err(write_error(e));
                }
            }
            Sink::Convert { session, temp } => {
                self.advance(TaskState::Converting);
                if let Err(e) = session.finish().await {
                    storage::discard(&temp).await;
                    return Err(transcode_error(e));
                }
                if let Err(e) = storage::promote(&temp, &self.file).await {
                    storage::discard(&temp).await;
                    return Err(write_error(e));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchStream, Metadata};
    use async_trait::async_trait;

    /// Replays a fixed event list; `Err(code)` entries become HTTP errors.
    struct Scripted {
        events: Vec<Result<FetchEvent, u32>>,
        refuse: bool,
    }

    impl Scripted {
        fn new(events: Vec<Result<FetchEvent, u32>>) -> Arc<Self> {
            Arc::new(Self {
                events,
                refuse: false,
            })
        }
    }

    #[async_trait]
    impl Fetcher for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn resolve_metadata(&self, _url: &str) -> Result<Metadata, FetchError> {
            Err(FetchError::Metadata("unused".into()))
        }

        async fn begin_fetch(&self, url: &str) -> Result<FetchStream, FetchError> {
            if self.refuse {
                return Err(FetchError::Http {
                    url: url.to_string(),
                    code: 404,
                });
            }
            Ok(FetchStream::from_events(
                self.events
                    .iter()
                    .map(|e| {
                        e.clone().map_err(|code| FetchError::Http {
                            url: url.to_string(),
                            code,
                        })
                    })
                    .collect(),
            ))
        }
    }

    /// Collects input and writes it upper-cased on finish.
    struct Upper {
        fail: bool,
    }

    struct UpperSession {
        buf: Vec<u8>,
        output: PathBuf,
        fail: bool,
    }

    #[async_trait]
    impl Transcoder for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn start(
            &self,
            _format: &str,
            output: &Path,
        ) -> Result<Box<dyn TranscodeSession>, TranscodeError> {
            Ok(Box::new(UpperSession {
                buf: Vec::new(),
                output: output.to_path_buf(),
                fail: self.fail,
            }))
        }
    }

    #[async_trait]
    impl TranscodeSession for UpperSession {
        async fn write(&mut self, chunk: &[u8]) -> Result<(), TranscodeError> {
            self.buf.extend_from_slice(chunk);
            Ok(())
        }

        async fn finish(self: Box<Self>) -> Result<(), TranscodeError> {
            std::fs::write(&self.output, self.buf.to_ascii_uppercase())?;
            if self.fail {
                return Err(TranscodeError::conversion_failed(
                    "exit status: 1",
                    Some("Invalid data found when processing input\n".into()),
                ));
            }
            Ok(())
        }

        async fn abort(self: Box<Self>) {}
    }

    fn chunk(s: &str) -> Result<FetchEvent, u32> {
        Ok(FetchEvent::Chunk(s.as_bytes().to_vec()))
    }

    async fn run_collect(task: Task) -> (Result<u64, ItemError>, Vec<TaskEvent>) {
        let mut events = Vec::new();
        let r = task.run(|ev| events.push(ev)).await;
        (r, events)
    }

    #[test]
    fn state_transitions() {
        use TaskState::*;
        assert!(Created.can_advance_to(Fetching));
        assert!(Writing.can_advance_to(Converting));
        assert!(Fetching.can_advance_to(Error));
        assert!(!Created.can_advance_to(Writing));
        assert!(!Finished.can_advance_to(Error));
        assert!(!Error.can_advance_to(Fetching));
    }

    #[tokio::test]
    async fn direct_download_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sub").join("a.bin");
        let fetcher = Scripted::new(vec![
            Ok(FetchEvent::Info { size: Some(8) }),
            chunk("abcd"),
            chunk("efgh"),
            Ok(FetchEvent::Done),
        ]);
        let task = Task::new("u", &file, None, fetcher, Arc::new(Upper { fail: false }));
        assert_eq!(task.state(), TaskState::Created);

        let (r, events) = run_collect(task).await;
        assert_eq!(r, Ok(8));
        assert_eq!(
            events,
            vec![
                TaskEvent::Started { size: Some(8) },
                TaskEvent::Progress { bytes: 4 },
                TaskEvent::Progress { bytes: 4 },
            ]
        );
        assert_eq!(std::fs::read(&file).unwrap(), b"abcdefgh");
        assert!(!storage::temp_path(&file).exists());
    }

    #[tokio::test]
    async fn chunk_before_info_starts_without_size() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Scripted::new(vec![chunk("x"), Ok(FetchEvent::Done)]);
        let task = Task::new(
            "u",
            dir.path().join("x"),
            None,
            fetcher,
            Arc::new(Upper { fail: false }),
        );
        let (r, events) = run_collect(task).await;
        assert_eq!(r, Ok(1));
        assert_eq!(events[0], TaskEvent::Started { size: None });
    }

    #[tokio::test]
    async fn fetch_error_midway_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.bin");
        let fetcher = Scripted::new(vec![
            Ok(FetchEvent::Info { size: Some(10) }),
            chunk("abc"),
            Err(503),
        ]);
        let task = Task::new("u", &file, None, fetcher, Arc::new(Upper { fail: false }));
        let (r, events) = run_collect(task).await;
        assert!(matches!(r, Err(ItemError::Fetch(ref m)) if m.contains("503")));
        assert_eq!(events.len(), 2);
        assert!(!file.exists());
        assert!(!storage::temp_path(&file).exists());
    }

    #[tokio::test]
    async fn refused_fetch_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(Scripted {
            events: Vec::new(),
            refuse: true,
        });
        let task = Task::new(
            "u",
            dir.path().join("a"),
            None,
            fetcher,
            Arc::new(Upper { fail: false }),
        );
        let (r, events) = run_collect(task).await;
        assert!(matches!(r, Err(ItemError::Fetch(_))));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn conversion_goes_through_transcoder() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("song.mp3");
        let fetcher = Scripted::new(vec![
            Ok(FetchEvent::Info { size: None }),
            chunk("la la"),
            Ok(FetchEvent::Done),
        ]);
        let task = Task::new(
            "u",
            &file,
            Some("mp3".into()),
            fetcher,
            Arc::new(Upper { fail: false }),
        );
        let (r, _) = run_collect(task).await;
        assert_eq!(r, Ok(5));
        assert_eq!(std::fs::read(&file).unwrap(), b"LA LA");
        assert!(!storage::convert_temp_path(&file).exists());
    }

    #[tokio::test]
    async fn transcode_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("song.mp3");
        let fetcher = Scripted::new(vec![chunk("junk"), Ok(FetchEvent::Done)]);
        let task = Task::new(
            "u",
            &file,
            Some("mp3".into()),
            fetcher,
            Arc::new(Upper { fail: true }),
        );
        let (r, _) = run_collect(task).await;
        assert_eq!(
            r,
            Err(ItemError::Transcode(
                "exit status: 1: Invalid data found when processing input".into()
            ))
        );
        assert!(!file.exists());
        assert!(!storage::convert_temp_path(&file).exists());
    }

    #[tokio::test]
    async fn empty_body_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.txt");
        let fetcher = Scripted::new(vec![Ok(FetchEvent::Info { size: Some(0) }), Ok(FetchEvent::Done)]);
        let task = Task::new("u", &file, None, fetcher, Arc::new(Upper { fail: false }));
        let (r, events) = run_collect(task).await;
        assert_eq!(r, Ok(0));
        assert_eq!(events, vec![TaskEvent::Started { size: Some(0) }]);
        assert_eq!(std::fs::read(&file).unwrap(), b"");
    }
}
