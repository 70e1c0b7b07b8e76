//! yt-dlp backend for media sites.
//!
//! Metadata comes from `yt-dlp -J`; data is streamed from `yt-dlp -o -`.
//! Metadata is cached per URL so a name lookup followed by a fetch of the
//! same URL reuses the size hint.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::{FetchEvent, FetchStream, Fetcher, Metadata, STREAM_BUFFER};
use crate::config::YtDlpConfig;
use crate::error::FetchError;
use crate::process::{last_line, read_tail, STDERR_TAIL_BYTES};
use crate::url_model;

const CHUNK_SIZE: usize = 64 * 1024;

/// Fields of yt-dlp's info JSON that we use.
#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(rename = "_filename")]
    filename: Option<String>,
    title: Option<String>,
    id: Option<String>,
    ext: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

/// Parses `yt-dlp -J` output into [`Metadata`].
///
/// The name is `_filename` when present (reduced to its last component),
/// else `title.ext`, else `id.ext`.
pub fn parse_info_json(data: &[u8]) -> Result<Metadata, FetchError> {
    let info: InfoJson =
        serde_json::from_slice(data).map_err(|e| FetchError::Metadata(e.to_string()))?;

    let from_filename = info.filename.as_deref().and_then(|f| {
        Path::new(f)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    });
    let from_title = || {
        let base = info.title.as_deref().or(info.id.as_deref())?;
        Some(match info.ext.as_deref() {
            Some(ext) => format!("{base}.{ext}"),
            None => base.to_string(),
        })
    };

    let filename = from_filename
        .or_else(from_title)
        .as_deref()
        .and_then(url_model::safe_name)
        .ok_or_else(|| FetchError::Metadata("no filename, title or id in info JSON".into()))?;

    let size = info
        .filesize
        .or(info.filesize_approx)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| s.round() as u64);

    Ok(Metadata { filename, size })
}

/// Runs the `yt-dlp` executable.
#[derive(Debug)]
pub struct YtDlpFetcher {
    config: YtDlpConfig,
    cache: Mutex<HashMap<String, Metadata>>,
}

impl YtDlpFetcher {
    pub fn new(config: YtDlpConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn program(&self) -> String {
        self.config.path.to_string_lossy().into_owned()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.path);
        cmd.arg("--no-playlist");
        if let Some(format) = &self.config.format {
            cmd.args(["-f", format.as_str()]);
        }
        cmd.args(&self.config.extra_args);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    fn cached(&self, url: &str) -> Option<Metadata> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    fn spawn_error(&self, source: std::io::Error) -> FetchError {
        FetchError::Spawn {
            program: self.program(),
            source,
        }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn resolve_metadata(&self, url: &str) -> Result<Metadata, FetchError> {
        if let Some(meta) = self.cached(url) {
            return Ok(meta);
        }

        let output = self
            .command()
            .arg("-J")
            .arg(url)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Process {
                program: self.program(),
                status: output.status.to_string(),
                stderr: last_line(&stderr).to_string(),
            });
        }

        let meta = parse_info_json(&output.stdout)?;
        tracing::debug!(url, filename = %meta.filename, size = ?meta.size, "resolved metadata");
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), meta.clone());
        Ok(meta)
    }

    async fn begin_fetch(&self, url: &str) -> Result<FetchStream, FetchError> {
        let size = self.cached(url).and_then(|m| m.size);
        let mut child = self
            .command()
            .args(["-q", "--no-warnings", "--no-part", "-o", "-"])
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (mut stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(o), Some(e)) => (o, e),
            _ => return Err(FetchError::Disconnected),
        };

        let (tx, stream) = FetchStream::channel(STREAM_BUFFER);
        let program = self.program();
        let url = url.to_string();
        tokio::spawn(async move {
            let stderr_task = tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES));
            if tx.send(Ok(FetchEvent::Info { size })).await.is_err() {
                return;
            }

            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(FetchEvent::Chunk(buf[..n].to_vec()))).await.is_err() {
                            tracing::debug!(url = %url, "fetch receiver dropped, stopping yt-dlp");
                            let _ = child.start_kill();
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = child.start_kill();
                        let _ = tx.send(Err(FetchError::Io(e))).await;
                        return;
                    }
                }
            }

            let status = child.wait().await;
            let stderr = stderr_task.await.unwrap_or_default();
            let terminal = match status {
                Ok(s) if s.success() => Ok(FetchEvent::Done),
                Ok(s) => Err(FetchError::Process {
                    program,
                    status: s.to_string(),
                    stderr: last_line(&stderr).to_string(),
                }),
                Err(e) => Err(FetchError::Io(e)),
            };
            let _ = tx.send(terminal).await;
        });

        Ok(stream)
    }
}
