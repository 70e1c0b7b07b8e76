//! FFmpeg-based transcoder reading from stdin.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use super::{TranscodeSession, Transcoder};
use crate::config::FfmpegConfig;
use crate::error::TranscodeError;
use crate::process::{read_tail, STDERR_TAIL_BYTES};

/// Pipes fetched bytes into `ffmpeg -i pipe:0`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    config: FfmpegConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    /// Builds ffmpeg arguments; the container follows the output extension.
    pub fn build_args(&self, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-i".to_string(),
            "pipe:0".to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(output.to_string_lossy().to_string());
        args
    }

    fn not_found_or_io(&self, e: std::io::Error) -> TranscodeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            TranscodeError::NotFound {
                path: self.config.path.clone(),
            }
        } else {
            TranscodeError::Io(e)
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn start(
        &self,
        format: &str,
        output: &Path,
    ) -> Result<Box<dyn TranscodeSession>, TranscodeError> {
        let args = self.build_args(output);
        tracing::debug!(format, output = %output.display(), ?args, "starting ffmpeg");

        let mut child = Command::new(&self.config.path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.not_found_or_io(e))?;

        let stdin = child.stdin.take();
        let stderr = child
            .stderr
            .take()
            .map(|s| tokio::spawn(read_tail(s, STDERR_TAIL_BYTES)));

        Ok(Box::new(FfmpegSession {
            child,
            stdin,
            stderr,
            output: output.to_path_buf(),
        }))
    }

    async fn validate(&self) -> Result<(), TranscodeError> {
        let out = Command::new(&self.config.path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.not_found_or_io(e))?;
        if !out.status.success() {
            return Err(TranscodeError::conversion_failed(
                format!("ffmpeg -version exited with {}", out.status),
                Some(String::from_utf8_lossy(&out.stderr).into_owned()),
            ));
        }
        Ok(())
    }
}

struct FfmpegSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    output: PathBuf,
}

impl FfmpegSession {
    async fn stderr_tail(&mut self) -> Option<String> {
        let handle = self.stderr.take()?;
        handle.await.ok().filter(|s| !s.is_empty())
    }

    /// Waits for exit and turns a non-zero status into an error.
    async fn wait(mut self) -> Result<(), TranscodeError> {
        drop(self.stdin.take());
        let status = self.child.wait().await?;
        let stderr = self.stderr_tail().await;
        if status.success() {
            return Ok(());
        }
        Err(TranscodeError::conversion_failed(
            format!("ffmpeg exited with {status} writing {}", self.output.display()),
            stderr,
        ))
    }
}

#[async_trait]
impl TranscodeSession for FfmpegSession {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), TranscodeError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TranscodeError::conversion_failed("input already closed", None));
        };
        if let Err(e) = stdin.write_all(chunk).await {
            // ffmpeg stopped reading; its exit status and stderr say why.
            tracing::debug!(error = %e, "write to ffmpeg failed");
            drop(self.stdin.take());
            let status = self.child.wait().await?;
            let stderr = self.stderr_tail().await;
            return Err(TranscodeError::conversion_failed(
                format!("ffmpeg stopped reading input ({status})"),
                stderr,
            ));
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), TranscodeError> {
        (*self).wait().await
    }

    async fn abort(self: Box<Self>) {
        let mut this = *self;
        drop(this.stdin.take());
        let _ = this.child.start_kill();
        let _ = this.child.wait().await;
        if let Some(stderr) = this.stderr.take() {
            stderr.abort();
        }
    }
}
