//! Transcode backends.
//!
//! A [`Transcoder`] starts a [`TranscodeSession`] that consumes fetched bytes
//! and produces the converted file. The session reports failure from
//! `write` (converter stopped reading) or `finish` (non-zero exit).

mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

use async_trait::async_trait;
use std::path::Path;

use crate::error::TranscodeError;

/// Converter that can be fed a byte stream.
#[async_trait]
pub trait Transcoder: Send + Sync {
    fn name(&self) -> &str;

    /// Starts converting into `output` with target container/codec `format`.
    async fn start(
        &self,
        format: &str,
        output: &Path,
    ) -> Result<Box<dyn TranscodeSession>, TranscodeError>;

    /// Checks the converter is usable.
    async fn validate(&self) -> Result<(), TranscodeError> {
        Ok(())
    }
}

/// One running conversion.
#[async_trait]
pub trait TranscodeSession: Send {
    /// Feeds the next chunk of input.
    async fn write(&mut self, chunk: &[u8]) -> Result<(), TranscodeError>;

    /// Ends input and waits for the converter to finish the output.
    async fn finish(self: Box<Self>) -> Result<(), TranscodeError>;

    /// Stops the converter without producing output.
    async fn abort(self: Box<Self>);
}
