//! Destination file lifecycle.
//!
//! Output is streamed into a temp sibling and atomically renamed onto the
//! final name once complete, so an interrupted or failed item never leaves a
//! file that a later run would mistake for finished work.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Temporary file marker used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Temp path for a direct download: appends `.part` (`clip.mp4` → `clip.mp4.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Temp path for a converted output. The extension stays last so the
/// converter still picks the container from it (`song.mp3` → `song.part.mp3`).
pub fn convert_temp_path(final_path: &Path) -> PathBuf {
    let Some(ext) = final_path.extension() else {
        return temp_path(final_path);
    };
    let stem = final_path.file_stem().unwrap_or_default();
    let mut name = OsString::from(stem);
    name.push(TEMP_SUFFIX);
    name.push(".");
    name.push(ext);
    final_path.with_file_name(name)
}

/// Creates the parent directory of `path` if needed.
pub async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Removes a leftover temp file; a missing file is not an error.
pub async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove temp file"),
    }
}

/// Atomically moves a finished temp file onto `final_path`.
pub async fn promote(temp_path: &Path, final_path: &Path) -> Result<()> {
    tokio::fs::rename(temp_path, final_path)
        .await
        .with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })
}

/// Sequential writer for a direct (unconverted) download.
pub struct StorageWriter {
    file: BufWriter<File>,
    temp_path: PathBuf,
    written: u64,
}

impl StorageWriter {
    /// Creates (truncating) the temp file for `final_path`, making parent
    /// directories as needed.
    pub async fn create(final_path: &Path) -> Result<Self> {
        ensure_parent(final_path).await?;
        let temp_path = temp_path(final_path);
        let file = File::create(&temp_path)
            .await
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        Ok(Self {
            file: BufWriter::new(file),
            temp_path,
            written: 0,
        })
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .await
            .with_context(|| format!("write to {} failed", self.temp_path.display()))?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flushes, syncs and renames onto `final_path`. Consumes the writer.
    pub async fn finalize(mut self, final_path: &Path) -> Result<()> {
        self.file.flush().await.context("storage flush failed")?;
        self.file
            .get_ref()
            .sync_all()
            .await
            .context("storage sync failed")?;
        drop(self.file);
        promote(&self.temp_path, final_path).await
    }

    /// Drops the writer and deletes the temp file.
    pub async fn abandon(self) {
        drop(self.file);
        discard(&self.temp_path).await;
    }
}
