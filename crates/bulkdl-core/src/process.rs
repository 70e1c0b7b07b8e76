//! Helpers for external tool subprocesses (yt-dlp, ffmpeg).

use tokio::io::{AsyncRead, AsyncReadExt};

/// How much stderr to keep from a child process for error messages.
pub(crate) const STDERR_TAIL_BYTES: usize = 4096;

/// Reads `reader` to the end, keeping only the last `limit` bytes.
pub(crate) async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > limit {
                    let cut = tail.len() - limit;
                    tail.drain(..cut);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).trim().to_string()
}

/// Last non-empty line of `text`, or `text` itself when it has none.
pub(crate) fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(text)
}
