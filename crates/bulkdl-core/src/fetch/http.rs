//! Direct-link backend: HEAD for metadata, single-stream GET for data.

use async_trait::async_trait;
use std::str;
use std::time::Duration;

use super::head::{self, parse_status_line};
use super::{FetchEvent, FetchSender, FetchStream, Fetcher, Metadata, STREAM_BUFFER};
use crate::config::HttpConfig;
use crate::error::FetchError;
use crate::url_model;

/// Fetches plain HTTP(S) URLs with libcurl.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    config: HttpConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn resolve_metadata(&self, url: &str) -> Result<Metadata, FetchError> {
        let head = tokio::task::spawn_blocking({
            let url = url.to_string();
            let cfg = self.config.clone();
            move || head::probe(&url, &cfg)
        })
        .await
        .map_err(|e| FetchError::Io(std::io::Error::other(e)))??;

        match head.status {
            200..=299 => Ok(Metadata {
                filename: url_model::derive_filename(url, head.content_disposition.as_deref()),
                size: head.content_length,
            }),
            // Some servers refuse HEAD; the URL path still names the file.
            403 | 405 | 501 => {
                tracing::debug!(url, status = head.status, "HEAD rejected, naming from URL");
                Ok(Metadata {
                    filename: url_model::derive_filename(url, None),
                    size: None,
                })
            }
            code => Err(FetchError::Http {
                url: url.to_string(),
                code,
            }),
        }
    }

    async fn begin_fetch(&self, url: &str) -> Result<FetchStream, FetchError> {
        let (tx, stream) = FetchStream::channel(STREAM_BUFFER);
        let url = url.to_string();
        let cfg = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let result = download(&url, &cfg, &tx);
            let terminal = match result {
                Ok(()) => Ok(FetchEvent::Done),
                Err(e) => Err(e),
            };
            let _ = tx.blocking_send(terminal);
        });
        Ok(stream)
    }
}

/// Header state collected while curl runs; reset on every status line.
#[derive(Default)]
struct ResponseState {
    status: u32,
    content_length: Option<u64>,
    info_sent: bool,
}

/// Blocking GET that forwards the body over `tx`. Body bytes of non-2xx
/// responses are discarded. Returns early (Ok) when the receiver is gone.
fn download(url: &str, cfg: &HttpConfig, tx: &FetchSender) -> Result<(), FetchError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))?;
    easy.low_speed_limit(1024)?;
    easy.low_speed_time(Duration::from_secs(cfg.low_speed_time_secs))?;
    if let Some(ua) = &cfg.user_agent {
        easy.useragent(ua)?;
    }

    let state = std::cell::RefCell::new(ResponseState::default());
    let mut receiver_gone = false;

    let performed = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            let Ok(line) = str::from_utf8(data) else {
                return true;
            };
            let line = line.trim();
            let mut st = state.borrow_mut();
            if line.starts_with("HTTP/") {
                st.status = parse_status_line(line).unwrap_or(0);
                st.content_length = None;
            } else if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-length") {
                    st.content_length = value.trim().parse().ok();
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            let mut st = state.borrow_mut();
            if !(200..300).contains(&st.status) {
                return Ok(data.len());
            }
            if !st.info_sent {
                st.info_sent = true;
                let info = FetchEvent::Info {
                    size: st.content_length,
                };
                if tx.blocking_send(Ok(info)).is_err() {
                    receiver_gone = true;
                    return Ok(0);
                }
            }
            if tx.blocking_send(Ok(FetchEvent::Chunk(data.to_vec()))).is_err() {
                // Returning a short count aborts the transfer.
                receiver_gone = true;
                return Ok(0);
            }
            Ok(data.len())
        })?;
        transfer.perform()
    };

    if receiver_gone {
        tracing::debug!(url, "fetch receiver dropped, transfer aborted");
        return Ok(());
    }
    performed?;

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http {
            url: url.to_string(),
            code,
        });
    }

    // Empty body: the info event was never sent from the write callback.
    let st = state.into_inner();
    if !st.info_sent {
        let _ = tx.blocking_send(Ok(FetchEvent::Info {
            size: st.content_length,
        }));
    }
    Ok(())
}
