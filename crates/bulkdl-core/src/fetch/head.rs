//! HTTP HEAD probing for direct links.
//!
//! Uses libcurl to read `Content-Length` and `Content-Disposition` so a
//! default file name and size hint are known before the GET starts.

use std::str;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::FetchError;

/// Headers of interest from a HEAD response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    /// HTTP status of the final response (after redirects).
    pub status: u32,
    pub content_length: Option<u64>,
    /// Raw `Content-Disposition` value (filename hint).
    pub content_disposition: Option<String>,
}

/// Performs a HEAD request, following redirects.
///
/// Blocking; call from `spawn_blocking` in async code. A non-2xx status is
/// returned in [`HeadResult::status`] rather than as an error so the caller
/// can fall back for servers that reject HEAD.
pub fn probe(url: &str, cfg: &HttpConfig) -> Result<HeadResult, FetchError> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.nobody(true)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))?;
    easy.timeout(Duration::from_secs(cfg.connect_timeout_secs * 2))?;
    if let Some(ua) = &cfg.user_agent {
        easy.useragent(ua)?;
    }

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform()?;
    }

    let mut head = parse_headers(&lines);
    head.status = easy.response_code()?;
    Ok(head)
}

/// Parses header lines. With redirects several header blocks arrive; each
/// status line resets what was collected so the final response wins.
pub(crate) fn parse_headers(lines: &[String]) -> HeadResult {
    let mut head = HeadResult::default();

    for line in lines.iter().map(|l| l.trim()) {
        if line.starts_with("HTTP/") {
            head = HeadResult {
                status: parse_status_line(line).unwrap_or(0),
                ..HeadResult::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            head.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("content-disposition") {
            head.content_disposition = Some(value.to_string());
        }
    }

    head
}

/// Status code from a line like `HTTP/1.1 404 Not Found`.
pub(crate) fn parse_status_line(line: &str) -> Option<u32> {
    line.split_whitespace().nth(1)?.parse().ok()
}
