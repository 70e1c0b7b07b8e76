//! Default command: build the job list, run it, print a summary.

use anyhow::{bail, Context, Result};
use bulkdl_core::config::BulkConfig;
use bulkdl_core::{jobs, Backends, BulkDownload, RawJob};
use indicatif::DecimalBytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::progress::TerminalProgress;
use crate::cli::DownloadArgs;

/// Returns whether every item succeeded.
pub async fn run_download(args: DownloadArgs, mut cfg: BulkConfig) -> Result<bool> {
    let jobs = collect_jobs(&args)?;
    if let Some(backend) = args.backend {
        cfg.backend = backend.into();
    }
    let workers = args.workers.unwrap_or(cfg.workers);
    let overwrite = args.overwrite || cfg.overwrite;
    let cwd = args.cwd.clone().unwrap_or_else(|| PathBuf::from("."));

    let backends = Backends::from_config(&cfg);
    if jobs.iter().any(|j| j.convert.is_some()) {
        backends
            .transcoder
            .validate()
            .await
            .with_context(|| format!("{} is needed for conversion", backends.transcoder.name()))?;
    }

    let mut bulk = BulkDownload::new(jobs, workers, &cwd, backends)?.with_overwrite(overwrite);
    if !args.no_progress {
        let total = bulk.len();
        let slots = workers.min(total);
        bulk = bulk.with_progress(Arc::new(TerminalProgress::new(total, slots)));
    }

    let started = Instant::now();
    let bulk = bulk.execute().await.context("download run aborted")?;
    print!("{}", summary(&bulk, started.elapsed()));

    let errors = bulk.extract_errors();
    tracing::info!(
        items = bulk.len(),
        failed = errors.len(),
        total_bytes = bulk.total_bytes(),
        "run finished"
    );
    Ok(errors.is_empty())
}

/// Jobs from the positional URL, `--json` or `--list`.
pub fn collect_jobs(args: &DownloadArgs) -> Result<Vec<RawJob>> {
    if let Some(url) = &args.url {
        return Ok(vec![jobs::single(
            url,
            args.target.clone(),
            args.convert.as_deref(),
        )]);
    }
    let mut batch = match (&args.json, &args.list) {
        (Some(path), _) => jobs::read_json(path)?,
        (None, Some(path)) => jobs::read_list(path)?,
        (None, None) => bail!("nothing to download: give a URL, --json FILE or --list FILE"),
    };
    if let Some(format) = &args.convert {
        jobs::apply_default_convert(&mut batch, format);
    }
    Ok(batch)
}

/// Final report: one line of totals plus one line per failed item.
pub fn summary(bulk: &BulkDownload, elapsed: Duration) -> String {
    let errors = bulk.extract_errors();
    let mut out = format!(
        "{} of {} item(s) succeeded, {} transferred in {:.1}s\n",
        bulk.completed().saturating_sub(errors.len()),
        bulk.len(),
        DecimalBytes(bulk.total_bytes()),
        elapsed.as_secs_f64()
    );
    for item in &errors {
        if let Some(e) = &item.error {
            out.push_str(&format!("  failed: {}: {}\n", item.url, e));
        }
    }
    out
}
