//! Worker loop: claim, process, repeat.

use std::path::PathBuf;
use std::sync::Arc;

use super::shared::Shared;
use crate::error::ItemError;
use crate::task::{Task, TaskContext, TaskEvent};

pub(super) async fn run_worker(shared: Arc<Shared>, slot: usize) {
    tracing::debug!(slot, "worker started");
    let mut processed = 0usize;
    while let Some(index) = shared.claim_next() {
        process_item(&shared, slot, index).await;
        processed += 1;
    }
    tracing::debug!(slot, processed, "worker retired");
}

async fn process_item(shared: &Shared, slot: usize, index: usize) {
    let (url, output) = shared.with_item(index, |item| {
        item.assigned_worker = Some(slot);
        (item.url.clone(), item.output.clone())
    });

    if output.is_none() {
        match shared.backends.fetcher.resolve_metadata(&url).await {
            Ok(meta) => {
                tracing::debug!(slot, index, url = %url, filename = %meta.filename, "resolved output name");
                shared.with_item(index, |item| item.output = Some(PathBuf::from(meta.filename)));
            }
            Err(e) => {
                tracing::warn!(slot, index, url = %url, error = %e, "metadata lookup failed");
                shared.complete(index, Err(ItemError::Metadata(e.to_string())));
                return;
            }
        }
    }

    let resolved = shared.with_item(index, |item| {
        let file = item.resolve_file(&shared.cwd)?.to_path_buf();
        Some((file, item.convert.clone(), item.title()))
    });
    let Some((file, convert, title)) = resolved else {
        shared.complete(index, Err(ItemError::Metadata("no output name".into())));
        return;
    };

    if !shared.overwrite {
        match tokio::fs::try_exists(&file).await {
            Ok(true) => {
                tracing::info!(slot, index, file = %file.display(), "already exists, skipping");
                shared.complete(index, Ok(()));
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "cannot check destination, downloading");
            }
        }
    }

    tracing::info!(slot, index, url = %url, file = %file.display(), "downloading");
    let ctx = TaskContext { slot, index, title };
    let task = Task::new(
        url,
        file,
        convert,
        Arc::clone(&shared.backends.fetcher),
        Arc::clone(&shared.backends.transcoder),
    );

    let mut started = false;
    let outcome = task
        .run(|event| {
            if matches!(event, TaskEvent::Started { .. }) {
                started = true;
            }
            shared.on_task_event(&ctx, event);
        })
        .await;

    if started {
        shared.progress.item_finished(slot);
    }
    if let Err(e) = &outcome {
        tracing::warn!(slot, index, error = %e, "item failed");
    }
    shared.complete(index, outcome.map(|_| ()));
}
