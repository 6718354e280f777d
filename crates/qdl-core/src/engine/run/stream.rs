//! Driver for stream tasks.
//!
//! A stream task starts from a page URL. The external resolver turns it
//! into direct media URLs during the metadata phase; each resolved item
//! then downloads like a plain single-connection transfer (media hosts
//! rarely honor ranges on fresh session URLs).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::conflict::{resolve_destination, Resolution};
use crate::engine::EngineInner;
use crate::naming;
use crate::retry::TransferError;
use crate::storage::{self, PartFileBuilder};
use crate::stream::ResolvedMedia;
use crate::task::{TaskId, TaskKind, TaskStatus};
use crate::worker::{self, RunOptions};

use super::{base_headers, internal, storage_err};

pub(super) async fn run(
    inner: &Arc<EngineInner>,
    id: TaskId,
    abort: &Arc<AtomicBool>,
) -> Result<(), TransferError> {
    let Some(task) = inner.get_task(id).await else {
        return Ok(());
    };
    let dir = PathBuf::from(&task.download_dir);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(TransferError::Storage)?;

    if !inner.transition(id, TaskStatus::Connecting).await.map_err(internal)? {
        return Ok(());
    }
    if !inner
        .transition(id, TaskStatus::DownloadingMetadata)
        .await
        .map_err(internal)?
    {
        return Ok(());
    }

    // Resolve the page into media URLs, unless a prior run already did.
    let media = match &task.kind {
        TaskKind::Stream { media } if !media.is_empty() => media.clone(),
        _ => {
            let resolver = Arc::clone(&inner.stream_resolver);
            let page = task.source.clone();
            let resolved =
                tokio::task::spawn_blocking(move || resolver.resolve(&page))
                    .await
                    .map_err(|e| TransferError::BadMetadata(format!("resolver task failed: {e}")))??;
            if resolved.is_empty() {
                return Err(TransferError::BadMetadata(
                    "resolver returned no media".to_string(),
                ));
            }
            inner
                .with_task(id, |t| {
                    t.kind = TaskKind::Stream {
                        media: resolved.clone(),
                    };
                    true
                })
                .await
                .map_err(internal)?;
            resolved
        }
    };

    if !inner.transition(id, TaskStatus::Downloading).await.map_err(internal)? {
        return Ok(());
    }
    inner
        .with_task(id, |t| {
            t.external_bytes = 0;
            true
        })
        .await
        .map_err(internal)?;

    let stall_timeout = {
        let cfg = inner.config.read().await;
        Duration::from_secs(cfg.stall_timeout_secs.max(1))
    };
    let mut total_received = 0u64;
    let mut first_name: Option<String> = None;

    for item in &media {
        if abort.load(Ordering::Relaxed) {
            return Err(TransferError::Aborted);
        }
        match download_media(inner, id, &task, item, &dir, stall_timeout, abort).await? {
            Some((name, received)) => {
                total_received += received;
                if first_name.is_none() {
                    first_name = Some(name);
                }
                inner
                    .with_task(id, |t| {
                        t.external_bytes = total_received;
                        true
                    })
                    .await
                    .map_err(internal)?;
            }
            None => {
                tracing::info!(id, url = %item.url, "media item skipped (conflict)");
            }
        }
    }

    if !inner.transition(id, TaskStatus::Finishing).await.map_err(internal)? {
        return Ok(());
    }
    inner
        .with_task(id, |t| {
            if t.status.can_transition(TaskStatus::Complete) {
                t.status = TaskStatus::Complete;
            }
            t.final_filename = first_name.clone();
            t.total_size = Some(total_received);
            t.force_start = false;
            t.clear_error();
            true
        })
        .await
        .map_err(internal)?;
    tracing::info!(id, items = media.len(), "stream download complete");
    Ok(())
}

/// Download one resolved media item; None when the conflict decision
/// skipped it.
async fn download_media(
    inner: &Arc<EngineInner>,
    id: TaskId,
    task: &crate::task::Task,
    item: &ResolvedMedia,
    dir: &std::path::Path,
    stall_timeout: Duration,
    abort: &Arc<AtomicBool>,
) -> Result<Option<(String, u64)>, TransferError> {
    let candidate = item
        .filename
        .clone()
        .unwrap_or_else(|| naming::derive_filename(&item.url, None));
    let resolution = resolve_destination(dir, &candidate, &[], inner.conflict_resolver.as_ref());
    let (filename, _overwrite) = match resolution {
        Resolution::Skip => return Ok(None),
        Resolution::Proceed {
            filename,
            overwrite,
        } => (filename, overwrite),
    };

    // The page referrer plus whatever the resolver says the host wants.
    let mut headers = base_headers(task);
    headers
        .entry("Referer".to_string())
        .or_insert_with(|| task.source.clone());
    for (k, v) in &item.headers {
        headers.insert(k.clone(), v.clone());
    }

    let final_path = dir.join(&filename);
    let part_path = storage::part_path(&final_path);
    let builder = PartFileBuilder::create(&part_path).map_err(storage_err)?;
    let part = builder.build();

    // Byte deltas keep the snapshot moving while the item transfers;
    // the caller overwrites the running total once the item is done.
    let (delta_tx, mut delta_rx) = tokio::sync::mpsc::channel::<u64>(8);
    let progress_inner = Arc::clone(inner);
    let progress_handle = tokio::spawn(async move {
        while let Some(delta) = delta_rx.recv().await {
            progress_inner.record_speed(id, delta);
            let mut tasks = progress_inner.tasks.lock().await;
            if let Some(t) = tasks.iter_mut().find(|t| t.id == id) {
                t.external_bytes += delta;
                progress_inner.emit_task(t);
            }
        }
    });

    let received = {
        let url = item.url.clone();
        let part = part.clone();
        let abort = Arc::clone(abort);
        let opts = RunOptions {
            max_workers: 1,
            retry_policy: None,
            stall_timeout,
        };
        let tx = delta_tx.clone();
        tokio::task::spawn_blocking(move || {
            worker::run_unsized(&url, &headers, &part, &opts, abort, Some(&tx))
        })
        .await
        .map_err(|e| TransferError::BadMetadata(format!("transfer task failed: {e}")))?
    };
    drop(delta_tx);
    let _ = progress_handle.await;
    let received = received?;

    part.sync().map_err(storage_err)?;
    let fp = final_path.clone();
    tokio::task::spawn_blocking(move || part.finalize(&fp))
        .await
        .map_err(|e| TransferError::BadMetadata(format!("finalize task failed: {e}")))?
        .map_err(storage_err)?;
    tracing::debug!(id, file = %final_path.display(), received, "media item saved");
    Ok(Some((filename, received)))
}
