//! Driver for direct (HTTP/FTP) downloads.
//!
//! Preparing: probe the server, derive and reserve the destination
//! filename, resolve conflicts. Connecting: open or create the partial
//! file. Downloading: run the segmented worker pool. Finishing: sync,
//! verify, atomic rename.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::conflict::{resolve_destination, Resolution};
use crate::engine::EngineInner;
use crate::fetch_head;
use crate::naming;
use crate::retry::TransferError;
use crate::segment::SegmentTable;
use crate::storage::{self, PartFile, PartFileBuilder};
use crate::task::{TaskId, TaskStatus};
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
    let headers = base_headers(&task);
    let dir = PathBuf::from(&task.download_dir);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(TransferError::Storage)?;

    // Preparing: ask the server what we are dealing with.
    let probe = {
        let url = task.source.clone();
        let headers = headers.clone();
        tokio::task::spawn_blocking(move || fetch_head::probe(&url, &headers))
            .await
            .map_err(|e| TransferError::BadMetadata(format!("probe task failed: {e}")))??
    };
    if abort.load(Ordering::Relaxed) {
        return Err(TransferError::Aborted);
    }

    // Destination resolution. A resumed task keeps its reserved name.
    if task.final_filename.is_none() {
        let candidate =
            naming::derive_filename(&task.source, probe.content_disposition.as_deref());
        if !prepare_destination(inner, id, &dir, &candidate).await? {
            return Ok(()); // skipped
        }
    }
    if !inner
        .transition(id, TaskStatus::Connecting)
        .await
        .map_err(internal)?
    {
        // Paused or canceled between phases.
        return Ok(());
    }

    let task = inner.get_task(id).await.ok_or(TransferError::Aborted)?;
    let final_name = task.final_filename.clone().unwrap_or_default();
    let final_path = dir.join(&final_name);
    let part_path = storage::part_path(&final_path);

    match probe.content_length {
        Some(0) => {
            // Zero-byte resource: nothing to transfer.
            inner
                .with_task(id, |t| {
                    t.total_size = Some(0);
                    true
                })
                .await
                .map_err(internal)?;
            if !inner
                .transition(id, TaskStatus::Downloading)
                .await
                .map_err(internal)?
            {
                return Ok(());
            }
            let builder = PartFileBuilder::create(&part_path).map_err(storage_err)?;
            let part = builder.build();
            finish(inner, id, part, &final_path).await
        }
        Some(total) if probe.accept_ranges => {
            run_segmented(inner, id, abort, total, &part_path, &final_path, headers).await
        }
        _ => run_unsized(inner, id, abort, &part_path, &final_path, headers).await,
    }
}

/// Reserve a destination name for the task, consulting the conflict
/// resolver. Returns false when the decision was Skip.
async fn prepare_destination(
    inner: &Arc<EngineInner>,
    id: TaskId,
    dir: &Path,
    candidate: &str,
) -> Result<bool, TransferError> {
    let reserved: Vec<String> = {
        let tasks = inner.tasks.lock().await;
        tasks
            .iter()
            .filter(|t| t.id != id && t.download_dir == dir.to_string_lossy())
            .filter_map(|t| t.final_filename.clone())
            .collect()
    };
    let resolution =
        resolve_destination(dir, candidate, &reserved, inner.conflict_resolver.as_ref());
    match resolution {
        Resolution::Skip => {
            inner
                .with_task(id, |t| {
                    if t.status.can_transition(TaskStatus::Skipped) {
                        t.status = TaskStatus::Skipped;
                    }
                    true
                })
                .await
                .map_err(internal)?;
            tracing::info!(id, candidate, "destination conflict, task skipped");
            Ok(false)
        }
        Resolution::Proceed {
            filename,
            overwrite,
        } => {
            inner
                .with_task(id, |t| {
                    t.temp_filename = Some(format!("{}{}", filename, storage::PART_SUFFIX));
                    t.final_filename = Some(filename);
                    t.overwrite = overwrite;
                    true
                })
                .await
                .map_err(internal)?;
            Ok(true)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_segmented(
    inner: &Arc<EngineInner>,
    id: TaskId,
    abort: &Arc<AtomicBool>,
    total: u64,
    part_path: &Path,
    final_path: &Path,
    headers: std::collections::HashMap<String, String>,
) -> Result<(), TransferError> {
    let cfg = inner.config.read().await.clone();

    // Plan or resume the segment table. A size change means the remote
    // file changed; prior progress is worthless.
    inner
        .with_task(id, |t| {
            let resumable = !t.segments.is_empty()
                && t.segments.total() == total
                && part_path.exists();
            if resumable {
                if let Some(n) = t.pending_segment_count.take() {
                    t.segments.resplit_remaining(n);
                }
                t.segments.release_workers();
            } else {
                let count = t
                    .pending_segment_count
                    .take()
                    .unwrap_or(cfg.segment_count);
                t.segments = SegmentTable::plan(total, cfg.clamp_segments(count));
            }
            t.total_size = Some(total);
            true
        })
        .await
        .map_err(internal)?;

    let part = if part_path.exists() {
        PartFile::open_existing(part_path).map_err(storage_err)?
    } else {
        let mut builder = PartFileBuilder::create(part_path).map_err(storage_err)?;
        builder.preallocate(total).map_err(storage_err)?;
        builder.build()
    };

    if !inner
        .transition(id, TaskStatus::Downloading)
        .await
        .map_err(internal)?
    {
        return Ok(());
    }

    let task = inner.get_task(id).await.ok_or(TransferError::Aborted)?;
    let mut table = task.segments.clone();
    let opts = RunOptions {
        max_workers: table.len().max(1),
        retry_policy: Some(cfg.retry_policy()),
        stall_timeout: Duration::from_secs(cfg.stall_timeout_secs.max(1)),
    };

    // Progress bridge: coalesced table snapshots from the blocking pool
    // are persisted and folded back into the live task.
    let (snap_tx, mut snap_rx) = tokio::sync::mpsc::channel::<SegmentTable>(8);
    let progress_inner = Arc::clone(inner);
    let progress_handle = tokio::spawn(async move {
        let mut last_bytes = 0u64;
        while let Some(snapshot) = snap_rx.recv().await {
            let bytes = snapshot.bytes_done();
            if bytes > last_bytes {
                progress_inner.record_speed(id, bytes - last_bytes);
                last_bytes = bytes;
            }
            if progress_inner.db.save_segments(id, &snapshot).await.is_err() {
                tracing::warn!(id, "durable progress update failed");
            }
            let mut tasks = progress_inner.tasks.lock().await;
            if let Some(t) = tasks.iter_mut().find(|t| t.id == id) {
                t.segments = snapshot;
                progress_inner.emit_task(t);
            }
        }
    });

    let (table, result) = {
        let url = task.source.clone();
        let part = part.clone();
        let abort = Arc::clone(abort);
        let tx = snap_tx.clone();
        tokio::task::spawn_blocking(move || {
            let res = worker::run_segments(
                &url,
                &headers,
                &part,
                &mut table,
                &opts,
                abort,
                Some(&tx),
            );
            (table, res)
        })
        .await
        .map_err(|e| TransferError::BadMetadata(format!("transfer task failed: {e}")))?
    };
    drop(snap_tx);
    let _ = progress_handle.await;

    // The table now reflects exactly what is on disk; persist it before
    // deciding what the outcome means.
    inner
        .with_task(id, |t| {
            t.segments = table;
            true
        })
        .await
        .map_err(internal)?;

    result?;
    finish(inner, id, part, final_path).await
}

async fn run_unsized(
    inner: &Arc<EngineInner>,
    id: TaskId,
    abort: &Arc<AtomicBool>,
    part_path: &Path,
    final_path: &Path,
    headers: std::collections::HashMap<String, String>,
) -> Result<(), TransferError> {
    let cfg = inner.config.read().await.clone();
    let builder = PartFileBuilder::create(part_path).map_err(storage_err)?;
    let part = builder.build();

    if !inner
        .transition(id, TaskStatus::Downloading)
        .await
        .map_err(internal)?
    {
        return Ok(());
    }
    tracing::debug!(id, "size or range support unknown, single-connection transfer");

    // The part file was just recreated, so any prior count is stale.
    inner
        .with_task(id, |t| {
            t.external_bytes = 0;
            true
        })
        .await
        .map_err(internal)?;

    let task = inner.get_task(id).await.ok_or(TransferError::Aborted)?;
    let opts = RunOptions {
        max_workers: 1,
        retry_policy: None, // a retry cannot resume without ranges
        stall_timeout: Duration::from_secs(cfg.stall_timeout_secs.max(1)),
    };

    // Progress bridge: byte deltas feed the speed meter and the live
    // task so snapshots move even without a segment table.
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
        let url = task.source.clone();
        let part = part.clone();
        let abort = Arc::clone(abort);
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

    inner
        .with_task(id, |t| {
            t.total_size = Some(received);
            t.external_bytes = received;
            true
        })
        .await
        .map_err(internal)?;
    finish(inner, id, part, final_path).await
}

/// Finishing phase: flush to disk, verify the checksum when one was
/// supplied, atomically rename into place, and mark Complete.
async fn finish(
    inner: &Arc<EngineInner>,
    id: TaskId,
    part: PartFile,
    final_path: &Path,
) -> Result<(), TransferError> {
    if !inner
        .transition(id, TaskStatus::Finishing)
        .await
        .map_err(internal)?
    {
        return Ok(());
    }

    let task = inner.get_task(id).await.ok_or(TransferError::Aborted)?;
    part.sync().map_err(storage_err)?;

    if let Some(expected) = task.checksum_sha256.clone() {
        let path = part.part_path().to_path_buf();
        let ok = tokio::task::spawn_blocking(move || crate::checksum::verify_sha256(&path, &expected))
            .await
            .map_err(|e| TransferError::BadMetadata(format!("checksum task failed: {e}")))?
            .map_err(storage_err)?;
        if !ok {
            return Err(TransferError::Storage(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "checksum mismatch",
            )));
        }
    }

    let final_path = final_path.to_path_buf();
    tokio::task::spawn_blocking(move || part.finalize(&final_path))
        .await
        .map_err(|e| TransferError::BadMetadata(format!("finalize task failed: {e}")))?
        .map_err(storage_err)?;

    inner
        .with_task(id, |t| {
            if t.status.can_transition(TaskStatus::Complete) {
                t.status = TaskStatus::Complete;
            }
            t.temp_filename = None;
            t.force_start = false;
            t.clear_error();
            true
        })
        .await
        .map_err(internal)?;
    tracing::info!(id, "download complete");
    Ok(())
}
