//! Driver for torrent tasks.
//!
//! The engine never implements the wire protocol; it registers the
//! source with the external backend, keeps only a weak session handle,
//! and polls backend progress into the task record, mapping the
//! backend's state vocabulary onto the task state machine.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::EngineInner;
use crate::retry::TransferError;
use crate::task::{TaskId, TaskKind, TaskStatus};
use crate::torrent::{decode_priorities, TorrentState};

use super::internal;

pub(super) async fn run(
    inner: &Arc<EngineInner>,
    id: TaskId,
    abort: &Arc<AtomicBool>,
) -> Result<(), TransferError> {
    let Some(task) = inner.get_task(id).await else {
        return Ok(());
    };
    let priorities = match &task.kind {
        TaskKind::Torrent {
            file_priorities, ..
        } => file_priorities.clone(),
        _ => None,
    };

    tokio::fs::create_dir_all(&task.download_dir)
        .await
        .map_err(TransferError::Storage)?;
    if !inner.transition(id, TaskStatus::Connecting).await.map_err(internal)? {
        return Ok(());
    }

    let backend = Arc::clone(&inner.torrent_backend);
    let handle = backend.add(&task.source, Path::new(&task.download_dir))?;
    inner
        .with_task(id, |t| {
            if let TaskKind::Torrent { handle: h, .. } = &mut t.kind {
                *h = Some(handle);
            }
            true
        })
        .await
        .map_err(internal)?;
    if let Some(p) = &priorities {
        backend.set_file_priorities(handle, &decode_priorities(p))?;
    }

    if !inner
        .transition(id, TaskStatus::DownloadingMetadata)
        .await
        .map_err(internal)?
    {
        backend.pause(handle)?;
        return Ok(());
    }

    let poll = {
        let cfg = inner.config.read().await;
        Duration::from_millis(cfg.torrent_poll_interval_ms.max(50))
    };
    let seed_after_complete = inner.config.read().await.seed_after_complete;

    loop {
        if abort.load(Ordering::Relaxed) {
            backend.pause(handle)?;
            return Err(TransferError::Aborted);
        }

        let progress = backend.progress(handle)?;
        inner
            .with_task(id, |t| {
                t.external_bytes = progress.bytes_done;
                if progress.total_size.is_some() {
                    t.total_size = progress.total_size;
                }
                true
            })
            .await
            .map_err(internal)?;
        if progress.bytes_done > 0 {
            inner.record_speed(id, 0); // keep the meter's window moving
        }

        match progress.state {
            TorrentState::DownloadingMetadata
            | TorrentState::CheckingFiles
            | TorrentState::Allocating
            | TorrentState::CheckingResumeData => {}
            TorrentState::Downloading => {
                // First payload bytes end the metadata phase.
                let _ = inner.transition(id, TaskStatus::Downloading).await.map_err(internal)?;
            }
            TorrentState::Stopped => {
                // Paused from the backend's side; mirror it and stop
                // polling.
                inner
                    .with_task(id, |t| {
                        if t.status.can_transition(TaskStatus::Paused) {
                            t.status = TaskStatus::Paused;
                        }
                        true
                    })
                    .await
                    .map_err(internal)?;
                return Ok(());
            }
            TorrentState::Finished | TorrentState::Seeding => {
                complete(inner, id, progress.state, seed_after_complete).await?;
                if inner.get_task(id).await.map(|t| t.status) == Some(TaskStatus::Seeding) {
                    // Keep the session alive; polling continues so a
                    // pause can reach the backend.
                    tokio::time::sleep(poll).await;
                    continue;
                }
                backend.pause(handle)?;
                return Ok(());
            }
        }

        tokio::time::sleep(poll).await;
    }
}

/// Walk the finished torrent through Finishing into Complete, and on to
/// Seeding when configured or when the backend is already seeding.
async fn complete(
    inner: &Arc<EngineInner>,
    id: TaskId,
    state: TorrentState,
    seed_after_complete: bool,
) -> Result<(), TransferError> {
    let seeding = seed_after_complete || state == TorrentState::Seeding;
    // Walk the legal phases; a torrent can finish straight out of the
    // metadata phase when the payload was already on disk.
    let _ = inner
        .transition(id, TaskStatus::Downloading)
        .await
        .map_err(internal)?;
    if !inner
        .transition(id, TaskStatus::Finishing)
        .await
        .map_err(internal)?
    {
        return Ok(());
    }
    inner
        .with_task(id, |t| {
            if t.status.can_transition(TaskStatus::Complete) {
                t.status = TaskStatus::Complete;
                t.force_start = false;
                t.clear_error();
            }
            true
        })
        .await
        .map_err(internal)?;
    if seeding {
        let _ = inner
            .transition(id, TaskStatus::Seeding)
            .await
            .map_err(internal)?;
    }
    tracing::info!(id, seeding, "torrent finished");
    Ok(())
}
