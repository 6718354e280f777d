//! Per-task drivers: one spawned future per admitted task.
//!
//! A driver walks its task through the lifecycle phases and reports the
//! outcome through the shared failure handler, which owns the retry
//! bookkeeping. Drivers never touch the queue except through the
//! engine's locked helpers.

mod direct;
mod stream;
mod torrent;

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::retry::{classify, RetryDecision, TransferError};
use crate::task::{Task, TaskId, TaskKind, TaskStatus};

use super::{unix_now, EngineInner};

pub(super) async fn drive(inner: Arc<EngineInner>, id: TaskId, abort: Arc<AtomicBool>) {
    let Some(task) = inner.get_task(id).await else {
        return;
    };
    let result = match &task.kind {
        TaskKind::Direct => direct::run(&inner, id, &abort).await,
        TaskKind::Torrent { .. } => torrent::run(&inner, id, &abort).await,
        TaskKind::Stream { .. } => stream::run(&inner, id, &abort).await,
    };
    if let Err(e) = result {
        handle_failure(&inner, id, e).await;
    }
    inner.reset_speed(id);
    inner.emit_queue().await;
}

/// Folds a driver failure into the task record: abort is not an error,
/// file errors are terminal, transport errors consume retry budget.
async fn handle_failure(inner: &Arc<EngineInner>, id: TaskId, error: TransferError) {
    if matches!(error, TransferError::Aborted) {
        // A pause or cancel command already set the target status. If
        // the abort came from shutdown instead, park the task as Paused.
        let res = inner
            .with_task(id, |t| {
                if t.status.is_admitted() {
                    t.status = TaskStatus::Paused;
                }
                t.segments.release_workers();
                true
            })
            .await;
        if let Err(e) = res {
            tracing::warn!(id, error = %e, "failed to persist aborted task");
        }
        return;
    }

    let category = classify(&error);
    let policy = inner.config.read().await.retry_policy();
    let message = format!("{}: {}", category.describe(), error);

    let res = inner
        .with_task(id, |t| {
            t.segments.release_workers();
            let target = if category.is_file_error() {
                TaskStatus::FileError
            } else {
                TaskStatus::ServerError
            };
            if !t.status.can_transition(target) {
                // A concurrent command (pause, cancel) won the race.
                return true;
            }
            t.status = target;
            t.set_error(category, &message);
            if target == TaskStatus::ServerError {
                match policy.decide(t.retry_count + 1, category) {
                    RetryDecision::RetryAfter(d) => {
                        t.retry_count += 1;
                        t.next_retry_at = Some(unix_now() + d.as_secs().max(1) as i64);
                        tracing::info!(
                            id,
                            attempt = t.retry_count,
                            delay_secs = d.as_secs(),
                            error = %message,
                            "task failed, retry scheduled"
                        );
                    }
                    RetryDecision::NoRetry => {
                        t.next_retry_at = None;
                        tracing::warn!(id, error = %message, "task failed, no retry");
                    }
                }
            } else {
                t.next_retry_at = None;
                tracing::warn!(id, error = %message, "task failed with file error");
            }
            true
        })
        .await;
    if let Err(e) = res {
        tracing::warn!(id, error = %e, "failed to persist task failure");
    }
}

/// Request headers for a task: the referrer plus anything kind-specific
/// the caller merges on top.
pub(self) fn base_headers(task: &Task) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    if let Some(r) = &task.referrer {
        headers.insert("Referer".to_string(), r.clone());
    }
    headers
}

/// Queue bookkeeping failed (task vanished mid-drive). Terminal.
fn internal(e: anyhow::Error) -> TransferError {
    TransferError::BadMetadata(format!("queue state error: {e}"))
}

/// Wraps a filesystem-side anyhow error as a transfer storage error.
pub(self) fn storage_err(e: anyhow::Error) -> TransferError {
    match e.downcast::<std::io::Error>() {
        Ok(io) => TransferError::Storage(io),
        Err(other) => TransferError::Storage(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{AddRequest, Engine, EngineOptions};
    use crate::queue_db::QueueDb;

    async fn engine() -> Engine {
        let db = QueueDb::open_memory().await.unwrap();
        Engine::new(db, EngineOptions::new(EngineConfig::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn transient_failure_schedules_retry() {
        let e = engine().await;
        let id = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        e.inner
            .with_task(id, |t| {
                t.status = TaskStatus::Downloading;
                true
            })
            .await
            .unwrap();

        handle_failure(&e.inner, id, TransferError::Http(503)).await;
        let t = e.inner.get_task(id).await.unwrap();
        assert_eq!(t.status, TaskStatus::ServerError);
        assert_eq!(t.retry_count, 1);
        assert!(t.next_retry_at.is_some());
        assert!(t.error.is_some());
    }

    #[tokio::test]
    async fn terminal_failure_has_no_retry() {
        let e = engine().await;
        let id = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        e.inner
            .with_task(id, |t| {
                t.status = TaskStatus::Connecting;
                true
            })
            .await
            .unwrap();

        handle_failure(&e.inner, id, TransferError::Http(404)).await;
        let t = e.inner.get_task(id).await.unwrap();
        assert_eq!(t.status, TaskStatus::ServerError);
        assert_eq!(t.retry_count, 0);
        assert!(t.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn storage_failure_is_file_error() {
        let e = engine().await;
        let id = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        e.inner
            .with_task(id, |t| {
                t.status = TaskStatus::Downloading;
                true
            })
            .await
            .unwrap();

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        handle_failure(&e.inner, id, TransferError::Storage(io)).await;
        let t = e.inner.get_task(id).await.unwrap();
        assert_eq!(t.status, TaskStatus::FileError);
        assert!(t.next_retry_at.is_none());
    }

    #[tokio::test]
    async fn abort_during_shutdown_parks_as_paused() {
        let e = engine().await;
        let id = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        e.inner
            .with_task(id, |t| {
                t.status = TaskStatus::Downloading;
                true
            })
            .await
            .unwrap();

        handle_failure(&e.inner, id, TransferError::Aborted).await;
        let t = e.inner.get_task(id).await.unwrap();
        assert_eq!(t.status, TaskStatus::Paused);
    }

    #[tokio::test]
    async fn abort_after_user_pause_keeps_paused_status() {
        let e = engine().await;
        let id = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        e.inner
            .with_task(id, |t| {
                t.status = TaskStatus::Downloading;
                true
            })
            .await
            .unwrap();
        e.pause(id).await.unwrap();

        handle_failure(&e.inner, id, TransferError::Aborted).await;
        let t = e.inner.get_task(id).await.unwrap();
        assert_eq!(t.status, TaskStatus::Paused);
        assert!(t.error.is_none());
    }

    #[tokio::test]
    async fn retry_budget_exhausts() {
        let e = engine().await;
        let id = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        let max = EngineConfig::default().retry_policy().max_attempts;
        for _ in 0..max {
            e.inner
                .with_task(id, |t| {
                    t.status = TaskStatus::Downloading;
                    true
                })
                .await
                .unwrap();
            handle_failure(&e.inner, id, TransferError::Http(500)).await;
        }
        let t = e.inner.get_task(id).await.unwrap();
        assert_eq!(t.status, TaskStatus::ServerError);
        assert!(t.next_retry_at.is_none(), "budget exhausted, manual restart only");
        assert_eq!(t.retry_count, max - 1);
    }
}
