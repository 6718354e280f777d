//! Download queue engine.
//!
//! Owns the task list, the admission scheduler, and the per-task
//! drivers. Commands mutate the queue under one lock, persist the
//! changed row, and publish an event; drivers run as spawned tasks and
//! go through the same helpers, so every observer sees the same
//! position-ordered, state-machine-checked queue.

mod events;
mod run;
mod tick;

pub use events::{EngineEvent, QueueStats, TaskSnapshot};
pub use tick::plan_admissions;

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, Mutex, Notify, RwLock};

use crate::batch;
use crate::config::EngineConfig;
use crate::conflict::{ConflictResolver, PolicyResolver};
use crate::control::TaskControl;
use crate::queue_db::QueueDb;
use crate::speed::SpeedMeter;
use crate::stream::{NoStreamResolver, StreamResolver};
use crate::task::{Task, TaskId, TaskKind, TaskStatus};
use crate::torrent::{decode_priorities, NoTorrentBackend, TorrentBackend};

/// Collaborators and initial configuration for an engine.
pub struct EngineOptions {
    pub config: EngineConfig,
    pub torrent_backend: Arc<dyn TorrentBackend>,
    pub stream_resolver: Arc<dyn StreamResolver>,
    /// Conflict decisions; defaults to applying the configured policy.
    pub conflict_resolver: Option<Arc<dyn ConflictResolver>>,
}

impl EngineOptions {
    pub fn new(config: EngineConfig) -> Self {
        EngineOptions {
            config,
            torrent_backend: Arc::new(NoTorrentBackend),
            stream_resolver: Arc::new(NoStreamResolver),
            conflict_resolver: None,
        }
    }
}

/// A new task to enqueue.
#[derive(Debug, Clone)]
pub struct AddRequest {
    /// URL, magnet link, .torrent path, page URL, or batch pattern.
    pub source: String,
    /// Explicit kind; None auto-detects torrent sources from the URL.
    pub kind: Option<&'static str>,
    pub download_dir: Option<String>,
    pub referrer: Option<String>,
    pub checksum_sha256: Option<String>,
    /// Enqueue paused instead of schedulable.
    pub paused: bool,
    /// Expand `[start-end]` numeric patterns into one task per URL.
    pub expand_batch: bool,
}

impl AddRequest {
    pub fn direct(source: impl Into<String>) -> Self {
        AddRequest {
            source: source.into(),
            kind: None,
            download_dir: None,
            referrer: None,
            checksum_sha256: None,
            paused: false,
            expand_batch: false,
        }
    }
}

pub(crate) struct EngineInner {
    pub(crate) db: QueueDb,
    pub(crate) config: RwLock<EngineConfig>,
    pub(crate) tasks: Mutex<Vec<Task>>,
    pub(crate) control: TaskControl,
    pub(crate) events: broadcast::Sender<EngineEvent>,
    pub(crate) torrent_backend: Arc<dyn TorrentBackend>,
    pub(crate) stream_resolver: Arc<dyn StreamResolver>,
    pub(crate) conflict_resolver: Arc<dyn ConflictResolver>,
    pub(crate) speeds: std::sync::Mutex<HashMap<TaskId, SpeedMeter>>,
    pub(crate) notify: Notify,
    pub(crate) shutting_down: AtomicBool,
}

/// The queue engine. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Builds an engine over an open queue database, loading the
    /// persisted queue (interrupted tasks come back as Paused).
    pub async fn new(db: QueueDb, options: EngineOptions) -> Result<Self> {
        let tasks = db.load_all().await?;
        let conflict_resolver = options
            .conflict_resolver
            .unwrap_or_else(|| Arc::new(PolicyResolver(options.config.conflict_policy)));
        let (events, _) = broadcast::channel(256);
        Ok(Engine {
            inner: Arc::new(EngineInner {
                db,
                config: RwLock::new(options.config),
                tasks: Mutex::new(tasks),
                control: TaskControl::new(),
                events,
                torrent_backend: options.torrent_backend,
                stream_resolver: options.stream_resolver,
                conflict_resolver,
                speeds: std::sync::Mutex::new(HashMap::new()),
                notify: Notify::new(),
                shutting_down: AtomicBool::new(false),
            }),
        })
    }

    /// Subscribe to engine events. Slow receivers miss events rather
    /// than blocking the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Enqueue one request, expanding batch patterns when asked.
    /// Returns the ids in pattern order.
    pub async fn add(&self, req: AddRequest) -> Result<Vec<TaskId>> {
        let sources = if req.expand_batch {
            batch::expand_pattern(&req.source)?
        } else {
            vec![req.source.clone()]
        };

        let download_dir = match &req.download_dir {
            Some(d) => d.clone(),
            None => {
                let cfg = self.inner.config.read().await;
                cfg.download_dir.clone().unwrap_or_else(|| ".".to_string())
            }
        };

        let mut ids = Vec::with_capacity(sources.len());
        for source in sources {
            let kind = match req.kind {
                Some("torrent") => TaskKind::torrent(),
                Some("stream") => TaskKind::stream(),
                Some("direct") => TaskKind::direct(),
                Some(other) => bail!("unknown task kind {:?}", other),
                None => detect_kind(&source),
            };
            let mut task = Task::new(0, kind, source, download_dir.clone());
            task.referrer = req.referrer.clone();
            task.checksum_sha256 = req.checksum_sha256.clone();
            if req.paused {
                task.status = TaskStatus::Paused;
            }
            let task = self.inner.db.insert(task).await?;
            ids.push(task.id);
            tracing::info!(id = task.id, source = %task.source, "task added");
            self.inner.tasks.lock().await.push(task);
        }

        self.inner.emit_queue().await;
        self.inner.notify.notify_one();
        Ok(ids)
    }

    /// Make a paused, canceled, skipped, or errored task schedulable
    /// again. A no-op for tasks already queued or running; restarting a
    /// Complete task re-downloads it from scratch.
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        let changed = self
            .inner
            .with_task(id, |t| match t.status {
                TaskStatus::Paused
                | TaskStatus::Canceled
                | TaskStatus::Skipped
                | TaskStatus::ServerError
                | TaskStatus::FileError
                | TaskStatus::Complete => {
                    if t.status == TaskStatus::Complete {
                        // Full restart: prior bytes belong to the old file.
                        t.segments = Default::default();
                        t.total_size = None;
                        t.external_bytes = 0;
                    }
                    t.status = TaskStatus::Idle;
                    t.clear_error();
                    true
                }
                _ => false,
            })
            .await?;
        if changed {
            self.inner.notify.notify_one();
        }
        Ok(())
    }

    /// Pause a task. Running workers stop at the next chunk; completed
    /// segment bytes are kept. Idempotent.
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        self.inner.control.request_abort(id);
        self.inner
            .with_task(id, |t| {
                if t.status.can_pause() && t.status != TaskStatus::Paused {
                    t.status = TaskStatus::Paused;
                    t.segments.release_workers();
                    t.force_start = false;
                    true
                } else {
                    false
                }
            })
            .await?;
        self.inner.reset_speed(id);
        Ok(())
    }

    /// Cancel a task. Partial files stay on disk; `remove` deletes them.
    /// Idempotent.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        self.inner.control.request_abort(id);
        self.inner
            .with_task(id, |t| {
                if t.status != TaskStatus::Canceled && t.status.can_transition(TaskStatus::Canceled)
                {
                    t.status = TaskStatus::Canceled;
                    t.segments.release_workers();
                    t.force_start = false;
                    true
                } else {
                    false
                }
            })
            .await?;
        self.inner.reset_speed(id);
        Ok(())
    }

    /// Remove a task from the queue, optionally deleting its files.
    /// An active task is canceled first and its workers are waited out
    /// before the row and files go away, so no worker still holds a
    /// handle to a file being unlinked. Removing an unknown id is a
    /// no-op.
    pub async fn remove(&self, id: TaskId, delete_files: bool) -> Result<()> {
        self.inner.control.request_abort(id);
        while self.inner.control.is_running(id) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let removed = {
            let mut tasks = self.inner.tasks.lock().await;
            match tasks.iter().position(|t| t.id == id) {
                Some(i) => Some(tasks.remove(i)),
                None => None,
            }
        };
        let Some(task) = removed else {
            return Ok(());
        };

        if let TaskKind::Torrent {
            handle: Some(h), ..
        } = task.kind
        {
            if let Err(e) = self.inner.torrent_backend.remove(h, delete_files) {
                tracing::warn!(id, error = %e, "torrent backend remove failed");
            }
        }
        if delete_files {
            delete_task_files(&task).await;
        }
        self.inner.db.remove(id).await?;
        self.inner.reset_speed(id);
        let _ = self.inner.events.send(EngineEvent::TaskRemoved(id));
        self.inner.emit_queue().await;
        Ok(())
    }

    /// Move a task to a new queue index; everything between the old and
    /// new slot shifts by one. Only the rows whose position actually
    /// changed are written back, in a single transaction.
    pub async fn reorder(&self, id: TaskId, new_index: usize) -> Result<()> {
        let moved: Vec<(TaskId, i64)> = {
            let mut tasks = self.inner.tasks.lock().await;
            let Some(from) = tasks.iter().position(|t| t.id == id) else {
                bail!("no task with id {}", id);
            };
            let task = tasks.remove(from);
            let to = new_index.min(tasks.len());
            tasks.insert(to, task);
            let mut moved = Vec::new();
            for (i, t) in tasks.iter_mut().enumerate() {
                if t.position != i as i64 {
                    t.position = i as i64;
                    moved.push((t.id, t.position));
                }
            }
            moved
        };
        self.inner.db.save_positions(&moved).await?;
        self.inner.emit_queue().await;
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Start a task immediately, ignoring the concurrency budget.
    pub async fn force_start(&self, id: TaskId) -> Result<()> {
        self.inner
            .with_task(id, |t| {
                t.force_start = true;
                if matches!(t.status, TaskStatus::Paused | TaskStatus::Canceled) {
                    t.status = TaskStatus::Idle;
                    t.clear_error();
                }
                true
            })
            .await?;
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Change a task's segment count. Takes effect at the next planning
    /// boundary; a running transfer re-splits only its unfetched bytes.
    pub async fn set_segment_count(&self, id: TaskId, count: usize) -> Result<()> {
        let count = {
            let cfg = self.inner.config.read().await;
            cfg.clamp_segments(count)
        };
        self.inner
            .with_task(id, |t| {
                t.pending_segment_count = Some(count);
                true
            })
            .await?;
        Ok(())
    }

    /// Apply per-file priorities to a torrent task (compact string, one
    /// char per file: `-`, `L`, `N`, `H`).
    pub async fn set_file_priorities(&self, id: TaskId, priorities: &str) -> Result<()> {
        let handle = self
            .inner
            .with_task(id, |t| match &mut t.kind {
                TaskKind::Torrent {
                    file_priorities,
                    handle,
                } => {
                    *file_priorities = Some(priorities.to_string());
                    Ok(*handle)
                }
                _ => Err(anyhow::anyhow!("task {} is not a torrent", id)),
            })
            .await??;
        if let Some(h) = handle {
            self.inner
                .torrent_backend
                .set_file_priorities(h, &decode_priorities(priorities))
                .map_err(|e| anyhow::anyhow!("backend refused priorities: {}", e))?;
        }
        Ok(())
    }

    /// Remove tasks sharing a source and destination with an earlier
    /// task. Returns how many were dropped.
    pub async fn remove_duplicates(&self) -> Result<usize> {
        let dupes: Vec<TaskId> = {
            let tasks = self.inner.tasks.lock().await;
            let mut seen = std::collections::HashSet::new();
            tasks
                .iter()
                .filter(|t| !seen.insert(t.dedupe_key()))
                .map(|t| t.id)
                .collect()
        };
        let count = dupes.len();
        for id in dupes {
            self.remove(id, false).await?;
        }
        Ok(count)
    }

    /// Swap in a new configuration; the next tick sees the new budget.
    pub async fn update_config(&self, config: EngineConfig) {
        *self.inner.config.write().await = config;
        self.inner.notify.notify_one();
    }

    /// Snapshot of every task, in queue order.
    pub async fn snapshots(&self) -> Vec<TaskSnapshot> {
        let tasks = self.inner.tasks.lock().await;
        tasks
            .iter()
            .map(|t| TaskSnapshot::of(t, self.inner.speed_of(t.id)))
            .collect()
    }

    pub async fn stats(&self) -> QueueStats {
        QueueStats::of(&self.inner.tasks.lock().await)
    }

    /// One scheduler pass: admit whatever the budget allows and spawn
    /// drivers for it. Returns how many tasks were admitted.
    pub async fn tick(&self) -> Result<usize> {
        if self.inner.shutting_down.load(Ordering::Relaxed) {
            return Ok(0);
        }
        let max_concurrent = self.inner.config.read().await.max_concurrent_downloads;
        let now = unix_now();

        let admitted: Vec<TaskId> = {
            let mut tasks = self.inner.tasks.lock().await;
            let ids = tick::plan_admissions(&tasks, max_concurrent, now);
            for id in &ids {
                if let Some(t) = tasks.iter_mut().find(|t| t.id == *id) {
                    t.status = TaskStatus::Preparing;
                    t.error = None;
                    self.inner.db.save(t).await?;
                    self.inner.emit_task(t);
                }
            }
            ids
        };

        for id in &admitted {
            let abort = self.inner.control.register(*id);
            let inner = Arc::clone(&self.inner);
            let id = *id;
            tokio::spawn(async move {
                run::drive(Arc::clone(&inner), id, abort).await;
                inner.control.unregister(id);
                inner.notify.notify_one();
            });
        }
        if !admitted.is_empty() {
            self.inner.emit_queue().await;
        }
        Ok(admitted.len())
    }

    /// Scheduler loop: tick on queue changes and on a coarse interval
    /// (retry deadlines), until `shutdown` is called.
    pub async fn run(&self) -> Result<()> {
        loop {
            if self.inner.shutting_down.load(Ordering::Relaxed) {
                break;
            }
            self.tick().await?;
            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            }
        }
        Ok(())
    }

    /// Drive the queue until nothing is running or schedulable (one-shot
    /// CLI mode).
    pub async fn run_until_idle(&self) -> Result<()> {
        loop {
            self.tick().await?;
            let (running, pending) = {
                let tasks = self.inner.tasks.lock().await;
                let running = tasks.iter().filter(|t| t.status.is_admitted()).count();
                let pending = tasks
                    .iter()
                    .filter(|t| t.status.is_schedulable())
                    .any(|t| match t.status {
                        // Exhausted retries wait for a manual restart.
                        TaskStatus::ServerError => t.next_retry_at.is_some(),
                        _ => true,
                    });
                (running, pending)
            };
            if running == 0 && !pending {
                return Ok(());
            }
            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(200)) => {}
            }
        }
    }

    /// Graceful shutdown: stop admitting, abort running transfers, wait
    /// for drivers to persist and exit (bounded wait).
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Relaxed);
        let running: Vec<TaskId> = {
            let tasks = self.inner.tasks.lock().await;
            tasks
                .iter()
                .filter(|t| t.status.is_admitted())
                .map(|t| t.id)
                .collect()
        };
        for id in &running {
            self.inner.control.request_abort(*id);
        }
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while tokio::time::Instant::now() < deadline {
            let any_running = {
                let tasks = self.inner.tasks.lock().await;
                tasks.iter().any(|t| t.status.is_admitted())
            };
            if !any_running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.notify.notify_waiters();
    }
}

impl EngineInner {
    /// Mutate one task under the queue lock, persist it, and emit a
    /// change event when the closure returns "changed".
    pub(crate) async fn with_task<R: Changed>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut Task) -> R,
    ) -> Result<R> {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            bail!("no task with id {}", id);
        };
        let r = f(task);
        if r.changed() {
            self.db.save(task).await?;
            self.emit_task(task);
        }
        Ok(r)
    }

    pub(crate) async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().await.iter().find(|t| t.id == id).cloned()
    }

    /// State-machine transition helper: applies `to` only when legal,
    /// persists, emits. Returns whether the transition happened.
    pub(crate) async fn transition(&self, id: TaskId, to: TaskStatus) -> Result<bool> {
        self.with_task(id, |t| {
            if t.status.can_transition(to) {
                t.status = to;
                true
            } else {
                tracing::debug!(id, from = t.status.as_str(), to = to.as_str(), "transition refused");
                false
            }
        })
        .await
    }

    pub(crate) fn emit_task(&self, task: &Task) {
        let _ = self
            .events
            .send(EngineEvent::TaskChanged(TaskSnapshot::of(
                task,
                self.speed_of(task.id),
            )));
    }

    pub(crate) async fn emit_queue(&self) {
        let stats = QueueStats::of(&self.tasks.lock().await);
        let _ = self.events.send(EngineEvent::QueueChanged(stats));
    }

    pub(crate) fn record_speed(&self, id: TaskId, bytes: u64) {
        let mut speeds = self.speeds.lock().unwrap();
        speeds.entry(id).or_insert_with(SpeedMeter::new).record(bytes);
    }

    pub(crate) fn speed_of(&self, id: TaskId) -> f64 {
        let mut speeds = self.speeds.lock().unwrap();
        speeds.get_mut(&id).map(|m| m.bytes_per_sec()).unwrap_or(0.0)
    }

    pub(crate) fn reset_speed(&self, id: TaskId) {
        if let Some(m) = self.speeds.lock().unwrap().get_mut(&id) {
            m.reset();
        }
    }
}

/// Marker for `with_task` return values: did the closure change the task?
pub(crate) trait Changed {
    fn changed(&self) -> bool;
}

impl Changed for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl<T> Changed for Result<T> {
    fn changed(&self) -> bool {
        self.is_ok()
    }
}

/// Torrent sources are recognizable from the URL shape; everything else
/// is a direct download. Stream tasks are always explicit.
fn detect_kind(source: &str) -> TaskKind {
    if source.starts_with("magnet:") || source.ends_with(".torrent") {
        TaskKind::torrent()
    } else {
        TaskKind::direct()
    }
}

async fn delete_task_files(task: &Task) {
    let dir = std::path::Path::new(&task.download_dir);
    if let Some(temp) = &task.temp_filename {
        let p = dir.join(temp);
        if let Err(e) = tokio::fs::remove_file(&p).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %p.display(), error = %e, "failed to delete partial file");
            }
        }
    }
    if let Some(name) = &task.final_filename {
        let p = dir.join(name);
        if let Err(e) = tokio::fs::remove_file(&p).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %p.display(), error = %e, "failed to delete file");
            }
        }
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine() -> Engine {
        let db = QueueDb::open_memory().await.unwrap();
        Engine::new(db, EngineOptions::new(EngineConfig::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_assigns_queue_order() {
        let e = engine().await;
        let a = e.add(AddRequest::direct("https://e.com/a")).await.unwrap();
        let b = e.add(AddRequest::direct("https://e.com/b")).await.unwrap();
        let snaps = e.snapshots().await;
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].id, a[0]);
        assert_eq!(snaps[1].id, b[0]);
        assert_eq!(snaps[0].status, TaskStatus::Idle);
    }

    #[tokio::test]
    async fn add_batch_expands_pattern() {
        let e = engine().await;
        let mut req = AddRequest::direct("https://e.com/part[01-03].bin");
        req.expand_batch = true;
        let ids = e.add(req).await.unwrap();
        assert_eq!(ids.len(), 3);
        let snaps = e.snapshots().await;
        assert_eq!(snaps[0].source, "https://e.com/part01.bin");
        assert_eq!(snaps[2].source, "https://e.com/part03.bin");
    }

    #[tokio::test]
    async fn magnet_links_detected_as_torrents() {
        let e = engine().await;
        e.add(AddRequest::direct("magnet:?xt=urn:btih:abcd"))
            .await
            .unwrap();
        let snaps = e.snapshots().await;
        assert_eq!(snaps[0].kind, "torrent");
    }

    #[tokio::test]
    async fn pause_is_idempotent() {
        let e = engine().await;
        let ids = e.add(AddRequest::direct("https://e.com/a")).await.unwrap();
        e.pause(ids[0]).await.unwrap();
        e.pause(ids[0]).await.unwrap();
        assert_eq!(e.snapshots().await[0].status, TaskStatus::Paused);
        e.resume(ids[0]).await.unwrap();
        assert_eq!(e.snapshots().await[0].status, TaskStatus::Idle);
    }

    #[tokio::test]
    async fn remove_unknown_id_is_noop() {
        let e = engine().await;
        e.remove(999, false).await.unwrap();
        e.remove(999, true).await.unwrap();
    }

    #[tokio::test]
    async fn reorder_renumbers_positions() {
        let e = engine().await;
        let a = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        let b = e.add(AddRequest::direct("https://e.com/b")).await.unwrap()[0];
        let c = e.add(AddRequest::direct("https://e.com/c")).await.unwrap()[0];
        e.reorder(c, 0).await.unwrap();
        let snaps = e.snapshots().await;
        assert_eq!(
            snaps.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![c, a, b]
        );
        assert_eq!(
            snaps.iter().map(|s| s.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn remove_duplicates_keeps_first() {
        let e = engine().await;
        let a = e.add(AddRequest::direct("https://e.com/same")).await.unwrap()[0];
        e.add(AddRequest::direct("https://e.com/same")).await.unwrap();
        e.add(AddRequest::direct("https://e.com/other")).await.unwrap();
        let removed = e.remove_duplicates().await.unwrap();
        assert_eq!(removed, 1);
        let snaps = e.snapshots().await;
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].id, a);
    }

    #[tokio::test]
    async fn set_segment_count_is_clamped_and_deferred() {
        let e = engine().await;
        let id = e.add(AddRequest::direct("https://e.com/a")).await.unwrap()[0];
        e.set_segment_count(id, 100).await.unwrap();
        let t = e.inner.get_task(id).await.unwrap();
        assert_eq!(t.pending_segment_count, Some(16));
        // The live table is untouched until the next planning boundary.
        assert!(t.segments.is_empty());
    }

    #[tokio::test]
    async fn paused_add_is_not_schedulable() {
        let e = engine().await;
        let mut req = AddRequest::direct("https://e.com/a");
        req.paused = true;
        e.add(req).await.unwrap();
        assert_eq!(e.snapshots().await[0].status, TaskStatus::Paused);
        let tasks = e.inner.tasks.lock().await;
        assert!(plan_admissions(&tasks, 4, unix_now()).is_empty());
    }
}
