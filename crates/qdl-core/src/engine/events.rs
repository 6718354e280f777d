//! Engine events published to UI subscribers (broadcast channel).

use serde::Serialize;

use crate::task::{Task, TaskError, TaskId, TaskStatus};

/// Read-only view of one task, safe to hand to any consumer.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub source: String,
    pub kind: &'static str,
    pub status: TaskStatus,
    pub download_dir: String,
    pub final_filename: Option<String>,
    pub bytes_done: u64,
    pub total_size: Option<u64>,
    /// Fraction complete in [0.0, 1.0]; None while size is unknown.
    pub fraction: Option<f64>,
    /// Smoothed transfer rate, bytes per second.
    pub bytes_per_sec: f64,
    pub error: Option<TaskError>,
    pub position: i64,
    pub retry_count: u32,
}

impl TaskSnapshot {
    pub fn of(task: &Task, bytes_per_sec: f64) -> Self {
        TaskSnapshot {
            id: task.id,
            source: task.source.clone(),
            kind: if task.kind.is_torrent() {
                "torrent"
            } else if task.kind.is_stream() {
                "stream"
            } else {
                "direct"
            },
            status: task.status,
            download_dir: task.download_dir.clone(),
            final_filename: task.final_filename.clone(),
            bytes_done: task.bytes_done(),
            total_size: task.total_size,
            fraction: task.fraction(),
            bytes_per_sec,
            error: task.error.clone(),
            position: task.position,
            retry_count: task.retry_count,
        }
    }

    /// Estimated seconds remaining (None without a rate or a size).
    pub fn eta_secs(&self) -> Option<f64> {
        let total = self.total_size?;
        let remaining = total.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        if self.bytes_per_sec <= 0.0 {
            return None;
        }
        Some(remaining as f64 / self.bytes_per_sec)
    }
}

/// Aggregate queue counters, recomputed on structural changes.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub errored: usize,
}

impl QueueStats {
    pub fn of(tasks: &[Task]) -> Self {
        let mut s = QueueStats {
            total: tasks.len(),
            ..QueueStats::default()
        };
        for t in tasks {
            if t.status.is_admitted() {
                s.active += 1;
            }
            match t.status {
                TaskStatus::Complete | TaskStatus::Seeding => s.completed += 1,
                TaskStatus::ServerError | TaskStatus::FileError => s.errored += 1,
                _ => {}
            }
        }
        s
    }
}

/// Something a subscriber may want to repaint for.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A task changed state or made progress.
    TaskChanged(TaskSnapshot),
    /// A task left the queue entirely.
    TaskRemoved(TaskId),
    /// Queue membership or ordering changed.
    QueueChanged(QueueStats),
}
