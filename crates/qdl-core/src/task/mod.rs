//! Task (download item) model.
//!
//! One queued unit of work: a direct file, a batch member, a torrent, or
//! a stream set. The task record carries the state-machine fields shared
//! by all kinds plus a kind-specific payload, dispatched by kind rather
//! than by virtual override. Only the scheduler and the task's own
//! workers mutate a task; consumers see read-only snapshots.

mod status;

pub use status::TaskStatus;

use serde::{Deserialize, Serialize};

use crate::retry::ErrorCategory;
use crate::segment::SegmentTable;
use crate::stream::ResolvedMedia;
use crate::torrent::TorrentHandle;

/// Stable task identifier (database row id).
pub type TaskId = i64;

/// Kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    /// Plain HTTP/FTP resource, possibly segmented.
    Direct,
    /// Magnet link or .torrent file driven by the external backend.
    Torrent {
        /// Preferred per-file priorities, compact form (see `torrent`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_priorities: Option<String>,
        /// Weak reference to the backend session. Never persisted: the
        /// backend's lifecycle is not ours.
        #[serde(skip)]
        handle: Option<TorrentHandle>,
    },
    /// Web page resolved into direct media URLs by an external resolver.
    Stream {
        /// Resolver output, filled during metadata resolution.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        media: Vec<ResolvedMedia>,
    },
}

impl TaskKind {
    pub fn direct() -> Self {
        TaskKind::Direct
    }

    pub fn torrent() -> Self {
        TaskKind::Torrent {
            file_priorities: None,
            handle: None,
        }
    }

    pub fn stream() -> Self {
        TaskKind::Stream { media: Vec::new() }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, TaskKind::Direct)
    }

    pub fn is_torrent(&self) -> bool {
        matches!(self, TaskKind::Torrent { .. })
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, TaskKind::Stream { .. })
    }
}

/// Last classified failure attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskError {
    pub category: ErrorCategory,
    pub message: String,
}

/// One queued entity with its full state-machine record.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Source descriptor: URL, magnet link, .torrent path, or page URL.
    pub source: String,
    /// Referrer sent with requests, when the source came from a page.
    pub referrer: Option<String>,
    /// Target directory for the final file.
    pub download_dir: String,
    /// Resolved filename (post-mask, post-conflict-resolution).
    pub final_filename: Option<String>,
    /// Partial-file name used until finishing renames it.
    pub temp_filename: Option<String>,
    /// Total bytes; unknown until headers or metadata arrive.
    pub total_size: Option<u64>,
    /// Bytes reported by an external backend (torrent/stream). Direct
    /// tasks derive progress from the segment table instead.
    pub external_bytes: u64,
    /// Segment table for direct transfers; empty for torrents.
    pub segments: SegmentTable,
    pub status: TaskStatus,
    pub error: Option<TaskError>,
    pub retry_count: u32,
    /// Unix seconds before which the scheduler must not re-admit.
    pub next_retry_at: Option<i64>,
    /// Queue position; order equals scheduling and display priority.
    pub position: i64,
    /// Bypass the concurrency budget for this task.
    pub force_start: bool,
    /// Desired segment count for the next planning boundary, when the
    /// user changed it mid-transfer.
    pub pending_segment_count: Option<usize>,
    /// Expected SHA-256 of the finished file, verified while finishing.
    pub checksum_sha256: Option<String>,
    /// Truncate an existing destination at finishing time (Overwrite
    /// conflict decision). Never truncated earlier.
    pub overwrite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Fresh task as created by `Engine::add`, before scheduling.
    pub fn new(id: TaskId, kind: TaskKind, source: String, download_dir: String) -> Self {
        Task {
            id,
            kind,
            source,
            referrer: None,
            download_dir,
            final_filename: None,
            temp_filename: None,
            total_size: None,
            external_bytes: 0,
            segments: SegmentTable::default(),
            status: TaskStatus::Idle,
            error: None,
            retry_count: 0,
            next_retry_at: None,
            position: 0,
            force_start: false,
            pending_segment_count: None,
            checksum_sha256: None,
            overwrite: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Bytes completed. For direct tasks this is the segment-table sum,
    /// keeping `bytes_done == sum(segment.received)` at every
    /// observation point; torrent/stream tasks report backend bytes.
    pub fn bytes_done(&self) -> u64 {
        if self.segments.is_empty() {
            self.external_bytes
        } else {
            self.segments.bytes_done()
        }
    }

    /// Fraction complete in [0.0, 1.0]; None while the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total_size?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.bytes_done() as f64 / total as f64).min(1.0))
    }

    /// Identity used for duplicate detection: same source and same
    /// destination directory.
    pub fn dedupe_key(&self) -> (String, String) {
        (self.source.clone(), self.download_dir.clone())
    }

    /// Records a classified failure on the task.
    pub fn set_error(&mut self, category: ErrorCategory, message: impl Into<String>) {
        self.error = Some(TaskError {
            category,
            message: message.into(),
        });
    }

    /// Clears error and retry bookkeeping (on restart or success).
    pub fn clear_error(&mut self) {
        self.error = None;
        self.retry_count = 0;
        self.next_retry_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentTable;

    fn direct_task() -> Task {
        Task::new(1, TaskKind::direct(), "https://example.com/a.bin".into(), "/tmp".into())
    }

    #[test]
    fn bytes_done_tracks_segment_table() {
        let mut t = direct_task();
        t.total_size = Some(1000);
        t.segments = SegmentTable::plan(1000, 4);
        assert_eq!(t.bytes_done(), 0);
        t.segments.record_received(0, 250);
        t.segments.record_received(2, 100);
        assert_eq!(t.bytes_done(), 350);
        assert_eq!(t.bytes_done(), t.segments.bytes_done());
    }

    #[test]
    fn torrent_task_uses_external_bytes() {
        let mut t = Task::new(2, TaskKind::torrent(), "magnet:?xt=urn:btih:abc".into(), "/tmp".into());
        t.external_bytes = 4096;
        assert_eq!(t.bytes_done(), 4096);
        assert!(t.kind.is_torrent());
    }

    #[test]
    fn fraction_needs_known_total() {
        let mut t = direct_task();
        assert!(t.fraction().is_none());
        t.total_size = Some(200);
        t.segments = SegmentTable::plan(200, 2);
        t.segments.record_received(0, 100);
        assert_eq!(t.fraction(), Some(0.5));
    }

    #[test]
    fn error_bookkeeping() {
        let mut t = direct_task();
        t.set_error(ErrorCategory::Client(404), "HTTP 404");
        t.retry_count = 2;
        t.next_retry_at = Some(12345);
        assert_eq!(t.error.as_ref().unwrap().category, ErrorCategory::Client(404));
        t.clear_error();
        assert!(t.error.is_none());
        assert_eq!(t.retry_count, 0);
        assert!(t.next_retry_at.is_none());
    }

    #[test]
    fn kind_payload_json_roundtrip() {
        let kind = TaskKind::Torrent {
            file_priorities: Some("NNH-".to_string()),
            handle: Some(7),
        };
        let json = serde_json::to_string(&kind).unwrap();
        let back: TaskKind = serde_json::from_str(&json).unwrap();
        match back {
            TaskKind::Torrent {
                file_priorities,
                handle,
            } => {
                assert_eq!(file_priorities.as_deref(), Some("NNH-"));
                // Weak handle is transient and never persisted.
                assert_eq!(handle, None);
            }
            _ => panic!("kind changed in roundtrip"),
        }
    }
}
