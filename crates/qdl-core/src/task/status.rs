//! Task lifecycle states and legal transitions.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one queued task.
///
/// Happy path: `Idle → Preparing → Connecting → [DownloadingMetadata] →
/// Downloading → Finishing → Complete`. `DownloadingMetadata` applies
/// only to torrent and stream tasks; `Seeding` only to torrents
/// configured to keep sharing after completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Added but not yet admitted by the scheduler.
    Idle,
    /// Suspended by the user; completed segments are kept.
    Paused,
    /// Stopped by the user; partial files retained unless deleted.
    Canceled,
    /// Admitted: resolving destination and conflicts.
    Preparing,
    /// Opening the connection / probing the server.
    Connecting,
    /// Resolving torrent or stream metadata before byte transfer.
    DownloadingMetadata,
    /// Byte transfer in progress.
    Downloading,
    /// All segments done: flush, verify, rename from partial name.
    Finishing,
    Complete,
    /// Torrent continuing to share after completion.
    Seeding,
    /// Conflict resolution chose to skip this task. Terminal.
    Skipped,
    /// Transport/protocol failure; terminal once retries are exhausted.
    ServerError,
    /// Local filesystem failure. Terminal until manually retried.
    FileError,
}

impl TaskStatus {
    /// States that occupy a concurrency slot.
    pub fn is_admitted(self) -> bool {
        matches!(
            self,
            TaskStatus::Preparing
                | TaskStatus::Connecting
                | TaskStatus::DownloadingMetadata
                | TaskStatus::Downloading
                | TaskStatus::Finishing
        )
    }

    /// States with no live workers and no pending work.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Complete
                | TaskStatus::Canceled
                | TaskStatus::Skipped
                | TaskStatus::FileError
        )
    }

    /// States the scheduler may admit on a tick. `ServerError` is
    /// schedulable only while retry budget remains; the scheduler
    /// checks that separately together with the retry delay.
    pub fn is_schedulable(self) -> bool {
        matches!(self, TaskStatus::Idle | TaskStatus::ServerError)
    }

    /// True if a user pause command applies in this state.
    pub fn can_pause(self) -> bool {
        self.is_admitted() || matches!(self, TaskStatus::Idle | TaskStatus::Seeding)
    }

    /// Whether `self → to` is a legal state-machine transition.
    pub fn can_transition(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        if self == to {
            return false;
        }
        match self {
            Idle => matches!(to, Preparing | Paused | Canceled),
            Paused => matches!(to, Preparing | Connecting | Canceled | Idle),
            Canceled => matches!(to, Idle),
            Preparing => matches!(
                to,
                Connecting | Skipped | Paused | Canceled | ServerError | FileError
            ),
            Connecting => matches!(
                to,
                DownloadingMetadata | Downloading | Paused | Canceled | ServerError | FileError
            ),
            DownloadingMetadata => {
                matches!(to, Downloading | Paused | Canceled | ServerError | FileError)
            }
            Downloading => matches!(to, Finishing | Paused | Canceled | ServerError | FileError),
            Finishing => matches!(to, Complete | Paused | Canceled | ServerError | FileError),
            Complete => matches!(to, Seeding | Idle),
            Seeding => matches!(to, Complete | Paused | Canceled),
            Skipped => matches!(to, Idle),
            // Retry re-admits through Preparing; manual restart re-enters Idle.
            ServerError => matches!(to, Preparing | Connecting | Idle | Paused | Canceled),
            FileError => matches!(to, Idle | Canceled),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Paused => "paused",
            TaskStatus::Canceled => "canceled",
            TaskStatus::Preparing => "preparing",
            TaskStatus::Connecting => "connecting",
            TaskStatus::DownloadingMetadata => "downloading_metadata",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Finishing => "finishing",
            TaskStatus::Complete => "complete",
            TaskStatus::Seeding => "seeding",
            TaskStatus::Skipped => "skipped",
            TaskStatus::ServerError => "server_error",
            TaskStatus::FileError => "file_error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "idle" => TaskStatus::Idle,
            "paused" => TaskStatus::Paused,
            "canceled" => TaskStatus::Canceled,
            "preparing" => TaskStatus::Preparing,
            "connecting" => TaskStatus::Connecting,
            "downloading_metadata" => TaskStatus::DownloadingMetadata,
            "downloading" => TaskStatus::Downloading,
            "finishing" => TaskStatus::Finishing,
            "complete" => TaskStatus::Complete,
            "seeding" => TaskStatus::Seeding,
            "skipped" => TaskStatus::Skipped,
            "server_error" => TaskStatus::ServerError,
            "file_error" => TaskStatus::FileError,
            _ => TaskStatus::Idle,
        }
    }
}
