//! Torrent backend collaborator interface.
//!
//! The engine never owns a torrent session; it holds a weak handle (an
//! identifier) and polls the backend for progress, mapping the backend's
//! status vocabulary onto the task state machine. Implementing the
//! BitTorrent wire protocol is out of scope.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::retry::TransferError;
use crate::task::TaskStatus;

/// Identifier for a session owned by the external backend.
pub type TorrentHandle = u64;

/// Status vocabulary reported by the torrent backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    Stopped,
    CheckingFiles,
    DownloadingMetadata,
    Downloading,
    Finished,
    Seeding,
    Allocating,
    CheckingResumeData,
}

impl TorrentState {
    /// Maps the backend state onto the task state machine.
    pub fn task_status(self) -> TaskStatus {
        match self {
            TorrentState::Stopped => TaskStatus::Paused,
            TorrentState::CheckingFiles
            | TorrentState::Allocating
            | TorrentState::CheckingResumeData => TaskStatus::Preparing,
            TorrentState::DownloadingMetadata => TaskStatus::DownloadingMetadata,
            TorrentState::Downloading => TaskStatus::Downloading,
            TorrentState::Finished => TaskStatus::Complete,
            TorrentState::Seeding => TaskStatus::Seeding,
        }
    }
}

/// Per-file download priority within a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    Ignore,
    Low,
    Normal,
    High,
}

impl FilePriority {
    /// Compact single-character form for persisting a priority list.
    pub fn as_char(self) -> char {
        match self {
            FilePriority::Ignore => '-',
            FilePriority::Low => 'L',
            FilePriority::Normal => 'N',
            FilePriority::High => 'H',
        }
    }

    pub fn from_char(c: char) -> Self {
        match c {
            '-' => FilePriority::Ignore,
            'L' => FilePriority::Low,
            'H' => FilePriority::High,
            _ => FilePriority::Normal,
        }
    }
}

/// Encode a priority list as a compact string (one char per file).
pub fn encode_priorities(priorities: &[FilePriority]) -> String {
    priorities.iter().map(|p| p.as_char()).collect()
}

/// Decode a compact priority string back into a list.
pub fn decode_priorities(s: &str) -> Vec<FilePriority> {
    s.chars().map(FilePriority::from_char).collect()
}

/// Progress snapshot for one torrent session.
#[derive(Debug, Clone)]
pub struct TorrentProgress {
    pub state: TorrentState,
    pub bytes_done: u64,
    pub total_size: Option<u64>,
}

/// Interface the engine consumes; implemented by the external session
/// backend. All methods are fallible so backend failures route through
/// the same classification as transport errors.
pub trait TorrentBackend: Send + Sync {
    /// Register a magnet link or .torrent path; returns a weak handle.
    fn add(&self, source: &str, download_dir: &Path) -> Result<TorrentHandle, TransferError>;
    /// Current progress for a handle.
    fn progress(&self, handle: TorrentHandle) -> Result<TorrentProgress, TransferError>;
    /// Apply per-file priorities.
    fn set_file_priorities(
        &self,
        handle: TorrentHandle,
        priorities: &[FilePriority],
    ) -> Result<(), TransferError>;
    fn pause(&self, handle: TorrentHandle) -> Result<(), TransferError>;
    fn resume(&self, handle: TorrentHandle) -> Result<(), TransferError>;
    /// Drop the session; optionally delete downloaded files.
    fn remove(&self, handle: TorrentHandle, delete_files: bool) -> Result<(), TransferError>;
}

/// Backend-less placeholder used when no torrent backend is wired in;
/// every call reports the torrent as unsupported.
pub struct NoTorrentBackend;

impl TorrentBackend for NoTorrentBackend {
    fn add(&self, _source: &str, _download_dir: &Path) -> Result<TorrentHandle, TransferError> {
        Err(TransferError::BadMetadata(
            "no torrent backend configured".to_string(),
        ))
    }

    fn progress(&self, _handle: TorrentHandle) -> Result<TorrentProgress, TransferError> {
        Err(TransferError::BadMetadata(
            "no torrent backend configured".to_string(),
        ))
    }

    fn set_file_priorities(
        &self,
        _handle: TorrentHandle,
        _priorities: &[FilePriority],
    ) -> Result<(), TransferError> {
        Ok(())
    }

    fn pause(&self, _handle: TorrentHandle) -> Result<(), TransferError> {
        Ok(())
    }

    fn resume(&self, _handle: TorrentHandle) -> Result<(), TransferError> {
        Ok(())
    }

    fn remove(&self, _handle: TorrentHandle, _delete_files: bool) -> Result<(), TransferError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_backend_state_maps_to_a_task_status() {
        let all = [
            TorrentState::Stopped,
            TorrentState::CheckingFiles,
            TorrentState::DownloadingMetadata,
            TorrentState::Downloading,
            TorrentState::Finished,
            TorrentState::Seeding,
            TorrentState::Allocating,
            TorrentState::CheckingResumeData,
        ];
        for s in all {
            // No panic and a sensible status for each backend state.
            let _ = s.task_status();
        }
        assert_eq!(TorrentState::Downloading.task_status(), TaskStatus::Downloading);
        assert_eq!(TorrentState::Finished.task_status(), TaskStatus::Complete);
        assert_eq!(TorrentState::Seeding.task_status(), TaskStatus::Seeding);
        assert_eq!(TorrentState::Stopped.task_status(), TaskStatus::Paused);
    }

    #[test]
    fn priority_string_roundtrip() {
        let list = [
            FilePriority::Ignore,
            FilePriority::Low,
            FilePriority::Normal,
            FilePriority::High,
        ];
        let s = encode_priorities(&list);
        assert_eq!(s, "-LNH");
        assert_eq!(decode_priorities(&s), list.to_vec());
    }

    #[test]
    fn unknown_priority_char_defaults_to_normal() {
        assert_eq!(decode_priorities("x"), vec![FilePriority::Normal]);
    }
}
