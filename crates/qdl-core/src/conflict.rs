//! Destination conflict resolution.
//!
//! Before a task moves from Preparing to Connecting, an existing file at
//! the resolved destination asks the collaborator for a decision:
//! rename to a non-colliding name, overwrite (truncated only at
//! finishing time, never before), or skip the task entirely.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::naming;

/// Configured default behavior when a destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Derive a non-colliding name with a numeric suffix.
    #[default]
    Rename,
    /// Keep the name; the existing file is replaced at finishing time.
    Overwrite,
    /// Skip the task (terminal).
    Skip,
}

/// Decision applied to one conflicting task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    Rename,
    Overwrite,
    Skip,
}

/// Decision callback implemented by the presentation layer. The engine
/// only consumes the decision; prompting the user is not its concern.
pub trait ConflictResolver: Send + Sync {
    fn decide(&self, existing: &Path) -> ConflictDecision;
}

/// Resolver that always answers with the configured policy (the
/// "ask-but-default" collaborator when nobody is asking).
pub struct PolicyResolver(pub ConflictPolicy);

impl ConflictResolver for PolicyResolver {
    fn decide(&self, _existing: &Path) -> ConflictDecision {
        match self.0 {
            ConflictPolicy::Rename => ConflictDecision::Rename,
            ConflictPolicy::Overwrite => ConflictDecision::Overwrite,
            ConflictPolicy::Skip => ConflictDecision::Skip,
        }
    }
}

/// Outcome of resolving a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Proceed with this filename; `overwrite` marks deferred truncation.
    Proceed { filename: String, overwrite: bool },
    /// Conflict decision was Skip; the task becomes Skipped.
    Skip,
}

/// Resolves `candidate` within `dir`, consulting `resolver` only when
/// the path already exists. `reserved` holds names other queued tasks
/// already claimed in the same directory, so two tasks never race to
/// the same final destination.
pub fn resolve_destination(
    dir: &Path,
    candidate: &str,
    reserved: &[String],
    resolver: &dyn ConflictResolver,
) -> Resolution {
    let exists = dir.join(candidate).exists() || reserved.iter().any(|r| r == candidate);
    if !exists {
        return Resolution::Proceed {
            filename: candidate.to_string(),
            overwrite: false,
        };
    }
    match resolver.decide(&dir.join(candidate)) {
        ConflictDecision::Rename => Resolution::Proceed {
            filename: naming::unique_filename(dir, candidate, reserved),
            overwrite: false,
        },
        ConflictDecision::Overwrite => Resolution::Proceed {
            filename: candidate.to_string(),
            overwrite: true,
        },
        ConflictDecision::Skip => Resolution::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_conflict_keeps_name() {
        let dir = tempfile::tempdir().unwrap();
        let r = resolve_destination(dir.path(), "new.bin", &[], &PolicyResolver(ConflictPolicy::Skip));
        assert_eq!(
            r,
            Resolution::Proceed {
                filename: "new.bin".to_string(),
                overwrite: false
            }
        );
    }

    #[test]
    fn rename_produces_non_colliding_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.iso"), b"x").unwrap();
        let r = resolve_destination(dir.path(), "data.iso", &[], &PolicyResolver(ConflictPolicy::Rename));
        match r {
            Resolution::Proceed {
                filename,
                overwrite,
            } => {
                assert_ne!(filename, "data.iso");
                assert!(!dir.path().join(&filename).exists());
                assert!(!overwrite);
            }
            Resolution::Skip => panic!("should not skip"),
        }
    }

    #[test]
    fn overwrite_defers_truncation() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.iso"), b"keep me").unwrap();
        let r = resolve_destination(dir.path(), "data.iso", &[], &PolicyResolver(ConflictPolicy::Overwrite));
        assert_eq!(
            r,
            Resolution::Proceed {
                filename: "data.iso".to_string(),
                overwrite: true
            }
        );
        // The existing file is untouched until finishing time.
        assert_eq!(std::fs::read(dir.path().join("data.iso")).unwrap(), b"keep me");
    }

    #[test]
    fn skip_decision_skips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.iso"), b"x").unwrap();
        let r = resolve_destination(dir.path(), "data.iso", &[], &PolicyResolver(ConflictPolicy::Skip));
        assert_eq!(r, Resolution::Skip);
    }

    #[test]
    fn reserved_names_count_as_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let reserved = vec!["data.iso".to_string()];
        let r = resolve_destination(dir.path(), "data.iso", &reserved, &PolicyResolver(ConflictPolicy::Rename));
        match r {
            Resolution::Proceed { filename, .. } => assert_ne!(filename, "data.iso"),
            Resolution::Skip => panic!("should rename"),
        }
    }
}
