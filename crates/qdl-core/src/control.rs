//! Task control: shared abort tokens for pause/cancel.
//!
//! Each admitted task registers an abort token. A pause or cancel
//! command sets the token; workers observe it inside the transfer write
//! callback and stop before any file handle is released. Requesting an
//! abort twice, or for an unknown task, is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::task::TaskId;

/// Shared registry of task id -> abort token.
#[derive(Default)]
pub struct TaskControl {
    tokens: RwLock<HashMap<TaskId, Arc<AtomicBool>>>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task about to run; returns the abort token to pass to
    /// its workers.
    pub fn register(&self, id: TaskId) -> Arc<AtomicBool> {
        let token = Arc::new(AtomicBool::new(false));
        self.tokens.write().unwrap().insert(id, Arc::clone(&token));
        token
    }

    /// Unregister when the task's run ends (success or failure).
    pub fn unregister(&self, id: TaskId) {
        self.tokens.write().unwrap().remove(&id);
    }

    /// Request abort. Idempotent; unknown ids are ignored.
    pub fn request_abort(&self, id: TaskId) {
        if let Some(token) = self.tokens.read().unwrap().get(&id) {
            token.store(true, Ordering::Relaxed);
        }
    }

    /// True while the task has a live (registered) run.
    pub fn is_running(&self, id: TaskId) -> bool {
        self.tokens.read().unwrap().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_sets_registered_token() {
        let ctl = TaskControl::new();
        let token = ctl.register(1);
        assert!(!token.load(Ordering::Relaxed));
        ctl.request_abort(1);
        assert!(token.load(Ordering::Relaxed));
    }

    #[test]
    fn abort_is_idempotent_and_ignores_unknown() {
        let ctl = TaskControl::new();
        let token = ctl.register(7);
        ctl.request_abort(7);
        ctl.request_abort(7);
        ctl.request_abort(999);
        assert!(token.load(Ordering::Relaxed));
    }

    #[test]
    fn unregister_removes_token() {
        let ctl = TaskControl::new();
        let _ = ctl.register(3);
        assert!(ctl.is_running(3));
        ctl.unregister(3);
        assert!(!ctl.is_running(3));
        ctl.request_abort(3); // no-op
    }
}
