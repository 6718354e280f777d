//! Scheduler tick: decide which tasks to admit.
//!
//! Pure function over the queue so admission policy is testable without
//! any network or clock. The engine calls it whenever the queue, the
//! config, or a retry deadline changes.

use crate::task::{Task, TaskId};

/// Picks the tasks to admit right now.
///
/// Rules, in order:
/// - tasks flagged `force_start` bypass the budget entirely;
/// - everything else is admitted in queue-position order while the
///   number of admitted tasks stays under `max_concurrent`;
/// - a task waiting out a retry delay (`next_retry_at` in the future)
///   is not eligible, budget or not;
/// - a `ServerError` task with no retry scheduled has exhausted its
///   budget and waits for a manual restart.
pub fn plan_admissions(tasks: &[Task], max_concurrent: usize, now: i64) -> Vec<TaskId> {
    let mut running = tasks.iter().filter(|t| t.status.is_admitted()).count();
    let mut admit = Vec::new();

    let mut candidates: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status.is_schedulable())
        .filter(|t| match t.status {
            crate::task::TaskStatus::ServerError => t.next_retry_at.map_or(false, |at| at <= now),
            _ => t.next_retry_at.map_or(true, |at| at <= now),
        })
        .collect();
    candidates.sort_by_key(|t| (t.position, t.id));

    for t in candidates {
        if t.force_start {
            admit.push(t.id);
        } else if running < max_concurrent {
            admit.push(t.id);
            running += 1;
        }
    }
    admit
}

/// Earliest pending retry deadline, for scheduling the next wakeup.
pub fn next_retry_deadline(tasks: &[Task], now: i64) -> Option<i64> {
    tasks
        .iter()
        .filter(|t| t.status.is_schedulable())
        .filter_map(|t| t.next_retry_at)
        .filter(|&at| at > now)
        .min()
}
