//! Bounded worker pool for segmented transfers.
//!
//! One OS thread per worker (libcurl Easy handles are blocking), a
//! shared work queue of incomplete segments, and an orchestrator loop
//! that folds per-chunk byte deltas back into the segment table. The
//! caller runs this from `spawn_blocking`; progress snapshots go out on
//! a tokio channel with `try_send` so a slow consumer never stalls the
//! transfer.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use crate::segment::{Segment, SegmentTable};
use crate::storage::PartFile;

mod transfer;
use transfer::CurlOptions;

/// Message from a worker thread to the orchestrator.
pub(crate) enum WorkerMsg {
    /// Bytes landed for a segment (one chunk).
    Progress { index: usize, delta: u64 },
    /// A segment finished, successfully or not.
    Finished {
        index: usize,
        result: Result<(), TransferError>,
    },
}

/// Options for one transfer run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker thread cap (also bounded by incomplete segment count).
    pub max_workers: usize,
    /// Per-segment retry policy; `None` disables retries.
    pub retry_policy: Option<RetryPolicy>,
    /// Stall window passed to curl's low-speed abort.
    pub stall_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            max_workers: 4,
            retry_policy: Some(RetryPolicy::default()),
            stall_timeout: Duration::from_secs(60),
        }
    }
}

/// Forward a table snapshot after this many bytes of new progress.
const SNAPSHOT_EVERY_BYTES: u64 = 256 * 1024;

/// Runs all incomplete segments of `table` against `url`, writing into
/// `part`. The table is updated in place as bytes arrive, so on any
/// return (success, error, abort) it reflects exactly what is on disk.
///
/// On the first non-retryable failure the queue is drained and in-flight
/// workers are told to stop; the first error is returned. A set abort
/// token surfaces as `TransferError::Aborted`.
pub fn run_segments(
    url: &str,
    custom_headers: &HashMap<String, String>,
    part: &PartFile,
    table: &mut SegmentTable,
    opts: &RunOptions,
    abort: Arc<AtomicBool>,
    snapshot_tx: Option<&tokio::sync::mpsc::Sender<SegmentTable>>,
) -> Result<(), TransferError> {
    let incomplete = table.incomplete();
    if incomplete.is_empty() {
        return Ok(());
    }

    let expected = incomplete.len();
    let work: Arc<Mutex<VecDeque<(usize, Segment)>>> =
        Arc::new(Mutex::new(incomplete.into_iter().collect()));
    let fatal = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<WorkerMsg>();

    let num_workers = opts.max_workers.max(1).min(expected);
    let curl_opts = CurlOptions {
        stall_timeout: opts.stall_timeout,
    };
    let mut handles = Vec::with_capacity(num_workers);
    for _ in 0..num_workers {
        let work = Arc::clone(&work);
        let tx = tx.clone();
        let fatal = Arc::clone(&fatal);
        let abort = Arc::clone(&abort);
        let url = url.to_string();
        let headers = custom_headers.clone();
        let part = part.clone();
        let policy = opts.retry_policy;
        handles.push(std::thread::spawn(move || loop {
            if fatal.load(Ordering::Relaxed) || abort.load(Ordering::Relaxed) {
                break;
            }
            let (index, segment) = match work.lock().unwrap().pop_front() {
                Some(pair) => pair,
                None => break,
            };
            // The running count survives retries of this segment, so a
            // second attempt resumes mid-segment instead of refetching.
            let already = Arc::new(AtomicU64::new(segment.received));
            let result = match policy.as_ref() {
                Some(p) => run_with_retry(p, || {
                    transfer::download_segment_tail(
                        &url, &headers, index, &segment, &already, &part, &abort, &tx, curl_opts,
                    )
                }),
                None => transfer::download_segment_tail(
                    &url, &headers, index, &segment, &already, &part, &abort, &tx, curl_opts,
                ),
            };
            let _ = tx.send(WorkerMsg::Finished { index, result });
        }));
    }
    drop(tx);

    let mut first_error: Option<TransferError> = None;
    let mut to_finish = expected;
    let mut bytes_since_snapshot = 0u64;
    while to_finish > 0 {
        let msg = match rx.recv() {
            Ok(m) => m,
            Err(_) => {
                // All senders gone with segments outstanding: a worker
                // panicked or bailed on the abort flag.
                if first_error.is_none() {
                    first_error = Some(if abort.load(Ordering::Relaxed) {
                        TransferError::Aborted
                    } else {
                        TransferError::Stalled
                    });
                }
                break;
            }
        };
        match msg {
            WorkerMsg::Progress { index, delta } => {
                table.record_received(index, delta);
                bytes_since_snapshot += delta;
                if bytes_since_snapshot >= SNAPSHOT_EVERY_BYTES {
                    if let Some(tx) = snapshot_tx {
                        let _ = tx.try_send(table.clone());
                    }
                    bytes_since_snapshot = 0;
                }
            }
            WorkerMsg::Finished { index, result } => {
                to_finish -= 1;
                match result {
                    Ok(()) => {
                        table.mark_done(index);
                        if let Some(tx) = snapshot_tx {
                            let _ = tx.try_send(table.clone());
                            bytes_since_snapshot = 0;
                        }
                    }
                    Err(e) => {
                        table.mark_failed(index);
                        // Retries already ran inside the worker, so any
                        // error that reaches here ends the run: stop
                        // handing out work and let in-flight workers
                        // drain.
                        fatal.store(true, Ordering::Relaxed);
                        let drained = {
                            let mut q = work.lock().unwrap();
                            let n = q.len();
                            q.clear();
                            n
                        };
                        to_finish = to_finish.saturating_sub(drained);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }
        }
    }
    if let Some(tx) = snapshot_tx {
        let _ = tx.try_send(table.clone());
    }
    for h in handles {
        if h.join().is_err() && first_error.is_none() {
            first_error = Some(TransferError::Stalled);
        }
    }

    if abort.load(Ordering::Relaxed) && first_error.is_none() {
        first_error = Some(TransferError::Aborted);
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Sequential transfer for a resource whose size the server would not
/// reveal. Byte deltas are coalesced and forwarded on `delta_tx` so the
/// caller can show progress without a segment table. Returns the final
/// byte count on success.
pub fn run_unsized(
    url: &str,
    custom_headers: &HashMap<String, String>,
    part: &PartFile,
    opts: &RunOptions,
    abort: Arc<AtomicBool>,
    delta_tx: Option<&tokio::sync::mpsc::Sender<u64>>,
) -> Result<u64, TransferError> {
    let (tx, rx) = mpsc::channel::<WorkerMsg>();
    let forwarder = match delta_tx {
        Some(out) => {
            let out = out.clone();
            Some(std::thread::spawn(move || {
                let mut pending = 0u64;
                for msg in rx {
                    if let WorkerMsg::Progress { delta, .. } = msg {
                        pending += delta;
                        if pending >= SNAPSHOT_EVERY_BYTES {
                            let _ = out.try_send(pending);
                            pending = 0;
                        }
                    }
                }
                if pending > 0 {
                    let _ = out.try_send(pending);
                }
            }))
        }
        None => {
            drop(rx);
            None
        }
    };
    let curl_opts = CurlOptions {
        stall_timeout: opts.stall_timeout,
    };
    let result = transfer::download_unknown_size(url, custom_headers, part, &abort, &tx, curl_opts);
    drop(tx);
    if let Some(h) = forwarder {
        let _ = h.join();
    }
    result
}
