//! Single ranged GET writing one segment into the partial file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use crate::retry::TransferError;
use crate::segment::Segment;
use crate::storage::PartFile;

use super::WorkerMsg;

/// Curl knobs shared by every segment request of a task.
#[derive(Debug, Clone, Copy)]
pub(super) struct CurlOptions {
    /// Abort when throughput stays below 1 KiB/s for this long.
    pub stall_timeout: Duration,
}

/// Downloads the unfetched tail of `segment`, writing at the correct
/// offsets and reporting byte deltas as they land. `already` carries the
/// running received count so a retry of the same segment resumes where
/// the last attempt stopped. Returns `Aborted` promptly once the abort
/// token is set; the write callback returns 0 to make curl stop.
#[allow(clippy::too_many_arguments)]
pub(super) fn download_segment_tail(
    url: &str,
    custom_headers: &HashMap<String, String>,
    index: usize,
    segment: &Segment,
    already: &Arc<AtomicU64>,
    part: &PartFile,
    abort: &Arc<AtomicBool>,
    progress: &mpsc::Sender<WorkerMsg>,
    opts: CurlOptions,
) -> Result<(), TransferError> {
    let offset = segment.start + already.load(Ordering::Relaxed);
    if offset >= segment.end {
        return Ok(());
    }

    let storage_error: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));
    let aborted_in_cb = Arc::new(AtomicBool::new(false));

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::Curl)?;
    easy.follow_location(true).map_err(TransferError::Curl)?;
    // A 4xx/5xx response must never reach the write callback: its body
    // (an HTML error page, usually) would land in the part file at the
    // segment offset and count as received bytes.
    easy.fail_on_error(true).map_err(TransferError::Curl)?;
    easy.connect_timeout(Duration::from_secs(30))
        .map_err(TransferError::Curl)?;
    // Stall detection: curl kills the transfer when throughput drops
    // below 1 KiB/s for the stall interval. No hard wall-clock timeout;
    // large segments on slow links are fine as long as bytes flow.
    easy.low_speed_limit(1024).map_err(TransferError::Curl)?;
    easy.low_speed_time(opts.stall_timeout)
        .map_err(TransferError::Curl)?;

    // curl expects "start-end" (inclusive), no "bytes=" prefix.
    let range_str = format!("{}-{}", offset, segment.end - 1);
    easy.range(&range_str).map_err(TransferError::Curl)?;

    let mut list = curl::easy::List::new();
    for (k, v) in custom_headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))
            .map_err(TransferError::Curl)?;
    }
    if !custom_headers.is_empty() {
        easy.http_headers(list).map_err(TransferError::Curl)?;
    }

    let performed = {
        let received = Arc::clone(already);
        let storage_error_cb = Arc::clone(&storage_error);
        let aborted_cb = Arc::clone(&aborted_in_cb);
        let abort = Arc::clone(abort);
        let part = part.clone();
        let progress = progress.clone();
        let segment_start = segment.start;

        let mut transfer = easy.transfer();
        transfer
            .write_function(move |data| {
                if abort.load(Ordering::Relaxed) {
                    aborted_cb.store(true, Ordering::Relaxed);
                    return Ok(0);
                }
                let off = segment_start + received.load(Ordering::Relaxed);
                match part.write_at(off, data) {
                    Ok(()) => {
                        received.fetch_add(data.len() as u64, Ordering::Relaxed);
                        let _ = progress.send(WorkerMsg::Progress {
                            index,
                            delta: data.len() as u64,
                        });
                        Ok(data.len())
                    }
                    Err(e) => {
                        let _ = storage_error_cb.lock().unwrap().replace(e);
                        Ok(0)
                    }
                }
            })
            .map_err(TransferError::Curl)?;
        transfer.perform()
    };
    if let Err(e) = performed {
        if e.is_write_error() {
            if aborted_in_cb.load(Ordering::Relaxed) {
                return Err(TransferError::Aborted);
            }
            if let Some(io_err) = storage_error.lock().unwrap().take() {
                return Err(TransferError::Storage(io_err));
            }
        }
        // fail_on_error reports error statuses as a curl-level failure
        // after the headers; recover the code so classification sees it.
        if e.is_http_returned_error() {
            let code = easy.response_code().map_err(TransferError::Curl)? as u32;
            return Err(TransferError::Http(code));
        }
        return Err(TransferError::Curl(e));
    }

    let code = easy.response_code().map_err(TransferError::Curl)? as u32;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }
    // A 200 to a nonzero-offset range request means the server ignored
    // the range and sent the whole body; the write offsets above would
    // be wrong, so bail rather than corrupt the file.
    if code == 200 && offset > 0 {
        return Err(TransferError::BadMetadata(
            "server ignored range request".to_string(),
        ));
    }

    let received = already.load(Ordering::Relaxed);
    if received < segment.len() {
        // Server closed early without a curl-level error. Retryable; the
        // next attempt resumes from the running count.
        return Err(TransferError::Stalled);
    }

    Ok(())
}

/// Sequential GET for a resource of unknown size (no Content-Length, no
/// range support). Writes from offset 0 and returns the byte count.
pub(super) fn download_unknown_size(
    url: &str,
    custom_headers: &HashMap<String, String>,
    part: &PartFile,
    abort: &Arc<AtomicBool>,
    progress: &mpsc::Sender<WorkerMsg>,
    opts: CurlOptions,
) -> Result<u64, TransferError> {
    let received = Arc::new(AtomicU64::new(0));
    let storage_error: Arc<Mutex<Option<std::io::Error>>> = Arc::new(Mutex::new(None));
    let aborted_in_cb = Arc::new(AtomicBool::new(false));

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::Curl)?;
    easy.follow_location(true).map_err(TransferError::Curl)?;
    easy.fail_on_error(true).map_err(TransferError::Curl)?;
    easy.connect_timeout(Duration::from_secs(30))
        .map_err(TransferError::Curl)?;
    easy.low_speed_limit(1024).map_err(TransferError::Curl)?;
    easy.low_speed_time(opts.stall_timeout)
        .map_err(TransferError::Curl)?;

    let mut list = curl::easy::List::new();
    for (k, v) in custom_headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))
            .map_err(TransferError::Curl)?;
    }
    if !custom_headers.is_empty() {
        easy.http_headers(list).map_err(TransferError::Curl)?;
    }

    let performed = {
        let received_cb = Arc::clone(&received);
        let storage_error_cb = Arc::clone(&storage_error);
        let aborted_cb = Arc::clone(&aborted_in_cb);
        let abort = Arc::clone(abort);
        let part = part.clone();
        let progress = progress.clone();

        let mut transfer = easy.transfer();
        transfer
            .write_function(move |data| {
                if abort.load(Ordering::Relaxed) {
                    aborted_cb.store(true, Ordering::Relaxed);
                    return Ok(0);
                }
                let off = received_cb.load(Ordering::Relaxed);
                match part.write_at(off, data) {
                    Ok(()) => {
                        received_cb.fetch_add(data.len() as u64, Ordering::Relaxed);
                        let _ = progress.send(WorkerMsg::Progress {
                            index: 0,
                            delta: data.len() as u64,
                        });
                        Ok(data.len())
                    }
                    Err(e) => {
                        let _ = storage_error_cb.lock().unwrap().replace(e);
                        Ok(0)
                    }
                }
            })
            .map_err(TransferError::Curl)?;
        transfer.perform()
    };
    if let Err(e) = performed {
        if e.is_write_error() {
            if aborted_in_cb.load(Ordering::Relaxed) {
                return Err(TransferError::Aborted);
            }
            if let Some(io_err) = storage_error.lock().unwrap().take() {
                return Err(TransferError::Storage(io_err));
            }
        }
        if e.is_http_returned_error() {
            let code = easy.response_code().map_err(TransferError::Curl)? as u32;
            return Err(TransferError::Http(code));
        }
        return Err(TransferError::Curl(e));
    }

    let code = easy.response_code().map_err(TransferError::Curl)? as u32;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    Ok(received.load(Ordering::Relaxed))
}
