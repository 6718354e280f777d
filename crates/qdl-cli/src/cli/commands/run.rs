//! `qdl run` - drive the queue until nothing is schedulable.

use anyhow::Result;
use qdl_core::engine::{Engine, EngineEvent};
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;

const PROGRESS_INTERVAL_MS: u64 = 500;

pub async fn run_queue(engine: &Engine) -> Result<()> {
    let mut events = engine.subscribe();
    let progress_handle = tokio::spawn(async move {
        let mut last_print = Instant::now();
        loop {
            let event = match events.recv().await {
                Ok(e) => e,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            let EngineEvent::TaskChanged(snap) = event else {
                continue;
            };
            let now = Instant::now();
            let done = snap
                .fraction
                .map(|f| f >= 1.0)
                .unwrap_or(false);
            if now.duration_since(last_print).as_millis() as u64 >= PROGRESS_INTERVAL_MS || done {
                let done_mib = snap.bytes_done as f64 / 1_048_576.0;
                let pct = snap
                    .fraction
                    .map(|f| format!("{:.1}%", f * 100.0))
                    .unwrap_or_else(|| "?".to_string());
                let rate_mib = snap.bytes_per_sec / 1_048_576.0;
                let eta = snap
                    .eta_secs()
                    .map(|s| format!("{s:.0}s"))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "  task {}: {:.1} MiB ({})  {:.2} MiB/s  ETA {}",
                    snap.id, done_mib, pct, rate_mib, eta
                );
                last_print = now;
            }
        }
    });

    engine.run_until_idle().await?;
    progress_handle.abort();
    let _ = progress_handle.await;

    let stats = engine.stats().await;
    if stats.total == 0 {
        println!("No tasks in queue.");
    } else {
        println!(
            "Run finished: {} completed, {} errored of {} task(s).",
            stats.completed, stats.errored, stats.total
        );
    }
    Ok(())
}
