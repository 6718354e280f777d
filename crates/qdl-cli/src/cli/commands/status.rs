//! `qdl status` - show every task in queue order.

use anyhow::Result;
use qdl_core::engine::Engine;

pub async fn run_status(engine: &Engine) -> Result<()> {
    let snaps = engine.snapshots().await;
    if snaps.is_empty() {
        println!("No tasks in queue.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:<8} {:<10} {:<10} {}",
        "ID", "STATE", "KIND", "DONE", "SIZE", "SOURCE"
    );
    for s in snaps {
        let size = s
            .total_size
            .map(|v| format!("{v}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<12} {:<8} {:<10} {:<10} {}",
            s.id,
            s.status.as_str(),
            s.kind,
            s.bytes_done,
            size,
            s.source
        );
        if let Some(err) = &s.error {
            println!("       last error: {}", err.message);
        }
    }
    let stats = engine.stats().await;
    println!(
        "{} task(s): {} active, {} completed, {} errored",
        stats.total, stats.active, stats.completed, stats.errored
    );
    Ok(())
}
