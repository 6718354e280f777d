//! `qdl dedupe` - drop tasks repeating an earlier source + destination.

use anyhow::Result;
use qdl_core::engine::Engine;

pub async fn run_dedupe(engine: &Engine) -> Result<()> {
    let removed = engine.remove_duplicates().await?;
    if removed == 0 {
        println!("No duplicate tasks.");
    } else {
        println!("Removed {removed} duplicate task(s).");
    }
    Ok(())
}
