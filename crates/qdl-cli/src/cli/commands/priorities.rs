//! `qdl priorities <id> <string>` - per-file priorities for a torrent.

use anyhow::Result;
use qdl_core::engine::Engine;
use qdl_core::task::TaskId;

pub async fn run_priorities(engine: &Engine, id: TaskId, priorities: &str) -> Result<()> {
    engine.set_file_priorities(id, priorities).await?;
    println!("Set priorities on task {id}: {priorities}");
    Ok(())
}
