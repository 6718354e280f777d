//! `qdl add <source>` - enqueue a new download task.

use anyhow::Result;
use qdl_core::engine::{AddRequest, Engine};

#[allow(clippy::too_many_arguments)]
pub async fn run_add(
    engine: &Engine,
    source: &str,
    kind: Option<&'static str>,
    dir: Option<String>,
    referrer: Option<String>,
    checksum: Option<String>,
    paused: bool,
    batch: bool,
) -> Result<()> {
    let req = AddRequest {
        source: source.to_string(),
        kind,
        download_dir: dir,
        referrer,
        checksum_sha256: checksum,
        paused,
        expand_batch: batch,
    };
    let ids = engine.add(req).await?;
    if ids.len() == 1 {
        println!("Added task {} for source: {source}", ids[0]);
    } else {
        println!("Added {} tasks from pattern: {source}", ids.len());
        for id in ids {
            println!("  task {id}");
        }
    }
    Ok(())
}
