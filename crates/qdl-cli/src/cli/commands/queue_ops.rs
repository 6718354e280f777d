//! Single-task queue commands: pause, resume, cancel, remove, reorder,
//! force-start, segments.

use anyhow::Result;
use qdl_core::engine::Engine;
use qdl_core::task::TaskId;

pub async fn run_pause(engine: &Engine, id: TaskId) -> Result<()> {
    engine.pause(id).await?;
    println!("Paused task {id}.");
    Ok(())
}

pub async fn run_resume(engine: &Engine, id: TaskId) -> Result<()> {
    engine.resume(id).await?;
    println!("Resumed task {id}.");
    Ok(())
}

pub async fn run_cancel(engine: &Engine, id: TaskId) -> Result<()> {
    engine.cancel(id).await?;
    println!("Canceled task {id}.");
    Ok(())
}

pub async fn run_remove(engine: &Engine, id: TaskId, delete_files: bool) -> Result<()> {
    engine.remove(id, delete_files).await?;
    if delete_files {
        println!("Removed task {id} and its files.");
    } else {
        println!("Removed task {id}.");
    }
    Ok(())
}

pub async fn run_reorder(engine: &Engine, id: TaskId, index: usize) -> Result<()> {
    engine.reorder(id, index).await?;
    println!("Moved task {id} to position {index}.");
    Ok(())
}

pub async fn run_force_start(engine: &Engine, id: TaskId) -> Result<()> {
    engine.force_start(id).await?;
    println!("Task {id} will start on the next pass, ignoring the budget.");
    Ok(())
}

pub async fn run_segments(engine: &Engine, id: TaskId, count: usize) -> Result<()> {
    engine.set_segment_count(id, count).await?;
    println!("Task {id} segment count set to {count} (applies at the next planning boundary).");
    Ok(())
}
