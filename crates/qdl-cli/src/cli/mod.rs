//! CLI for the qdl download queue manager.

mod commands;

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use qdl_core::config;
use qdl_core::engine::{Engine, EngineOptions};
use qdl_core::queue_db::QueueDb;
use qdl_core::task::TaskId;
use std::path::Path;

use commands::{
    run_add, run_cancel, run_checksum, run_dedupe, run_force_start, run_pause, run_priorities,
    run_queue, run_remove, run_reorder, run_resume, run_segments, run_status,
};

/// Top-level CLI for the qdl download queue manager.
#[derive(Debug, Parser)]
#[command(name = "qdl")]
#[command(about = "qdl: multi-protocol download queue manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add a new download task to the queue.
    Add {
        /// URL, magnet link, .torrent path, page URL, or batch pattern.
        source: String,

        /// Task kind: direct, torrent, or stream. Detected from the
        /// source when omitted.
        #[arg(long, value_name = "KIND")]
        kind: Option<String>,

        /// Destination directory (default from config, else cwd).
        #[arg(long, value_name = "DIR")]
        dir: Option<String>,

        /// Referrer header sent with the download.
        #[arg(long)]
        referrer: Option<String>,

        /// Expected SHA-256 digest, verified before the file is renamed
        /// into place.
        #[arg(long, value_name = "HEX")]
        checksum: Option<String>,

        /// Enqueue paused instead of schedulable.
        #[arg(long)]
        paused: bool,

        /// Expand a `[start-end]` numeric pattern into one task per URL.
        #[arg(long)]
        batch: bool,
    },

    /// Run the queue until nothing is schedulable, printing progress.
    Run,

    /// Show every task in queue order.
    Status,

    /// Pause a task; completed segment bytes are kept.
    Pause {
        /// Task identifier.
        id: TaskId,
    },

    /// Make a paused, canceled, or errored task schedulable again.
    Resume {
        /// Task identifier.
        id: TaskId,
    },

    /// Cancel a task, keeping partial files on disk.
    Cancel {
        /// Task identifier.
        id: TaskId,
    },

    /// Remove a task from the queue.
    Remove {
        /// Task identifier.
        id: TaskId,

        /// Also delete the partial and final files.
        #[arg(long)]
        delete_files: bool,
    },

    /// Move a task to a new queue position (0 = front).
    Reorder {
        /// Task identifier.
        id: TaskId,
        /// New queue index.
        index: usize,
    },

    /// Start a task immediately, bypassing the concurrency budget.
    ForceStart {
        /// Task identifier.
        id: TaskId,
    },

    /// Change a task's segment count (applied at the next planning
    /// boundary; a running transfer re-splits its unfetched bytes).
    Segments {
        /// Task identifier.
        id: TaskId,
        /// Requested segment count (clamped to configured bounds).
        count: usize,
    },

    /// Set per-file priorities on a torrent task (one char per file:
    /// `-` skip, `L` low, `N` normal, `H` high).
    Priorities {
        /// Task identifier.
        id: TaskId,
        /// Priority string, e.g. "NN-H".
        priorities: String,
    },

    /// Remove tasks duplicating an earlier task's source and destination.
    Dedupe,

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: String,
    },

    /// Generate shell completions on stdout.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },

    /// Generate the man page on stdout.
    Man,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        // Shell plumbing commands need no config or database.
        match &cli.command {
            CliCommand::Completions { shell } => {
                let mut cmd = Cli::command();
                clap_complete::generate(*shell, &mut cmd, "qdl", &mut std::io::stdout());
                return Ok(());
            }
            CliCommand::Man => {
                let man = clap_mangen::Man::new(Cli::command());
                man.render(&mut std::io::stdout())?;
                return Ok(());
            }
            _ => {}
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = QueueDb::open_default().await?;
        let engine = Engine::new(db, EngineOptions::new(cfg)).await?;

        match cli.command {
            CliCommand::Add {
                source,
                kind,
                dir,
                referrer,
                checksum,
                paused,
                batch,
            } => {
                let kind = match kind.as_deref() {
                    None => None,
                    Some("direct") => Some("direct"),
                    Some("torrent") => Some("torrent"),
                    Some("stream") => Some("stream"),
                    Some(other) => bail!("unknown task kind {:?}", other),
                };
                run_add(&engine, &source, kind, dir, referrer, checksum, paused, batch).await?;
            }
            CliCommand::Run => run_queue(&engine).await?,
            CliCommand::Status => run_status(&engine).await?,
            CliCommand::Pause { id } => run_pause(&engine, id).await?,
            CliCommand::Resume { id } => run_resume(&engine, id).await?,
            CliCommand::Cancel { id } => run_cancel(&engine, id).await?,
            CliCommand::Remove { id, delete_files } => {
                run_remove(&engine, id, delete_files).await?;
            }
            CliCommand::Reorder { id, index } => run_reorder(&engine, id, index).await?,
            CliCommand::ForceStart { id } => run_force_start(&engine, id).await?,
            CliCommand::Segments { id, count } => run_segments(&engine, id, count).await?,
            CliCommand::Priorities { id, priorities } => {
                run_priorities(&engine, id, &priorities).await?;
            }
            CliCommand::Dedupe => run_dedupe(&engine).await?,
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
            CliCommand::Completions { .. } | CliCommand::Man => unreachable!(),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
