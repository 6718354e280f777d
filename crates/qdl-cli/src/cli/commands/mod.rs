//! CLI command handlers. Each command is in its own file for clarity.

mod add;
mod checksum;
mod dedupe;
mod priorities;
mod queue_ops;
mod run;
mod status;

pub use add::run_add;
pub use checksum::run_checksum;
pub use dedupe::run_dedupe;
pub use priorities::run_priorities;
pub use queue_ops::{
    run_cancel, run_force_start, run_pause, run_remove, run_reorder, run_resume, run_segments,
};
pub use run::run_queue;
pub use status::run_status;
