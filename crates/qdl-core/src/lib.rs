pub mod config;
pub mod logging;

pub mod batch;
pub mod checksum;
pub mod conflict;
pub mod control;
pub mod engine;
pub mod fetch_head;
pub mod naming;
pub mod queue_db;
pub mod retry;
pub mod segment;
pub mod speed;
pub mod storage;
pub mod stream;
pub mod task;
pub mod torrent;
pub mod worker;
