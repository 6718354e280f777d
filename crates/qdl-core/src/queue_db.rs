//! Persistent queue database (SQLite via sqlx).
//!
//! Every task row carries the full state-machine record: kind payload,
//! segment table, classified error, retry bookkeeping, and queue
//! position. Saved on durable transitions and coalesced progress, not on
//! every chunk. Tasks that were mid-transfer when the process died load
//! back as Paused so nothing auto-starts with stale worker state.

use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::retry::ErrorCategory;
use crate::segment::SegmentTable;
use crate::task::{Task, TaskError, TaskId, TaskKind, TaskStatus};

/// Handle to the SQLite-backed task queue.
///
/// The database file lives under the XDG state directory:
/// `~/.local/state/qdl/queue.db`.
#[derive(Clone)]
pub struct QueueDb {
    pool: Pool<Sqlite>,
}

impl QueueDb {
    /// Open (or create) the default queue database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("qdl")?;
        let state_dir = xdg_dirs.get_state_home();
        tokio::fs::create_dir_all(&state_dir).await?;
        Self::open_at(&state_dir.join("queue.db")).await
    }

    /// Open (or create) a queue database at an explicit path.
    pub async fn open_at(path: &Path) -> Result<Self> {
        let uri = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(&uri)
            .await
            .with_context(|| format!("open queue db at {}", path.display()))?;
        let db = QueueDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database (tests). Single connection so the pool
    /// never hands back a different empty database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = QueueDb { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        // Single-table schema. Kind payload and segment table are JSON:
        // the shapes differ per kind and evolve faster than the queue
        // columns the scheduler actually indexes on.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind_json TEXT NOT NULL,
                source TEXT NOT NULL,
                referrer TEXT,
                download_dir TEXT NOT NULL,
                final_filename TEXT,
                temp_filename TEXT,
                total_size INTEGER,
                external_bytes INTEGER NOT NULL DEFAULT 0,
                segments_json TEXT NOT NULL DEFAULT '{"total":0,"segments":[]}',
                status TEXT NOT NULL,
                error_category TEXT,
                error_message TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                next_retry_at INTEGER,
                position INTEGER NOT NULL DEFAULT 0,
                force_start INTEGER NOT NULL DEFAULT 0,
                pending_segment_count INTEGER,
                checksum_sha256 TEXT,
                overwrite INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a new task and return it with its row id, creation stamp,
    /// and a queue position after every existing task.
    pub async fn insert(&self, mut task: Task) -> Result<Task> {
        let now = unix_timestamp();
        task.created_at = now;
        task.updated_at = now;
        let position: i64 = sqlx::query("SELECT COALESCE(MAX(position), -1) + 1 AS p FROM tasks")
            .fetch_one(&self.pool)
            .await?
            .get("p");
        task.position = position;

        let kind_json = serde_json::to_string(&task.kind)?;
        let segments_json = serde_json::to_string(&task.segments)?;
        let (error_category, error_message) = error_columns(&task)?;

        let id = sqlx::query(
            r#"
            INSERT INTO tasks (
                kind_json, source, referrer, download_dir,
                final_filename, temp_filename, total_size, external_bytes,
                segments_json, status, error_category, error_message,
                retry_count, next_retry_at, position, force_start,
                pending_segment_count, checksum_sha256, overwrite,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                      ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            "#,
        )
        .bind(&kind_json)
        .bind(&task.source)
        .bind(&task.referrer)
        .bind(&task.download_dir)
        .bind(&task.final_filename)
        .bind(&task.temp_filename)
        .bind(task.total_size.map(|n| n as i64))
        .bind(task.external_bytes as i64)
        .bind(&segments_json)
        .bind(task.status.as_str())
        .bind(&error_category)
        .bind(&error_message)
        .bind(task.retry_count as i64)
        .bind(task.next_retry_at)
        .bind(task.position)
        .bind(task.force_start as i64)
        .bind(task.pending_segment_count.map(|n| n as i64))
        .bind(&task.checksum_sha256)
        .bind(task.overwrite as i64)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        task.id = id;
        Ok(task)
    }

    /// Persist the full mutable state of an existing task.
    pub async fn save(&self, task: &Task) -> Result<()> {
        let now = unix_timestamp();
        let kind_json = serde_json::to_string(&task.kind)?;
        let segments_json = serde_json::to_string(&task.segments)?;
        let (error_category, error_message) = error_columns(task)?;

        sqlx::query(
            r#"
            UPDATE tasks SET
                kind_json = ?1, referrer = ?2,
                final_filename = ?3, temp_filename = ?4,
                total_size = ?5, external_bytes = ?6, segments_json = ?7,
                status = ?8, error_category = ?9, error_message = ?10,
                retry_count = ?11, next_retry_at = ?12, position = ?13,
                force_start = ?14, pending_segment_count = ?15,
                checksum_sha256 = ?16, overwrite = ?17, updated_at = ?18
            WHERE id = ?19
            "#,
        )
        .bind(&kind_json)
        .bind(&task.referrer)
        .bind(&task.final_filename)
        .bind(&task.temp_filename)
        .bind(task.total_size.map(|n| n as i64))
        .bind(task.external_bytes as i64)
        .bind(&segments_json)
        .bind(task.status.as_str())
        .bind(&error_category)
        .bind(&error_message)
        .bind(task.retry_count as i64)
        .bind(task.next_retry_at)
        .bind(task.position)
        .bind(task.force_start as i64)
        .bind(task.pending_segment_count.map(|n| n as i64))
        .bind(&task.checksum_sha256)
        .bind(task.overwrite as i64)
        .bind(now)
        .bind(task.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist only the segment table of a running task (coalesced
    /// progress updates).
    pub async fn save_segments(&self, id: TaskId, segments: &SegmentTable) -> Result<()> {
        let json = serde_json::to_string(segments)?;
        sqlx::query("UPDATE tasks SET segments_json = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&json)
            .bind(unix_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist queue positions for just the rows that moved, in one
    /// transaction.
    pub async fn save_positions(&self, rows: &[(TaskId, i64)]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        for (id, position) in rows {
            sqlx::query("UPDATE tasks SET position = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(*position)
                .bind(now)
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load the whole queue in position order. Tasks persisted in an
    /// admitted state come back as Paused: their workers died with the
    /// process, so they must wait for an explicit or scheduled start.
    pub async fn load_all(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY position ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut task = task_from_row(&row)?;
            if task.status.is_admitted() {
                task.status = TaskStatus::Paused;
                task.segments.release_workers();
            }
            out.push(task);
        }
        Ok(out)
    }

    /// Permanently delete a task row. File cleanup happens above.
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn error_columns(task: &Task) -> Result<(Option<String>, Option<String>)> {
    match &task.error {
        Some(e) => Ok((
            Some(serde_json::to_string(&e.category)?),
            Some(e.message.clone()),
        )),
        None => Ok((None, None)),
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    let kind_json: String = row.get("kind_json");
    let kind: TaskKind = serde_json::from_str(&kind_json).context("task kind payload")?;
    let segments_json: String = row.get("segments_json");
    let segments: SegmentTable = serde_json::from_str(&segments_json).context("segment table")?;
    let status_str: String = row.get("status");
    let status = TaskStatus::from_str(&status_str);

    let error = match row.get::<Option<String>, _>("error_category") {
        Some(cat_json) => {
            let category: ErrorCategory =
                serde_json::from_str(&cat_json).context("error category")?;
            Some(TaskError {
                category,
                message: row
                    .get::<Option<String>, _>("error_message")
                    .unwrap_or_default(),
            })
        }
        None => None,
    };

    Ok(Task {
        id: row.get("id"),
        kind,
        source: row.get("source"),
        referrer: row.get("referrer"),
        download_dir: row.get("download_dir"),
        final_filename: row.get("final_filename"),
        temp_filename: row.get("temp_filename"),
        total_size: row.get::<Option<i64>, _>("total_size").map(|n| n as u64),
        external_bytes: row.get::<i64, _>("external_bytes") as u64,
        segments,
        status,
        error,
        retry_count: row.get::<i64, _>("retry_count") as u32,
        next_retry_at: row.get("next_retry_at"),
        position: row.get("position"),
        force_start: row.get::<i64, _>("force_start") != 0,
        pending_segment_count: row
            .get::<Option<i64>, _>("pending_segment_count")
            .map(|n| n as usize),
        checksum_sha256: row.get("checksum_sha256"),
        overwrite: row.get::<i64, _>("overwrite") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(source: &str) -> Task {
        Task::new(0, TaskKind::direct(), source.to_string(), "/tmp".to_string())
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_positions() {
        let db = QueueDb::open_memory().await.unwrap();
        let a = db.insert(new_task("https://a.example/one")).await.unwrap();
        let b = db.insert(new_task("https://b.example/two")).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);

        let all = db.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, "https://a.example/one");
        assert_eq!(all[1].source, "https://b.example/two");
    }

    #[tokio::test]
    async fn full_record_roundtrip() {
        let db = QueueDb::open_memory().await.unwrap();
        let mut t = new_task("https://example.com/big.iso");
        t.referrer = Some("https://example.com/downloads".into());
        t.final_filename = Some("big.iso".into());
        t.temp_filename = Some("big.iso.part".into());
        t.total_size = Some(1000);
        t.segments = SegmentTable::plan(1000, 4);
        t.segments.record_received(0, 250);
        t.segments.record_received(1, 100);
        t.retry_count = 2;
        t.next_retry_at = Some(1_700_000_000);
        t.checksum_sha256 = Some("deadbeef".into());
        t.overwrite = true;
        t.set_error(ErrorCategory::Server(503), "HTTP 503");
        let t = db.insert(t).await.unwrap();

        let all = db.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        let back = &all[0];
        assert_eq!(back.id, t.id);
        assert_eq!(back.referrer.as_deref(), Some("https://example.com/downloads"));
        assert_eq!(back.total_size, Some(1000));
        assert_eq!(back.segments.bytes_done(), 350);
        assert_eq!(back.retry_count, 2);
        assert_eq!(back.next_retry_at, Some(1_700_000_000));
        assert!(back.overwrite);
        assert_eq!(
            back.error.as_ref().unwrap().category,
            ErrorCategory::Server(503)
        );
    }

    #[tokio::test]
    async fn admitted_status_loads_as_paused() {
        let db = QueueDb::open_memory().await.unwrap();
        let mut t = new_task("https://example.com/file.bin");
        t.total_size = Some(100);
        t.segments = SegmentTable::plan(100, 2);
        t.segments.mark_active(0);
        t.segments.record_received(0, 30);
        let mut t = db.insert(t).await.unwrap();
        t.status = TaskStatus::Downloading;
        db.save(&t).await.unwrap();

        let all = db.load_all().await.unwrap();
        assert_eq!(all[0].status, TaskStatus::Paused);
        // Progress survives; worker claims do not.
        assert_eq!(all[0].segments.bytes_done(), 30);
        assert!(all[0]
            .segments
            .segments()
            .iter()
            .all(|s| s.status != crate::segment::SegmentStatus::Active));
    }

    #[tokio::test]
    async fn terminal_status_loads_unchanged() {
        let db = QueueDb::open_memory().await.unwrap();
        let mut t = db.insert(new_task("https://example.com/x")).await.unwrap();
        t.status = TaskStatus::Complete;
        db.save(&t).await.unwrap();
        let all = db.load_all().await.unwrap();
        assert_eq!(all[0].status, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn remove_deletes_row() {
        let db = QueueDb::open_memory().await.unwrap();
        let t = db.insert(new_task("https://example.com/x")).await.unwrap();
        db.remove(t.id).await.unwrap();
        assert!(db.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_positions_moves_only_named_rows() {
        let db = QueueDb::open_memory().await.unwrap();
        let a = db.insert(new_task("https://e.com/a")).await.unwrap();
        let b = db.insert(new_task("https://e.com/b")).await.unwrap();
        let c = db.insert(new_task("https://e.com/c")).await.unwrap();

        // Swap b and c; a is untouched.
        db.save_positions(&[(b.id, 2), (c.id, 1)]).await.unwrap();
        let all = db.load_all().await.unwrap();
        assert_eq!(
            all.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![a.id, c.id, b.id]
        );

        db.save_positions(&[]).await.unwrap();
    }

    #[tokio::test]
    async fn save_segments_updates_progress_only() {
        let db = QueueDb::open_memory().await.unwrap();
        let mut t = new_task("https://example.com/y");
        t.segments = SegmentTable::plan(100, 2);
        let t = db.insert(t).await.unwrap();

        let mut table = SegmentTable::plan(100, 2);
        table.record_received(0, 50);
        db.save_segments(t.id, &table).await.unwrap();

        let all = db.load_all().await.unwrap();
        assert_eq!(all[0].segments.bytes_done(), 50);
        assert_eq!(all[0].status, TaskStatus::Idle);
    }
}
