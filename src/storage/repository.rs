use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Persisted link between an occurrence and its remote task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRecord {
    pub id: i64,
    pub event_id: String,
    pub event_index: u32,
    pub due_date: String,
    pub task_id: Option<String>,
    pub completed: bool,
    pub run_id: i64,
}

impl SyncRecord {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            event_id: row.get(1)?,
            event_index: row.get(2)?,
            due_date: row.get(3)?,
            task_id: row.get(4)?,
            completed: row.get::<_, i64>(5)? != 0,
            run_id: row.get(6)?,
        })
    }
}

const RECORD_COLUMNS: &str = "id, event_id, event_index, due_date, task_id, completed, run_id";

// ── Sync records ───────────────────────────────────────────────────

/// Insert a record for the occurrence, or refresh `due_date` and `run_id` of
/// the existing one. Task id and completion are left untouched.
pub fn upsert_seen(
    conn: &Connection,
    event_id: &str,
    event_index: u32,
    due_date: &str,
    run_id: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_records (event_id, event_index, due_date, run_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(event_id, event_index) DO UPDATE SET
            due_date = excluded.due_date,
            run_id = excluded.run_id,
            updated_at = datetime('now')",
        params![event_id, event_index, due_date, run_id],
    )?;
    Ok(())
}

pub fn set_task_id(
    conn: &Connection,
    event_id: &str,
    event_index: u32,
    task_id: &str,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE sync_records SET task_id = ?3, updated_at = datetime('now')
         WHERE event_id = ?1 AND event_index = ?2",
        params![event_id, event_index, task_id],
    )?;
    Ok(n > 0)
}

pub fn set_completed(
    conn: &Connection,
    event_id: &str,
    event_index: u32,
    completed: bool,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE sync_records SET completed = ?3, updated_at = datetime('now')
         WHERE event_id = ?1 AND event_index = ?2",
        params![event_id, event_index, completed as i32],
    )?;
    Ok(n > 0)
}

pub fn get_record(
    conn: &Connection,
    event_id: &str,
    event_index: u32,
) -> Result<Option<SyncRecord>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM sync_records WHERE event_id = ?1 AND event_index = ?2"),
        params![event_id, event_index],
        SyncRecord::from_row,
    )
    .optional()
}

/// Records not touched by `run_id`.
pub fn unattached_records(conn: &Connection, run_id: i64) -> Result<Vec<SyncRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM sync_records WHERE run_id != ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![run_id], SyncRecord::from_row)?;
    rows.collect()
}

pub fn delete_record(conn: &Connection, id: i64) -> Result<bool, rusqlite::Error> {
    let n = conn.execute("DELETE FROM sync_records WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

pub fn list_records(conn: &Connection) -> Result<Vec<SyncRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM sync_records ORDER BY due_date, event_id, event_index"
    ))?;
    let rows = stmt.query_map([], SyncRecord::from_row)?;
    rows.collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub total: u64,
    pub with_task: u64,
    pub completed: u64,
}

pub fn record_counts(conn: &Connection) -> Result<RecordCounts, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN task_id IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(completed), 0)
         FROM sync_records",
        [],
        |row| {
            Ok(RecordCounts {
                total: row.get::<_, i64>(0)? as u64,
                with_task: row.get::<_, i64>(1)? as u64,
                completed: row.get::<_, i64>(2)? as u64,
            })
        },
    )
}

// ── Run journal ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub created: u64,
    pub updated: u64,
    pub completed: u64,
    pub deleted: u64,
    pub error: Option<String>,
}

pub fn last_run_id(conn: &Connection) -> Result<Option<i64>, rusqlite::Error> {
    conn.query_row("SELECT MAX(run_id) FROM sync_runs", [], |row| row.get(0))
}

pub fn insert_run(conn: &Connection, run_id: i64, started_at: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_runs (run_id, started_at, status) VALUES (?1, ?2, 'running')",
        params![run_id, started_at],
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn finish_run(
    conn: &Connection,
    run_id: i64,
    finished_at: &str,
    status: &str,
    created: u64,
    updated: u64,
    completed: u64,
    deleted: u64,
    error: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sync_runs SET finished_at = ?2, status = ?3, created = ?4, updated = ?5,
            completed = ?6, deleted = ?7, error = ?8
         WHERE run_id = ?1",
        params![
            run_id,
            finished_at,
            status,
            created as i64,
            updated as i64,
            completed as i64,
            deleted as i64,
            error
        ],
    )?;
    Ok(())
}

/// Drop all but the `keep` most recent runs.
pub fn prune_runs(conn: &Connection, keep: u32) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM sync_runs WHERE run_id NOT IN
            (SELECT run_id FROM sync_runs ORDER BY run_id DESC LIMIT ?1)",
        params![keep],
    )
}

pub fn recent_runs(conn: &Connection, limit: u32) -> Result<Vec<RunSummary>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, finished_at, status, created, updated, completed, deleted, error
         FROM sync_runs ORDER BY run_id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(RunSummary {
            run_id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            status: row.get(3)?,
            created: row.get::<_, i64>(4)? as u64,
            updated: row.get::<_, i64>(5)? as u64,
            completed: row.get::<_, i64>(6)? as u64,
            deleted: row.get::<_, i64>(7)? as u64,
            error: row.get(8)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[tokio::test]
    async fn test_upsert_seen_preserves_task_fields() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_seen(conn, "ev1", 0, "2024-01-01", 100)?;
                assert!(set_task_id(conn, "ev1", 0, "task-1")?);
                assert!(set_completed(conn, "ev1", 0, true)?);

                upsert_seen(conn, "ev1", 0, "2024-01-02", 200)?;

                let record = get_record(conn, "ev1", 0)?.unwrap();
                assert_eq!(record.due_date, "2024-01-02");
                assert_eq!(record.run_id, 200);
                assert_eq!(record.task_id.as_deref(), Some("task-1"));
                assert!(record.completed);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_record_per_occurrence() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_seen(conn, "ev1", 0, "2024-01-01", 1)?;
                upsert_seen(conn, "ev1", 0, "2024-01-01", 2)?;
                upsert_seen(conn, "ev1", 1, "2024-01-02", 2)?;
                upsert_seen(conn, "ev2", 0, "2024-01-01", 2)?;

                assert_eq!(list_records(conn)?.len(), 3);
                let counts = record_counts(conn)?;
                assert_eq!(counts.total, 3);
                assert_eq!(counts.with_task, 0);
                assert_eq!(counts.completed, 0);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_missing_record() {
        let db = Database::open_memory().await.unwrap();
        let record = db
            .reader()
            .call(|conn| get_record(conn, "nope", 0))
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_set_task_id_on_missing_record_is_noop() {
        let db = Database::open_memory().await.unwrap();
        let changed = db
            .writer()
            .call(|conn| set_task_id(conn, "nope", 0, "t"))
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_unattached_and_delete() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_seen(conn, "old", 0, "2024-01-01", 1)?;
                upsert_seen(conn, "kept", 0, "2024-01-01", 2)?;
                upsert_seen(conn, "older", 3, "2023-12-01", 0)?;

                let stale = unattached_records(conn, 2)?;
                let keys: Vec<(&str, u32)> = stale
                    .iter()
                    .map(|r| (r.event_id.as_str(), r.event_index))
                    .collect();
                assert_eq!(keys, vec![("old", 0), ("older", 3)]);

                for record in &stale {
                    assert!(delete_record(conn, record.id)?);
                }
                assert!(unattached_records(conn, 2)?.is_empty());
                assert!(get_record(conn, "kept", 0)?.is_some());
                assert!(!delete_record(conn, stale[0].id)?);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_journal_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                assert_eq!(last_run_id(conn)?, None);

                insert_run(conn, 10, "2024-01-01T00:00:00Z")?;
                insert_run(conn, 20, "2024-01-01T00:05:00Z")?;
                finish_run(conn, 10, "2024-01-01T00:00:03Z", "success", 2, 1, 0, 3, None)?;
                finish_run(conn, 20, "2024-01-01T00:05:01Z", "failed", 0, 0, 0, 0, Some("boom"))?;

                assert_eq!(last_run_id(conn)?, Some(20));

                let runs = recent_runs(conn, 10)?;
                assert_eq!(runs.len(), 2);
                assert_eq!(runs[0].run_id, 20);
                assert_eq!(runs[0].status, "failed");
                assert_eq!(runs[0].error.as_deref(), Some("boom"));
                assert_eq!(runs[1].created, 2);
                assert_eq!(runs[1].deleted, 3);

                assert_eq!(recent_runs(conn, 1)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_prune_keeps_latest_runs() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                for run_id in 1..=5 {
                    insert_run(conn, run_id, "2024-01-01T00:00:00Z")?;
                }
                assert_eq!(prune_runs(conn, 2)?, 3);
                let kept: Vec<i64> = recent_runs(conn, 10)?.iter().map(|r| r.run_id).collect();
                assert_eq!(kept, vec![5, 4]);
                assert_eq!(last_run_id(conn)?, Some(5));
                assert_eq!(prune_runs(conn, 2)?, 0);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
