//! State store operations used by the reconciler.
//!
//! Every call goes through the writer connection and returns only after
//! SQLite has committed it.

use chrono::{DateTime, SecondsFormat, Utc};

use super::repository::{self, RecordCounts, RunSummary, SyncRecord};
use super::Database;
use crate::error::Result;
use crate::sync::{RunId, RunReport};

/// How many runs the journal keeps.
const RUN_HISTORY: u32 = 1000;

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Database {
    /// Mark an occurrence as seen during `run`, creating its record if needed.
    pub async fn upsert_seen(&self, event_id: &str, index: u32, due_date: &str, run: RunId) -> Result<()> {
        let event_id = event_id.to_string();
        let due_date = due_date.to_string();
        self.writer()
            .call(move |conn| repository::upsert_seen(conn, &event_id, index, &due_date, run.0))
            .await?;
        Ok(())
    }

    pub async fn set_task_id(&self, event_id: &str, index: u32, task_id: &str) -> Result<()> {
        let event_id = event_id.to_string();
        let task_id = task_id.to_string();
        let found = self
            .writer()
            .call(move |conn| repository::set_task_id(conn, &event_id, index, &task_id))
            .await?;
        if !found {
            log::warn!("No sync record to attach task id to");
        }
        Ok(())
    }

    pub async fn set_completed(&self, event_id: &str, index: u32, completed: bool) -> Result<()> {
        let event_id = event_id.to_string();
        self.writer()
            .call(move |conn| repository::set_completed(conn, &event_id, index, completed))
            .await?;
        Ok(())
    }

    pub async fn get_record(&self, event_id: &str, index: u32) -> Result<Option<SyncRecord>> {
        let event_id = event_id.to_string();
        Ok(self
            .writer()
            .call(move |conn| repository::get_record(conn, &event_id, index))
            .await?)
    }

    /// Records that `run` did not touch.
    pub async fn unattached(&self, run: RunId) -> Result<Vec<SyncRecord>> {
        Ok(self
            .writer()
            .call(move |conn| repository::unattached_records(conn, run.0))
            .await?)
    }

    pub async fn delete_record(&self, record: &SyncRecord) -> Result<()> {
        let id = record.id;
        self.writer()
            .call(move |conn| repository::delete_record(conn, id))
            .await?;
        Ok(())
    }

    // ── Run journal ────────────────────────────────────────────────

    /// Allocate the id of a new run and journal its start.
    ///
    /// Ids are millisecond timestamps, bumped past the previous run's id when
    /// the clock has not moved forward, so two runs never share one.
    pub async fn begin_run(&self, now: DateTime<Utc>) -> Result<RunId> {
        let candidate = now.timestamp_millis();
        let started_at = timestamp(now);
        let id = self
            .writer()
            .call(move |conn| {
                let id = match repository::last_run_id(conn)? {
                    Some(last) if last >= candidate => last + 1,
                    _ => candidate,
                };
                repository::insert_run(conn, id, &started_at)?;
                Ok::<i64, rusqlite::Error>(id)
            })
            .await?;
        Ok(RunId(id))
    }

    pub async fn finish_run(&self, report: &RunReport, now: DateTime<Utc>) -> Result<()> {
        let report = report.clone();
        let finished_at = timestamp(now);
        self.writer()
            .call(move |conn| {
                repository::finish_run(
                    conn,
                    report.run_id.0,
                    &finished_at,
                    "success",
                    report.created,
                    report.updated,
                    report.completed,
                    report.deleted,
                    None,
                )?;
                repository::prune_runs(conn, RUN_HISTORY)
            })
            .await?;
        Ok(())
    }

    pub async fn fail_run(&self, run: RunId, error: &str, now: DateTime<Utc>) -> Result<()> {
        let error = error.to_string();
        let finished_at = timestamp(now);
        self.writer()
            .call(move |conn| {
                repository::finish_run(conn, run.0, &finished_at, "failed", 0, 0, 0, 0, Some(&error))?;
                repository::prune_runs(conn, RUN_HISTORY)
            })
            .await?;
        Ok(())
    }

    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunSummary>> {
        Ok(self
            .reader()
            .call(move |conn| repository::recent_runs(conn, limit))
            .await?)
    }

    pub async fn list_records(&self) -> Result<Vec<SyncRecord>> {
        Ok(self.reader().call(|conn| repository::list_records(conn)).await?)
    }

    pub async fn record_counts(&self) -> Result<RecordCounts> {
        Ok(self.reader().call(|conn| repository::record_counts(conn)).await?)
    }
}
