use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::watch;

use crate::calendar::CalendarSource;
use crate::config::Config;
use crate::error::Result;
use crate::storage::Database;
use crate::sync::discovery;
use crate::sync::reconciler::Reconciler;
use crate::sync::{RunId, RunReport};
use crate::todoist::TaskClient;

/// Drives reconciliation passes and journals each one.
pub struct Runner<'a> {
    config: &'a Config,
    db: &'a Database,
    tasks: &'a dyn TaskClient,
    calendars: &'a dyn CalendarSource,
}

impl<'a> Runner<'a> {
    pub fn new(
        config: &'a Config,
        db: &'a Database,
        tasks: &'a dyn TaskClient,
        calendars: &'a dyn CalendarSource,
    ) -> Self {
        Self {
            config,
            db,
            tasks,
            calendars,
        }
    }

    pub async fn run_once(&self) -> Result<RunReport> {
        self.run_once_at(Local::now()).await
    }

    /// One pass as of `now`. Failures are journaled and returned.
    pub async fn run_once_at(&self, now: DateTime<Local>) -> Result<RunReport> {
        let run = self.db.begin_run(now.with_timezone(&Utc)).await?;
        log::info!("Run {run}");

        match self.pass(run, now).await {
            Ok(report) => {
                self.db.finish_run(&report, Utc::now()).await?;
                log::info!("Finished {report}");
                Ok(report)
            }
            Err(e) => {
                if let Err(journal) = self.db.fail_run(run, &e.to_string(), Utc::now()).await {
                    log::warn!("Could not journal failure of run {run}: {journal}");
                }
                Err(e)
            }
        }
    }

    async fn pass(&self, run: RunId, now: DateTime<Local>) -> Result<RunReport> {
        let bindings = discovery::resolve_calendars(
            self.tasks,
            &self.config.calendars,
            &self.config.default_project,
        )
        .await?;
        if bindings.is_empty() {
            log::warn!(
                "No calendars configured under project '{}'",
                self.config.default_project
            );
        }
        Reconciler::new(self.config, self.db, self.tasks, self.calendars)
            .run(run, &bindings, now)
            .await
    }

    /// Run passes until `shutdown` turns true or its sender goes away,
    /// waiting `interval` between them. A failed pass is logged and the loop
    /// goes on. Shutdown is only observed between passes.
    pub async fn run_forever(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_once().await {
                log::error!("Run failed: {e}");
            }
            if *shutdown.borrow() {
                break;
            }
            log::debug!("Next run in {} seconds", interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        log::info!("Stopped");
    }
}
