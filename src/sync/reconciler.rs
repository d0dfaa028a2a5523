use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};

use crate::calendar::{CalendarEvent, CalendarSource, TimeWindow};
use crate::config::Config;
use crate::eligibility::{self, Ineligible};
use crate::error::Result;
use crate::occurrence::{self, Occurrence};
use crate::storage::Database;
use crate::sync::render::TaskTarget;
use crate::sync::{CalendarBinding, RunId, RunReport};
use crate::todoist::{TaskClient, TaskSnapshot};

/// Tasks of one project as listed at the start of a run, by id.
type Snapshot = HashMap<String, TaskSnapshot>;

/// Snapshots of every bound project, by project id.
type Snapshots = HashMap<String, Snapshot>;

/// The event being handled and the binding it came through.
struct EventContext<'e> {
    event: &'e CalendarEvent,
    binding: &'e CalendarBinding,
}

/// One reconciliation pass over a set of calendar bindings.
///
/// Any error aborts the pass before the cleanup sweep, so a failed run never
/// deletes tasks it simply did not get to.
pub struct Reconciler<'a> {
    config: &'a Config,
    db: &'a Database,
    tasks: &'a dyn TaskClient,
    calendars: &'a dyn CalendarSource,
}

impl<'a> Reconciler<'a> {
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

    pub async fn run(&self, run: RunId, bindings: &[CalendarBinding], now: DateTime<Local>) -> Result<RunReport> {
        let mut report = RunReport::new(run);
        let window = TimeWindow::upcoming(now.with_timezone(&Utc), self.config.days_to_fetch);
        let mut snapshots = Snapshots::new();
        for binding in bindings {
            if let Entry::Vacant(entry) = snapshots.entry(binding.project_id.clone()) {
                let listed = self.tasks.list_tasks(&binding.project_id).await?;
                entry.insert(listed.into_iter().map(|t| (t.id.clone(), t)).collect());
            }
        }

        for binding in bindings {
            report.calendars += 1;
            log::info!(
                "Syncing calendar {} into project {}",
                binding.calendar_id,
                binding.project_id
            );

            let events = self.calendars.events_for(&binding.calendar_id, &window).await?;
            for event in &events {
                report.events += 1;
                if occurrence::is_malformed(event) {
                    log::warn!("Skipping event '{}' ({}): ends before it starts", event.title, event.id);
                    continue;
                }
                let ctx = EventContext { event, binding };
                for occ in occurrence::expand(event) {
                    self.handle_occurrence(&ctx, &occ, run, now, &mut snapshots, &mut report)
                        .await?;
                }
            }
        }

        self.cleanup(run, &mut report).await?;
        Ok(report)
    }

    async fn handle_occurrence(
        &self,
        ctx: &EventContext<'_>,
        occ: &Occurrence,
        run: RunId,
        now: DateTime<Local>,
        snapshots: &mut Snapshots,
        report: &mut RunReport,
    ) -> Result<()> {
        log::info!("Handling task '{}'[{}]", ctx.event.title, occ.index);

        match eligibility::check(ctx.event, occ, &ctx.binding.calendar_id, now) {
            Ok(()) => {}
            Err(Ineligible::Declined) => {
                log::info!("- Skipping due to event");
                report.skipped_declined += 1;
                return Ok(());
            }
            Err(Ineligible::Past) => {
                log::info!("- Skipping due to date");
                report.skipped_past += 1;
                return Ok(());
            }
        }

        self.db
            .upsert_seen(&ctx.event.id, occ.index, &occ.when.due_key(), run)
            .await?;
        let record = self.db.get_record(&ctx.event.id, occ.index).await?;
        let target = TaskTarget::for_occurrence(self.config, ctx.event, occ);

        match record.and_then(|r| r.task_id.map(|id| (id, r.completed))) {
            Some((_, true)) => {
                log::info!("- Task is considered done.");
                report.skipped_done += 1;
                Ok(())
            }
            Some((task_id, false)) => {
                self.reconcile_existing(ctx, occ, &target, &task_id, snapshots, report)
                    .await
            }
            None => {
                log::info!("- Adding task");
                self.create(ctx, occ, &target, snapshots, report).await
            }
        }
    }

    /// A record's task is looked up in every bound project, so an event shown
    /// on calendars feeding different projects keeps the one task it has.
    async fn reconcile_existing(
        &self,
        ctx: &EventContext<'_>,
        occ: &Occurrence,
        target: &TaskTarget,
        task_id: &str,
        snapshots: &mut Snapshots,
        report: &mut RunReport,
    ) -> Result<()> {
        let Some(task) = snapshots.values_mut().find_map(|s| s.get_mut(task_id)) else {
            log::info!("- Task {task_id} is gone, adding it again");
            return self.create(ctx, occ, target, snapshots, report).await;
        };

        if task.has_label(&self.config.completed_label) && !task.is_completed {
            log::info!("- Forcefully completing labeled task");
            match self.tasks.close_task(task_id).await {
                Ok(()) => report.completed += 1,
                Err(e) if e.is_not_found() => log::info!("- Task {task_id} was already removed"),
                Err(e) => return Err(e),
            }
            self.db.set_completed(&ctx.event.id, occ.index, true).await?;
            task.is_completed = true;
            return Ok(());
        }

        if !target.differs_from(task) {
            log::debug!("- Task is up to date");
            report.unchanged += 1;
            return Ok(());
        }

        log::info!("- Updating task");
        match self.tasks.update_task(task_id, &target.update()).await {
            Ok(updated) => {
                report.updated += 1;
                *task = updated;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                log::info!("- Task {task_id} is gone, adding it again");
                for snapshot in snapshots.values_mut() {
                    snapshot.remove(task_id);
                }
                self.create(ctx, occ, target, snapshots, report).await
            }
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        ctx: &EventContext<'_>,
        occ: &Occurrence,
        target: &TaskTarget,
        snapshots: &mut Snapshots,
        report: &mut RunReport,
    ) -> Result<()> {
        let new_task = target.new_task(&ctx.binding.project_id, &self.config.label);
        let created = self.tasks.create_task(&new_task).await?;
        self.db
            .set_task_id(&ctx.event.id, occ.index, &created.id)
            .await?;
        report.created += 1;
        snapshots
            .entry(ctx.binding.project_id.clone())
            .or_default()
            .insert(created.id.clone(), created);
        Ok(())
    }

    /// Delete every record `run` did not touch, and its task.
    async fn cleanup(&self, run: RunId, report: &mut RunReport) -> Result<()> {
        log::info!("Starting cleanup");
        for record in self.db.unattached(run).await? {
            if let Some(task_id) = record.task_id.as_deref() {
                log::info!(
                    "Deleting task {task_id} of {}[{}]",
                    record.event_id,
                    record.event_index
                );
                match self.tasks.delete_task(task_id).await {
                    Ok(()) => report.deleted += 1,
                    Err(e) if e.is_not_found() => log::debug!("Task {task_id} already deleted"),
                    Err(e) => return Err(e),
                }
            }
            self.db.delete_record(&record).await?;
        }
        Ok(())
    }
}
