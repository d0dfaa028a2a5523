pub mod calendar;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod occurrence;
pub mod storage;
pub mod sync;
pub mod todoist;

use tokio::sync::watch;

pub use calendar::{CalendarEvent, CalendarSource, GoogleCalendar, TimeWindow};
pub use config::{Config, ConfigSource};
pub use error::{Error, Result};
pub use occurrence::{Occurrence, When};
pub use storage::{Database, RecordCounts, RunSummary, SyncRecord};
pub use sync::{CalendarBinding, RunId, RunReport};
pub use todoist::{RetryPolicy, RetryingTaskClient, TaskClient, TodoistClient};

use sync::{discovery, Runner};

/// Keeps Todoist tasks in step with calendar events.
pub struct CalTasks {
    config: Config,
    db: Database,
    tasks: Box<dyn TaskClient>,
    calendars: Box<dyn CalendarSource>,
}

impl CalTasks {
    pub fn new(
        config: Config,
        db: Database,
        tasks: Box<dyn TaskClient>,
        calendars: Box<dyn CalendarSource>,
    ) -> Self {
        Self {
            config,
            db,
            tasks,
            calendars,
        }
    }

    /// Build the Todoist and Google Calendar clients from `config`.
    /// Missing credentials are a configuration error.
    pub fn connect(config: Config, db: Database) -> Result<Self> {
        let todoist = TodoistClient::new(config.require_todoist_token()?)?;
        let tasks = RetryingTaskClient::new(todoist, config.retry_policy());
        let google = GoogleCalendar::new(config.require_google_token()?)?;
        Ok(Self::new(config, db, Box::new(tasks), Box::new(google)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    fn runner(&self) -> Runner<'_> {
        Runner::new(&self.config, &self.db, self.tasks.as_ref(), self.calendars.as_ref())
    }

    pub async fn run_once(&self) -> Result<RunReport> {
        self.runner().run_once().await
    }

    /// Run on the configured interval until `shutdown` is set.
    pub async fn run_forever(&self, shutdown: watch::Receiver<bool>) {
        self.runner()
            .run_forever(self.config.run_interval(), shutdown)
            .await
    }

    /// The calendar bindings the next run would use.
    pub async fn calendars(&self) -> Result<Vec<CalendarBinding>> {
        discovery::resolve_calendars(
            self.tasks.as_ref(),
            &self.config.calendars,
            &self.config.default_project,
        )
        .await
    }
}
