pub mod discovery;
pub mod reconciler;
pub mod render;
pub mod runner;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use reconciler::Reconciler;
pub use runner::Runner;

/// Identifies one reconciliation pass. Stamped onto every record the pass
/// touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunId(pub i64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A calendar whose events are mirrored into a task project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarBinding {
    pub project_id: String,
    pub calendar_id: String,
}

/// Counters of what a single pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub calendars: u64,
    pub events: u64,
    pub created: u64,
    pub updated: u64,
    pub completed: u64,
    pub deleted: u64,
    pub unchanged: u64,
    pub skipped_declined: u64,
    pub skipped_past: u64,
    pub skipped_done: u64,
}

impl RunReport {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            calendars: 0,
            events: 0,
            created: 0,
            updated: 0,
            completed: 0,
            deleted: 0,
            unchanged: 0,
            skipped_declined: 0,
            skipped_past: 0,
            skipped_done: 0,
        }
    }

    /// Number of remote writes the pass issued.
    pub fn changes(&self) -> u64 {
        self.created + self.updated + self.completed + self.deleted
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: {} calendars, {} events, {} created, {} updated, {} completed, {} deleted, {} unchanged",
            self.run_id,
            self.calendars,
            self.events,
            self.created,
            self.updated,
            self.completed,
            self.deleted,
            self.unchanged
        )
    }
}
