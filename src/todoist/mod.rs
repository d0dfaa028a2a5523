pub mod client;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::error::Result;

pub use client::TodoistClient;
pub use retry::{RetryPolicy, RetryingTaskClient};

/// Due information as reported by Todoist.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Due {
    /// `YYYY-MM-DD`, or a floating/UTC datetime for timed tasks.
    pub date: String,
    #[serde(default)]
    pub string: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskDuration {
    pub amount: i64,
    pub unit: String,
}

/// A task as listed at the start of a run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub due: Option<Due>,
    #[serde(default)]
    pub duration: Option<TaskDuration>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl TaskSnapshot {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Duration in minutes, if the task carries one.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.duration
            .as_ref()
            .map(|d| if d.unit == "day" { d.amount * 24 * 60 } else { d.amount })
    }
}

/// Due value to send when creating or updating a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueSpec {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub content: String,
    pub description: String,
    pub project_id: String,
    pub labels: Vec<String>,
    pub due: DueSpec,
    pub duration_minutes: Option<i64>,
}

/// Fields to change on an existing task. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub content: Option<String>,
    pub description: Option<String>,
    pub due: Option<DueSpec>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub comment_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub id: String,
    pub content: String,
}

/// Operations the reconciler needs from the task tracker.
///
/// Implementations report a vanished task as [`crate::Error::NotFound`].
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Active tasks of a project.
    async fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskSnapshot>>;
    async fn create_task(&self, task: &NewTask) -> Result<TaskSnapshot>;
    async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<TaskSnapshot>;
    async fn close_task(&self, task_id: &str) -> Result<()>;
    async fn delete_task(&self, task_id: &str) -> Result<()>;

    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn create_project(&self, name: &str, parent_id: Option<&str>) -> Result<Project>;
    async fn list_project_comments(&self, project_id: &str) -> Result<Vec<Comment>>;
}
