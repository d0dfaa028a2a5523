use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::{Comment, DueSpec, NewTask, Project, TaskClient, TaskSnapshot, TaskUpdate};
use crate::error::{Error, Result};

const TODOIST_API: &str = "https://api.todoist.com/rest/v2/";
const SERVICE: &str = "Todoist";

/// Todoist REST v2 client.
pub struct TodoistClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl TodoistClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, TODOIST_API)
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(token: impl Into<String>, base_url: &str) -> Result<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("invalid Todoist API url {normalized}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Other(format!("invalid Todoist path {path}: {e}")))
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                service: SERVICE,
                status: status.as_u16(),
                message: format!("{what}: {message}"),
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let resp = self.send(request, what).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// JSON body of task create/update requests.
#[derive(Debug, Default, Serialize)]
struct TaskBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_unit: Option<&'static str>,
}

impl<'a> TaskBody<'a> {
    fn set_due(&mut self, due: &DueSpec) {
        match due {
            DueSpec::Date(d) => self.due_date = Some(d.format("%Y-%m-%d").to_string()),
            DueSpec::DateTime(dt) => {
                self.due_datetime = Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
        }
    }

    fn set_duration(&mut self, minutes: Option<i64>) {
        // Todoist rejects zero-length durations.
        if let Some(m) = minutes.filter(|m| *m > 0) {
            self.duration = Some(m);
            self.duration_unit = Some("minute");
        }
    }

    fn create(task: &'a NewTask) -> Self {
        let mut body = TaskBody {
            content: Some(task.content.as_str()),
            description: Some(task.description.as_str()),
            project_id: Some(task.project_id.as_str()),
            labels: Some(task.labels.as_slice()),
            ..Default::default()
        };
        body.set_due(&task.due);
        body.set_duration(task.duration_minutes);
        body
    }

    fn update(update: &'a TaskUpdate) -> Self {
        let mut body = TaskBody {
            content: update.content.as_deref(),
            description: update.description.as_deref(),
            ..Default::default()
        };
        if let Some(ref due) = update.due {
            body.set_due(due);
        }
        body.set_duration(update.duration_minutes);
        body
    }
}

#[derive(Serialize)]
struct ProjectBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
}

#[async_trait]
impl TaskClient for TodoistClient {
    async fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskSnapshot>> {
        let request = self
            .http
            .get(self.url("tasks")?)
            .query(&[("project_id", project_id)]);
        self.send_json(request, &format!("tasks of project {project_id}")).await
    }

    async fn create_task(&self, task: &NewTask) -> Result<TaskSnapshot> {
        let request = self.http.post(self.url("tasks")?).json(&TaskBody::create(task));
        self.send_json(request, "new task").await
    }

    async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<TaskSnapshot> {
        let request = self
            .http
            .post(self.url(&format!("tasks/{task_id}"))?)
            .json(&TaskBody::update(update));
        self.send_json(request, &format!("task {task_id}")).await
    }

    async fn close_task(&self, task_id: &str) -> Result<()> {
        let request = self.http.post(self.url(&format!("tasks/{task_id}/close"))?);
        self.send(request, &format!("task {task_id}")).await?;
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<()> {
        let request = self.http.delete(self.url(&format!("tasks/{task_id}"))?);
        self.send(request, &format!("task {task_id}")).await?;
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let request = self.http.get(self.url("projects")?);
        self.send_json(request, "projects").await
    }

    async fn create_project(&self, name: &str, parent_id: Option<&str>) -> Result<Project> {
        let request = self
            .http
            .post(self.url("projects")?)
            .json(&ProjectBody { name, parent_id });
        self.send_json(request, "new project").await
    }

    async fn list_project_comments(&self, project_id: &str) -> Result<Vec<Comment>> {
        let request = self
            .http
            .get(self.url("comments")?)
            .query(&[("project_id", project_id)]);
        self.send_json(request, &format!("comments of project {project_id}")).await
    }
}
