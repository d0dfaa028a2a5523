use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{Comment, NewTask, Project, TaskClient, TaskSnapshot, TaskUpdate};
use crate::error::Result;

/// How often and how patiently a failed remote call is attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(15, Duration::from_secs(60))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned.
///
/// `op` is called again for every attempt, so it must build a fresh future.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                log::error!(
                    "Error when communicating with Todoist ({what}), attempt {attempt}/{}: {e}",
                    policy.max_attempts
                );
                if !policy.delay.is_zero() {
                    log::info!("Retrying in {} seconds", policy.delay.as_secs());
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    log::error!("Giving up on {what} after {attempt} attempts: {e}");
                }
                return Err(e);
            }
        }
    }
}

/// [`TaskClient`] middleware applying a [`RetryPolicy`] to every call.
pub struct RetryingTaskClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: TaskClient> RetryingTaskClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: TaskClient> TaskClient for RetryingTaskClient<C> {
    async fn list_tasks(&self, project_id: &str) -> Result<Vec<TaskSnapshot>> {
        with_retry(&self.policy, "list tasks", || self.inner.list_tasks(project_id)).await
    }

    async fn create_task(&self, task: &NewTask) -> Result<TaskSnapshot> {
        with_retry(&self.policy, "create task", || self.inner.create_task(task)).await
    }

    async fn update_task(&self, task_id: &str, update: &TaskUpdate) -> Result<TaskSnapshot> {
        with_retry(&self.policy, "update task", || self.inner.update_task(task_id, update)).await
    }

    async fn close_task(&self, task_id: &str) -> Result<()> {
        with_retry(&self.policy, "close task", || self.inner.close_task(task_id)).await
    }

    async fn delete_task(&self, task_id: &str) -> Result<()> {
        with_retry(&self.policy, "delete task", || self.inner.delete_task(task_id)).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        with_retry(&self.policy, "list projects", || self.inner.list_projects()).await
    }

    async fn create_project(&self, name: &str, parent_id: Option<&str>) -> Result<Project> {
        with_retry(&self.policy, "create project", || self.inner.create_project(name, parent_id)).await
    }

    async fn list_project_comments(&self, project_id: &str) -> Result<Vec<Comment>> {
        with_retry(&self.policy, "list comments", || {
            self.inner.list_project_comments(project_id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> Error {
        Error::Api {
            service: "Todoist",
            status: 503,
            message: "unavailable".into(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let result = with_retry(&policy, "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(unavailable())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result: Result<()> = with_retry(&policy, "down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;

        assert!(matches!(result, Err(Error::Api { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(10, Duration::ZERO);

        let result: Result<()> = with_retry(&policy, "missing", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::NotFound("task 1".into())) }
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryPolicy::none(), "once", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_middleware_retries_each_call() {
        use crate::sync::reconciler::tests::FakeTasks;
        use chrono::NaiveDate;

        let client = RetryingTaskClient::new(FakeTasks::default(), RetryPolicy::fixed(3, Duration::ZERO));
        client.inner().set_fail_creates(true);
        let task = NewTask {
            content: "x".into(),
            description: String::new(),
            project_id: "p1".into(),
            labels: vec![],
            due: crate::todoist::DueSpec::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            duration_minutes: None,
        };

        assert!(client.create_task(&task).await.is_err());
        assert_eq!(client.inner().calls(), vec!["create:x"; 3]);

        // Not-found passes straight through.
        assert!(client.delete_task("missing").await.unwrap_err().is_not_found());
        assert_eq!(client.inner().calls().len(), 4);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }
}
