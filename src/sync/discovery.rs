//! Resolve which calendars feed which task projects.
//!
//! Each calendar is a child project of the parent project, with the calendar
//! id written as the child project's first comment.

use crate::error::Result;
use crate::sync::CalendarBinding;
use crate::todoist::TaskClient;

/// Id of the project named `name`, creating it when missing.
pub async fn ensure_parent_project(client: &dyn TaskClient, name: &str) -> Result<String> {
    let projects = client.list_projects().await?;
    if let Some(project) = projects.into_iter().find(|p| p.name == name) {
        return Ok(project.id);
    }
    log::info!("Creating project '{name}'");
    let project = client.create_project(name, None).await?;
    Ok(project.id)
}

/// Bindings for every child project of `parent_id` that carries a comment.
pub async fn discover_calendars(client: &dyn TaskClient, parent_id: &str) -> Result<Vec<CalendarBinding>> {
    let projects = client.list_projects().await?;
    let mut bindings = Vec::new();

    for project in projects
        .iter()
        .filter(|p| p.parent_id.as_deref() == Some(parent_id) && p.comment_count >= 1)
    {
        let comments = client.list_project_comments(&project.id).await?;
        let Some(calendar_id) = comments
            .first()
            .map(|c| c.content.trim())
            .filter(|c| !c.is_empty())
        else {
            log::warn!("Project '{}' has no calendar id comment, skipping", project.name);
            continue;
        };
        log::debug!("Project '{}' mirrors calendar {calendar_id}", project.name);
        bindings.push(CalendarBinding {
            project_id: project.id.clone(),
            calendar_id: calendar_id.to_string(),
        });
    }

    Ok(bindings)
}

/// Configured bindings when present, otherwise the ones found under the
/// parent project.
pub async fn resolve_calendars(
    client: &dyn TaskClient,
    configured: &[CalendarBinding],
    parent_project: &str,
) -> Result<Vec<CalendarBinding>> {
    if !configured.is_empty() {
        return Ok(configured.to_vec());
    }
    let parent_id = ensure_parent_project(client, parent_project).await?;
    discover_calendars(client, &parent_id).await
}
