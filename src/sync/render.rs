//! What a task should look like for a given occurrence.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::calendar::{Attendee, CalendarEvent, ResponseStatus};
use crate::config::Config;
use crate::occurrence::{Occurrence, When};
use crate::todoist::{DueSpec, NewTask, TaskSnapshot, TaskUpdate};

/// Wide enough that notes are never re-wrapped.
const NOTES_WIDTH: usize = 1000;

/// Convert the HTML Google puts in event descriptions to Markdown-style
/// text. Links keep their targets as footnotes.
pub fn html_to_markdown(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), NOTES_WIDTH) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            log::warn!("Could not convert event notes, keeping them as is: {e}");
            html.trim().to_string()
        }
    }
}

fn status_emoji(status: ResponseStatus) -> &'static str {
    match status {
        ResponseStatus::Accepted => "🟢",
        ResponseStatus::Declined => "🔴",
        ResponseStatus::NeedsAction => "⚫",
        ResponseStatus::Tentative => "🟡",
    }
}

fn guest_line(attendee: &Attendee) -> Option<String> {
    let mut parts = vec![status_emoji(attendee.response_status)];
    if let Some(name) = attendee.display_name.as_deref().filter(|s| !s.is_empty()) {
        parts.push(name);
    }
    if let Some(email) = attendee.email.as_deref().filter(|s| !s.is_empty()) {
        parts.push(email);
    }
    (parts.len() >= 2).then(|| parts.join(" - "))
}

pub fn task_content(config: &Config, event: &CalendarEvent) -> String {
    format!("{}{}{}", config.task_prefix, event.title.trim(), config.task_suffix)
}

/// Task description: conference link, location, notes and guest list,
/// separated by blank lines.
pub fn task_description(event: &CalendarEvent) -> String {
    let mut blocks = Vec::new();

    if let Some(link) = event.conference_link.as_deref().filter(|s| !s.is_empty()) {
        blocks.push(format!("📞 {link}"));
    }
    if let Some(location) = event.location.as_deref().filter(|s| !s.is_empty()) {
        blocks.push(format!("📍 {location}"));
    }
    if let Some(description) = event.description.as_deref().filter(|s| !s.is_empty()) {
        blocks.push(format!("📝 {}", html_to_markdown(description)));
    }
    if !event.attendees.is_empty() {
        let mut guests = String::from("👥 Guests:\n");
        for line in event.attendees.iter().filter_map(guest_line) {
            guests.push_str(&line);
            guests.push('\n');
        }
        blocks.push(guests);
    }

    blocks.join("\n\n").trim().to_string()
}

pub fn due_for(when: &When) -> DueSpec {
    match when {
        When::AllDay(date) => DueSpec::Date(*date),
        When::Timed(dt) => DueSpec::DateTime(dt.with_timezone(&Utc)),
    }
}

/// Parse a Todoist due datetime. Floating values (no offset) are read as UTC.
fn parse_due_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Fields a task must carry to represent one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTarget {
    pub content: String,
    pub description: String,
    pub due: DueSpec,
    pub duration_minutes: Option<i64>,
}

impl TaskTarget {
    pub fn for_occurrence(config: &Config, event: &CalendarEvent, occurrence: &Occurrence) -> Self {
        Self {
            content: task_content(config, event),
            description: task_description(event),
            due: due_for(&occurrence.when),
            duration_minutes: occurrence.duration,
        }
    }

    pub fn new_task(&self, project_id: &str, label: &str) -> NewTask {
        NewTask {
            content: self.content.clone(),
            description: self.description.clone(),
            project_id: project_id.to_string(),
            labels: vec![label.to_string()],
            due: self.due,
            duration_minutes: self.duration_minutes,
        }
    }

    pub fn update(&self) -> TaskUpdate {
        TaskUpdate {
            content: Some(self.content.clone()),
            description: Some(self.description.clone()),
            due: Some(self.due),
            duration_minutes: self.duration_minutes,
        }
    }

    fn due_matches(&self, task: &TaskSnapshot) -> bool {
        let Some(due) = task.due.as_ref() else {
            return false;
        };
        match self.due {
            DueSpec::Date(date) => due.datetime.is_none() && due.date == date.format("%Y-%m-%d").to_string(),
            DueSpec::DateTime(want) => due
                .datetime
                .as_deref()
                .and_then(parse_due_datetime)
                .is_some_and(|have| have == want),
        }
    }

    /// Whether `task` needs an update to match this target. Duration is only
    /// compared when one is sent.
    pub fn differs_from(&self, task: &TaskSnapshot) -> bool {
        if task.content != self.content || task.description != self.description {
            return true;
        }
        if !self.due_matches(task) {
            return true;
        }
        match self.duration_minutes.filter(|m| *m > 0) {
            Some(want) => task.duration_minutes() != Some(want),
            None => false,
        }
    }
}
