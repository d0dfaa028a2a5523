pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use google::GoogleCalendar;

/// Start or end of a calendar event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTime {
    /// All-day boundary. For an end, this is the first day *after* the event.
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

impl EventTime {
    /// Promote to a zoned datetime. A bare date becomes midnight in `offset`.
    pub fn to_datetime(self, offset: FixedOffset) -> DateTime<FixedOffset> {
        match self {
            EventTime::DateTime(dt) => dt,
            EventTime::Date(d) => {
                let local = d.and_time(NaiveTime::MIN);
                let utc = local - Duration::seconds(offset.local_minus_utc() as i64);
                DateTime::from_naive_utc_and_offset(utc, offset)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    Accepted,
    Declined,
    Tentative,
    NeedsAction,
}

impl ResponseStatus {
    /// Parse a provider response status. Unknown values count as "needs action".
    pub fn parse(s: &str) -> Self {
        match s {
            "accepted" => ResponseStatus::Accepted,
            "declined" => ResponseStatus::Declined,
            "tentative" => ResponseStatus::Tentative,
            _ => ResponseStatus::NeedsAction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub response_status: ResponseStatus,
}

/// A single event as returned by a calendar provider. Recurring events are
/// expected to arrive already expanded into their instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: EventTime,
    pub end: EventTime,
    pub location: Option<String>,
    pub description: Option<String>,
    pub conference_link: Option<String>,
    pub attendees: Vec<Attendee>,
}

impl CalendarEvent {
    pub fn attendee(&self, email: &str) -> Option<&Attendee> {
        self.attendees
            .iter()
            .find(|a| a.email.as_deref() == Some(email))
    }
}

/// Half-open time range used to query a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// From `now` to `days` days ahead.
    pub fn upcoming(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now,
            end: now + Duration::days(days as i64),
        }
    }
}

/// Read access to a calendar provider.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Events of `calendar_id` overlapping `window`, in provider order.
    async fn events_for(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<CalendarEvent>>;
}
