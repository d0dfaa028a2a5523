use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use serde::Deserialize;
use url::Url;

use super::{Attendee, CalendarEvent, CalendarSource, EventTime, ResponseStatus, TimeWindow};
use crate::error::{Error, Result};

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3/";
const PAGE_SIZE: &str = "250";

/// Google Calendar v3 event reader. Authenticates with a ready-made OAuth
/// access token; obtaining and refreshing that token happens elsewhere.
pub struct GoogleCalendar {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl GoogleCalendar {
    pub fn new(access_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(access_token, CALENDAR_API)
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(access_token: impl Into<String>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid calendar API url {base_url}: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            access_token: access_token.into(),
        })
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("calendar API url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .push("calendars")
            .push(calendar_id)
            .push("events");
        Ok(url)
    }

    async fn fetch_page(
        &self,
        url: &Url,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventsPage> {
        let time_min = window.start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = window.end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut query = vec![
            ("timeMin", time_min.as_str()),
            ("timeMax", time_max.as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
            ("maxResults", PAGE_SIZE),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("calendar at {url}")));
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                service: "Google Calendar",
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendar {
    async fn events_for(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<CalendarEvent>> {
        log::info!("Getting calendar: \"{calendar_id}\"");
        let url = self.events_url(calendar_id)?;

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self.fetch_page(&url, window, page_token.as_deref()).await?;
            for item in page.items {
                if item.status.as_deref() == Some("cancelled") {
                    continue;
                }
                events.push(item.into_event(calendar_id)?);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        log::debug!("Fetched {} events from {calendar_id}", events.len());
        Ok(events)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    #[serde(default)]
    summary: String,
    description: Option<String>,
    location: Option<String>,
    hangout_link: Option<String>,
    conference_data: Option<ConferenceData>,
    start: Option<GoogleTime>,
    end: Option<GoogleTime>,
    #[serde(default)]
    attendees: Vec<GoogleAttendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    date: Option<String>,
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    email: Option<String>,
    display_name: Option<String>,
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceData {
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryPoint {
    entry_point_type: String,
    uri: String,
}

impl GoogleEvent {
    fn into_event(self, calendar_id: &str) -> Result<CalendarEvent> {
        let bad = |message: String| Error::Calendar {
            calendar_id: calendar_id.to_string(),
            message,
        };
        let start = self
            .start
            .as_ref()
            .ok_or_else(|| bad(format!("event {} has no start", self.id)))
            .and_then(|t| t.parse().map_err(|e| bad(format!("event {}: {e}", self.id))))?;
        let end = self
            .end
            .as_ref()
            .ok_or_else(|| bad(format!("event {} has no end", self.id)))
            .and_then(|t| t.parse().map_err(|e| bad(format!("event {}: {e}", self.id))))?;

        let conference_link = self.hangout_link.or_else(|| {
            self.conference_data.and_then(|cd| {
                cd.entry_points
                    .into_iter()
                    .find(|ep| ep.entry_point_type == "video")
                    .map(|ep| ep.uri)
            })
        });

        let attendees = self
            .attendees
            .into_iter()
            .map(|a| Attendee {
                email: a.email.filter(|s| !s.is_empty()),
                display_name: a.display_name.filter(|s| !s.is_empty()),
                response_status: a
                    .response_status
                    .as_deref()
                    .map(ResponseStatus::parse)
                    .unwrap_or(ResponseStatus::NeedsAction),
            })
            .collect();

        Ok(CalendarEvent {
            id: self.id,
            title: self.summary,
            start,
            end,
            location: self.location.filter(|s| !s.is_empty()),
            description: self.description.filter(|s| !s.is_empty()),
            conference_link,
            attendees,
        })
    }
}

impl GoogleTime {
    fn parse(&self) -> std::result::Result<EventTime, String> {
        if let Some(ref dt) = self.date_time {
            DateTime::parse_from_rfc3339(dt)
                .map(EventTime::DateTime)
                .map_err(|e| format!("invalid dateTime '{dt}': {e}"))
        } else if let Some(ref d) = self.date {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map(EventTime::Date)
                .map_err(|e| format!("invalid date '{d}': {e}"))
        } else {
            Err("time has neither date nor dateTime".into())
        }
    }
}
