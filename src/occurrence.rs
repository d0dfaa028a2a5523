use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, SecondsFormat, Utc};

use crate::calendar::{CalendarEvent, EventTime};

/// Longest duration a single task can carry. Anything above is left unspecified.
pub const MAX_TASK_DURATION_MINUTES: i64 = 24 * 60;

/// When an occurrence happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    AllDay(NaiveDate),
    Timed(DateTime<FixedOffset>),
}

impl When {
    /// Key stored alongside sync records: `YYYY-MM-DD` for all-day occurrences,
    /// RFC 3339 otherwise.
    pub fn due_key(&self) -> String {
        match self {
            When::AllDay(d) => d.format("%Y-%m-%d").to_string(),
            When::Timed(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
        }
    }
}

/// One calendar day of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub event_id: String,
    /// Position of the day within the event, starting at 0.
    pub index: u32,
    pub when: When,
    /// Minutes until the end of the event, `None` when longer than a day.
    pub duration: Option<i64>,
}

fn cap_duration(minutes: i64) -> Option<i64> {
    if minutes > MAX_TASK_DURATION_MINUTES {
        None
    } else {
        Some(minutes)
    }
}

/// Number of day slots to walk for a span of `whole_days`. Multi-day spans
/// include the day the event ends on.
fn day_slots(whole_days: i64) -> i64 {
    if whole_days >= 1 {
        whole_days + 1
    } else {
        whole_days
    }
}

/// Split an event into per-day occurrences, in increasing index order.
///
/// The first day keeps the event's start; later days of a timed event start at
/// midnight. Days that do not start strictly before the event's end are
/// dropped. An event that yields nothing (zero-length or contained in a
/// single day) produces exactly one occurrence at its start.
pub fn expand(event: &CalendarEvent) -> Vec<Occurrence> {
    let occurrence = |index: u32, when: When, duration: Option<i64>| Occurrence {
        event_id: event.id.clone(),
        index,
        when,
        duration,
    };

    match (event.start, event.end) {
        (EventTime::Date(start), EventTime::Date(end)) => {
            let mut out = Vec::new();
            for x in 0..day_slots((end - start).num_days()) {
                let day = start + Duration::days(x);
                if day >= end {
                    continue;
                }
                let minutes = (end - day).num_minutes();
                out.push(occurrence(x as u32, When::AllDay(day), cap_duration(minutes)));
            }
            if out.is_empty() {
                let minutes = (end - start).num_minutes();
                out.push(occurrence(0, When::AllDay(start), cap_duration(minutes)));
            }
            out
        }
        (start, end) => {
            let offset = match (start, end) {
                (EventTime::DateTime(dt), _) | (_, EventTime::DateTime(dt)) => *dt.offset(),
                (EventTime::Date(_), EventTime::Date(_)) => Utc.fix(),
            };
            let start = start.to_datetime(offset);
            let end = end.to_datetime(offset);

            let mut out = Vec::new();
            for x in 0..day_slots((end - start).num_days()) {
                let mut day_start = start + Duration::days(x);
                if x > 0 {
                    day_start = EventTime::Date(day_start.date_naive()).to_datetime(offset);
                }
                if day_start >= end {
                    continue;
                }
                let minutes = (end - day_start).num_minutes();
                out.push(occurrence(x as u32, When::Timed(day_start), cap_duration(minutes)));
            }
            if out.is_empty() {
                let minutes = (end - start).num_minutes();
                out.push(occurrence(0, When::Timed(start), cap_duration(minutes)));
            }
            out
        }
    }
}

/// Whether the event ends before it starts, which [`expand`] does not accept.
pub fn is_malformed(event: &CalendarEvent) -> bool {
    match (event.start, event.end) {
        (EventTime::Date(start), EventTime::Date(end)) => end < start,
        (start, end) => end.to_datetime(Utc.fix()) < start.to_datetime(Utc.fix()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(s: &str) -> EventTime {
        EventTime::DateTime(DateTime::parse_from_rfc3339(s).unwrap())
    }

    fn event(start: EventTime, end: EventTime) -> CalendarEvent {
        CalendarEvent {
            id: "ev".into(),
            title: "Event".into(),
            start,
            end,
            location: None,
            description: None,
            conference_link: None,
            attendees: vec![],
        }
    }

    #[test]
    fn test_single_timed_event() {
        let ev = event(at("2024-01-01T09:00:00Z"), at("2024-01-01T10:00:00Z"));
        let occ = expand(&ev);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].index, 0);
        assert_eq!(occ[0].duration, Some(60));
        assert_eq!(occ[0].when, When::Timed(DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z").unwrap()));
        assert_eq!(occ[0].event_id, "ev");
    }

    #[test]
    fn test_three_day_all_day_event() {
        // Covers Jan 1st to 3rd; the end date is exclusive.
        let ev = event(EventTime::Date(date(2024, 1, 1)), EventTime::Date(date(2024, 1, 4)));
        let occ = expand(&ev);
        let indices: Vec<u32> = occ.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(occ[0].when, When::AllDay(date(2024, 1, 1)));
        assert_eq!(occ[1].when, When::AllDay(date(2024, 1, 2)));
        assert_eq!(occ[2].when, When::AllDay(date(2024, 1, 3)));
        assert_eq!(occ[0].duration, None);
        assert_eq!(occ[1].duration, None);
        assert_eq!(occ[2].duration, Some(1440));
    }

    #[test]
    fn test_all_day_end_day_is_not_a_phantom_occurrence() {
        let ev = event(EventTime::Date(date(2024, 1, 1)), EventTime::Date(date(2024, 1, 3)));
        let occ = expand(&ev);
        assert_eq!(occ.len(), 2);
        assert_eq!(occ[1].when, When::AllDay(date(2024, 1, 2)));
        assert_eq!(occ[1].duration, Some(1440));
    }

    #[test]
    fn test_single_all_day_event() {
        let ev = event(EventTime::Date(date(2024, 1, 1)), EventTime::Date(date(2024, 1, 2)));
        let occ = expand(&ev);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].when, When::AllDay(date(2024, 1, 1)));
        assert_eq!(occ[0].duration, Some(1440));
    }

    #[test]
    fn test_multi_day_timed_event_continues_at_midnight() {
        let ev = event(at("2024-01-01T09:00:00-03:00"), at("2024-01-03T10:00:00-03:00"));
        let occ = expand(&ev);
        assert_eq!(occ.len(), 3);
        assert_eq!(occ[0].when.due_key(), "2024-01-01T09:00:00-03:00");
        assert_eq!(occ[1].when.due_key(), "2024-01-02T00:00:00-03:00");
        assert_eq!(occ[2].when.due_key(), "2024-01-03T00:00:00-03:00");
        assert_eq!(occ[0].duration, None);
        assert_eq!(occ[1].duration, None);
        assert_eq!(occ[2].duration, Some(600));
    }

    #[test]
    fn test_overnight_event_under_a_day_is_single() {
        let ev = event(at("2024-01-01T22:00:00Z"), at("2024-01-02T02:00:00Z"));
        let occ = expand(&ev);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].duration, Some(240));
    }

    #[test]
    fn test_zero_length_event() {
        let ev = event(at("2024-01-01T09:00:00Z"), at("2024-01-01T09:00:00Z"));
        let occ = expand(&ev);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].duration, Some(0));

        let ev = event(EventTime::Date(date(2024, 1, 1)), EventTime::Date(date(2024, 1, 1)));
        let occ = expand(&ev);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].when, When::AllDay(date(2024, 1, 1)));
    }

    #[test]
    fn test_exactly_one_day_timed() {
        let ev = event(at("2024-01-01T09:00:00Z"), at("2024-01-02T09:00:00Z"));
        let occ = expand(&ev);
        // First day runs the full 24h, the second starts at midnight.
        assert_eq!(occ.len(), 2);
        assert_eq!(occ[0].duration, Some(1440));
        assert_eq!(occ[1].duration, Some(540));
    }

    #[test]
    fn test_is_malformed() {
        assert!(is_malformed(&event(at("2024-01-02T09:00:00Z"), at("2024-01-01T09:00:00Z"))));
        assert!(!is_malformed(&event(at("2024-01-01T09:00:00Z"), at("2024-01-01T09:00:00Z"))));
        assert!(is_malformed(&event(
            EventTime::Date(date(2024, 1, 2)),
            EventTime::Date(date(2024, 1, 1))
        )));
    }
}
