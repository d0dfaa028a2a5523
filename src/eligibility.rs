use chrono::{DateTime, Duration, Local, Utc};

use crate::calendar::{CalendarEvent, ResponseStatus};
use crate::occurrence::{Occurrence, When};

/// Whether an occurrence is still current at `now`.
///
/// All-day occurrences stay current for their whole day. Timed occurrences
/// stay current until `start + duration`, so a task remains visible until
/// the event is over rather than just started.
pub fn should_add_based_on_date(when: &When, duration: Option<i64>, now: DateTime<Local>) -> bool {
    match when {
        When::AllDay(date) => *date >= now.date_naive(),
        When::Timed(start) => {
            let end = *start + Duration::minutes(duration.unwrap_or(0));
            end.with_timezone(&Utc) >= now.with_timezone(&Utc)
        }
    }
}

/// Whether the owner of `calendar_id` has not declined the event.
///
/// Events without attendees, or where the calendar is not among them, are
/// always eligible.
pub fn should_add_based_on_event(event: &CalendarEvent, calendar_id: &str) -> bool {
    match event.attendee(calendar_id) {
        Some(attendee) => matches!(
            attendee.response_status,
            ResponseStatus::Accepted | ResponseStatus::Tentative | ResponseStatus::NeedsAction
        ),
        None => true,
    }
}

/// Why an occurrence was left out of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    Declined,
    Past,
}

/// Both checks, attendance first.
pub fn check(
    event: &CalendarEvent,
    occurrence: &Occurrence,
    calendar_id: &str,
    now: DateTime<Local>,
) -> Result<(), Ineligible> {
    if !should_add_based_on_event(event, calendar_id) {
        return Err(Ineligible::Declined);
    }
    if !should_add_based_on_date(&occurrence.when, occurrence.duration, now) {
        return Err(Ineligible::Past);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Attendee, EventTime};
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn timed(minutes_from_now: i64) -> When {
        When::Timed((now() + Duration::minutes(minutes_from_now)).fixed_offset())
    }

    fn event_with(attendees: Vec<Attendee>) -> CalendarEvent {
        let day = NaiveDate::from_ymd_opt(2024, 6, 20).unwrap();
        CalendarEvent {
            id: "ev".into(),
            title: "Sync".into(),
            start: EventTime::Date(day),
            end: EventTime::Date(day.succ_opt().unwrap()),
            location: None,
            description: None,
            conference_link: None,
            attendees,
        }
    }

    fn attendee(email: &str, status: ResponseStatus) -> Attendee {
        Attendee {
            email: Some(email.into()),
            display_name: None,
            response_status: status,
        }
    }

    #[test]
    fn test_all_day_today_and_future_are_current() {
        let today = now().date_naive();
        assert!(should_add_based_on_date(&When::AllDay(today), Some(1440), now()));
        assert!(should_add_based_on_date(&When::AllDay(today.succ_opt().unwrap()), None, now()));
        assert!(!should_add_based_on_date(&When::AllDay(today.pred_opt().unwrap()), Some(1440), now()));
    }

    #[test]
    fn test_timed_occurrence_kept_until_it_ends() {
        // Started an hour ago, lasts two hours.
        assert!(should_add_based_on_date(&timed(-60), Some(120), now()));
        // Started two hours ago, lasted one.
        assert!(!should_add_based_on_date(&timed(-120), Some(60), now()));
        // Unspecified duration counts as zero.
        assert!(!should_add_based_on_date(&timed(-1), None, now()));
        assert!(should_add_based_on_date(&timed(30), None, now()));
    }

    #[test]
    fn test_timed_comparison_is_timezone_aware() {
        let start = DateTime::parse_from_rfc3339("2024-06-15T09:00:00-05:00").unwrap();
        let now = start.with_timezone(&Local) + Duration::minutes(59);
        assert!(should_add_based_on_date(&When::Timed(start), Some(60), now));
        assert!(!should_add_based_on_date(&When::Timed(start), Some(58), now));
    }

    #[test]
    fn test_no_attendees_is_eligible() {
        assert!(should_add_based_on_event(&event_with(vec![]), "me@example.com"));
    }

    #[test]
    fn test_calendar_not_invited_is_eligible() {
        let ev = event_with(vec![attendee("bob@example.com", ResponseStatus::Declined)]);
        assert!(should_add_based_on_event(&ev, "me@example.com"));
    }

    #[test]
    fn test_response_statuses() {
        for (status, expected) in [
            (ResponseStatus::Accepted, true),
            (ResponseStatus::Tentative, true),
            (ResponseStatus::NeedsAction, true),
            (ResponseStatus::Declined, false),
        ] {
            let ev = event_with(vec![
                attendee("bob@example.com", ResponseStatus::Accepted),
                attendee("me@example.com", status),
            ]);
            assert_eq!(should_add_based_on_event(&ev, "me@example.com"), expected, "{status:?}");
        }
    }

    #[test]
    fn test_check_reports_attendance_first() {
        let ev = event_with(vec![attendee("me@example.com", ResponseStatus::Declined)]);
        let past = Occurrence {
            event_id: "ev".into(),
            index: 0,
            when: When::AllDay(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
            duration: None,
        };
        assert_eq!(check(&ev, &past, "me@example.com", now()), Err(Ineligible::Declined));
        assert_eq!(check(&ev, &past, "other@example.com", now()), Err(Ineligible::Past));
    }
}
