use crate::dates;
use crate::error::{JournalError, JournalResult};
use crate::store::{self, Event, Profile, Role};
use rusqlite::Connection;
use std::cmp::Ordering;

/// Validates and canonicalizes an event's date range.
pub fn normalize_range(start: &str, end: &str) -> JournalResult<(String, String)> {
    let s = dates::normalize_date(start)?;
    let e = dates::normalize_date(end)?;
    if s > e {
        return Err(JournalError::InvalidRange { start: s, end: e });
    }
    Ok((s, e))
}

pub fn event_days(event: &Event) -> JournalResult<Vec<String>> {
    dates::days_between(&event.start_date, &event.end_date)
}

fn contains(event: &Event, day: &str) -> bool {
    event.start_date.as_str() <= day && day <= event.end_date.as_str()
}

/// Picks the event that covers `today`; the latest start wins among overlaps.
/// Without a covering event the one that ended last is used.
pub fn select_current_event<'a>(events: &'a [Event], today: &str) -> Option<&'a Event> {
    let covering = events
        .iter()
        .filter(|e| contains(e, today))
        .min_by(|a, b| {
            b.start_date
                .cmp(&a.start_date)
                .then_with(|| a.id.cmp(&b.id))
        });
    if covering.is_some() {
        return covering;
    }
    events.iter().min_by(|a, b| fallback_order(a, b))
}

fn fallback_order(a: &Event, b: &Event) -> Ordering {
    b.end_date
        .cmp(&a.end_date)
        .then_with(|| b.start_date.cmp(&a.start_date))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn resolve_current_event(conn: &Connection, today: &str) -> JournalResult<Option<Event>> {
    let events = store::list_events(conn)?;
    Ok(select_current_event(&events, today).cloned())
}

/// A student assigned to an existing event is scoped to it; everyone else
/// gets the globally current event.
pub fn resolve_event_for_student(
    conn: &Connection,
    student: &Profile,
    today: &str,
) -> JournalResult<Option<Event>> {
    if let Some(event_id) = student.event_id.as_deref() {
        if let Some(ev) = store::get_event(conn, event_id)? {
            return Ok(Some(ev));
        }
        tracing::warn!(student_id = %student.id, event_id, "assigned event no longer exists");
    }
    resolve_current_event(conn, today)
}

/// Event in force for any signed-in profile.
pub fn resolve_event_for(conn: &Connection, profile: &Profile, today: &str) -> JournalResult<Option<Event>> {
    match profile.role {
        Role::Student => resolve_event_for_student(conn, profile, today),
        _ => resolve_current_event(conn, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: &str, start: &str, end: &str) -> Event {
        Event {
            id: id.to_string(),
            name: id.to_string(),
            start_date: start.to_string(),
            end_date: end.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn covering_event_is_preferred() {
        let events = vec![
            ev("old", "2025-01-01", "2025-01-05"),
            ev("now", "2025-02-01", "2025-02-07"),
            ev("later", "2025-03-01", "2025-03-07"),
        ];
        let got = select_current_event(&events, "2025-02-03").expect("event");
        assert_eq!(got.id, "now");
    }

    #[test]
    fn endpoints_are_inclusive() {
        let events = vec![ev("a", "2025-02-01", "2025-02-07")];
        assert_eq!(
            select_current_event(&events, "2025-02-07").map(|e| e.id.as_str()),
            Some("a")
        );
    }

    #[test]
    fn overlapping_events_pick_latest_start() {
        let events = vec![
            ev("long", "2025-01-01", "2025-03-01"),
            ev("short", "2025-02-01", "2025-02-07"),
        ];
        let got = select_current_event(&events, "2025-02-02").expect("event");
        assert_eq!(got.id, "short");
    }

    #[test]
    fn fallback_uses_latest_end_date() {
        // "wide" starts earliest but ends last; a start-date rule would pick "late".
        let events = vec![
            ev("wide", "2024-01-01", "2024-12-31"),
            ev("late", "2024-06-01", "2024-06-10"),
        ];
        let got = select_current_event(&events, "2025-05-01").expect("event");
        assert_eq!(got.id, "wide");
    }

    #[test]
    fn no_events_means_none() {
        assert!(select_current_event(&[], "2025-02-01").is_none());
    }

    #[test]
    fn normalize_range_rejects_reversed_dates() {
        let e = normalize_range("2025-02-07", "2025-02-01").expect_err("reversed");
        assert_eq!(e.code(), "invalid_range");
        assert_eq!(
            normalize_range("2025-02-01T08:00:00", "2025-02-07").expect("ok"),
            ("2025-02-01".to_string(), "2025-02-07".to_string())
        );
    }

    #[test]
    fn assigned_event_wins_over_current() {
        let conn = crate::db::open_in_memory().expect("db");
        store::insert_event(&conn, &ev("current", "2025-02-01", "2025-02-07")).expect("e1");
        store::insert_event(&conn, &ev("assigned", "2025-04-01", "2025-04-03")).expect("e2");
        let mut student = Profile {
            id: "s1".into(),
            email: "s1@example.com".into(),
            name: "S".into(),
            role: store::Role::Student,
            needs_password_setup: false,
            group_id: None,
            event_id: Some("assigned".into()),
            created_at: "t".into(),
        };
        let got = resolve_event_for_student(&conn, &student, "2025-02-02")
            .expect("resolve")
            .expect("event");
        assert_eq!(got.id, "assigned");

        student.event_id = Some("deleted".into());
        let got = resolve_event_for_student(&conn, &student, "2025-02-02")
            .expect("resolve")
            .expect("event");
        assert_eq!(got.id, "current");
    }
}
