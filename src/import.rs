//! Bulk CSV import of users and events. Rows are independent: a bad row is
//! counted and reported, never fatal to the rest of the file.

use crate::error::{JournalError, JournalResult};
use crate::events;
use crate::identity;
use crate::store::{self, Event, Profile, Role};
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUser {
    pub line: usize,
    pub id: String,
    pub email: String,
    pub role: Role,
    pub temporary_password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: usize,
    pub fail: usize,
    pub errors: Vec<RowError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created_users: Vec<CreatedUser>,
}

impl ImportReport {
    fn failed(&mut self, line: usize, e: JournalError) {
        tracing::warn!(line, error = %e, "import row rejected");
        self.fail += 1;
        self.errors.push(RowError {
            line,
            message: e.to_string(),
        });
    }
}

/// Splits one CSV line. Double-quoted cells may contain commas and `""` escapes.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if cur.trim().is_empty() => {
                cur.clear();
                in_quotes = true;
            }
            (',', false) => cells.push(std::mem::take(&mut cur).trim().to_string()),
            _ => cur.push(c),
        }
    }
    cells.push(cur.trim().to_string());
    cells
}

/// Data rows with their 1-based line numbers; the header line and blank lines are dropped.
pub fn data_rows(text: &str) -> Vec<(usize, Vec<String>)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.lines()
        .enumerate()
        .skip(1)
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i + 1, split_csv_line(l)))
        .collect()
}

pub const USERS_HEADER: &str = "email,name,role,group,event";
pub const EVENTS_HEADER: &str = "name,startDate,endDate,description";

/// Starter file for `kind` (`users` or `events`): the header plus sample rows.
pub fn template(kind: &str) -> JournalResult<String> {
    let rows: &[&str] = match kind {
        "users" => &[
            USERS_HEADER,
            "student1@example.com,First Last,student,Group A,EL Camp 1",
            "teacher1@example.com,Teacher Name,teacher,,",
        ],
        "events" => &[EVENTS_HEADER, "EL Camp 1,2025-02-01,2025-02-07,Details"],
        other => {
            return Err(JournalError::bad_params(format!(
                "template kind must be users or events, got {other:?}"
            )))
        }
    };
    Ok(rows.iter().map(|r| format!("{r}\n")).collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub remaining: usize,
}

/// Header and the first `limit` data rows, without touching the store.
pub fn preview(text: &str, limit: usize) -> Preview {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let header = text.lines().next().map(split_csv_line).unwrap_or_default();
    let mut rows: Vec<Vec<String>> = data_rows(text).into_iter().map(|(_, r)| r).collect();
    let remaining = rows.len().saturating_sub(limit);
    rows.truncate(limit);
    Preview {
        header,
        rows,
        remaining,
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

fn require<'a>(row: &'a [String], idx: usize, name: &str) -> JournalResult<&'a str> {
    let v = cell(row, idx);
    if v.is_empty() {
        return Err(JournalError::bad_params(format!("missing {name}")));
    }
    Ok(v)
}

fn import_user_row(conn: &Connection, line: usize, row: &[String]) -> JournalResult<CreatedUser> {
    let email = require(row, 0, "email")?;
    let role_raw = require(row, 2, "role")?;
    let role = match Role::parse(role_raw) {
        Some(r @ (Role::Teacher | Role::Student)) => r,
        _ => {
            return Err(JournalError::bad_params(format!(
                "role must be teacher or student, got {role_raw:?}"
            )))
        }
    };

    let (mut group_id, mut event_id) = (None, None);
    if role == Role::Student {
        let group_name = cell(row, 3);
        if !group_name.is_empty() {
            group_id = store::find_group_by_name(conn, group_name)?.map(|g| g.id);
            if group_id.is_none() {
                tracing::warn!(line, group = group_name, "unknown group left unassigned");
            }
        }
        let event_name = cell(row, 4);
        if !event_name.is_empty() {
            event_id = store::find_event_by_name(conn, event_name)?.map(|e| e.id);
            if event_id.is_none() {
                tracing::warn!(line, event = event_name, "unknown event left unassigned");
            }
        }
    }

    let password = identity::temporary_password();
    let profile = Profile {
        needs_password_setup: true,
        group_id,
        event_id,
        ..Profile::draft(role, cell(row, 1))
    };
    let created = identity::create_user(conn, email, &password, profile)?;
    Ok(CreatedUser {
        line,
        id: created.id,
        email: created.email,
        role,
        temporary_password: password,
    })
}

pub fn import_users(conn: &Connection, text: &str) -> ImportReport {
    let mut report = ImportReport::default();
    for (line, row) in data_rows(text) {
        match import_user_row(conn, line, &row) {
            Ok(created) => {
                report.success += 1;
                report.created_users.push(created);
            }
            Err(e) => report.failed(line, e),
        }
    }
    tracing::info!(success = report.success, fail = report.fail, "users import finished");
    report
}

fn import_event_row(conn: &Connection, row: &[String]) -> JournalResult<Event> {
    let name = require(row, 0, "name")?;
    let start = require(row, 1, "startDate")?;
    let end = require(row, 2, "endDate")?;
    let (start_date, end_date) = events::normalize_range(start, end)?;
    let ev = Event {
        id: store::new_id(),
        name: name.to_string(),
        start_date,
        end_date,
        description: cell(row, 3).to_string(),
    };
    store::insert_event(conn, &ev)?;
    Ok(ev)
}

pub fn import_events(conn: &Connection, text: &str) -> ImportReport {
    let mut report = ImportReport::default();
    for (line, row) in data_rows(text) {
        match import_event_row(conn, &row) {
            Ok(_) => report.success += 1,
            Err(e) => report.failed(line, e),
        }
    }
    tracing::info!(success = report.success, fail = report.fail, "events import finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_cells_keep_commas() {
        assert_eq!(
            split_csv_line(r#"a@x.com, "Doe, Jane" ,student,"He said ""hi""","#),
            vec!["a@x.com", "Doe, Jane", "student", "He said \"hi\"", ""]
        );
    }

    #[test]
    fn templates_import_cleanly() {
        let conn = crate::db::open_in_memory().expect("db");
        let events = template("events").expect("events template");
        assert!(events.starts_with(EVENTS_HEADER));
        assert_eq!(import_events(&conn, &events).success, 1);

        let users = template("users").expect("users template");
        assert!(users.starts_with(USERS_HEADER));
        let report = import_users(&conn, &users);
        assert_eq!((report.success, report.fail), (2, 0));
        assert_eq!(template("grades").expect_err("kind").code(), "bad_params");
    }

    #[test]
    fn preview_caps_rows_and_counts_the_rest() {
        let mut text = String::from("\u{feff}name,startDate,endDate\n");
        for n in 1..=7 {
            text.push_str(&format!("Camp {n},2025-02-01,2025-02-02\n\n"));
        }
        let p = preview(&text, 5);
        assert_eq!(p.header, vec!["name", "startDate", "endDate"]);
        assert_eq!(p.rows.len(), 5);
        assert_eq!(p.rows[4][0], "Camp 5");
        assert_eq!(p.remaining, 2);
        assert!(preview("", 5).header.is_empty());
    }

    #[test]
    fn header_bom_and_blank_lines_are_skipped() {
        let rows = data_rows("\u{feff}email,name\n\na@x.com,A\n  \nb@x.com,B\n");
        let lines: Vec<usize> = rows.iter().map(|(l, _)| *l).collect();
        assert_eq!(lines, vec![3, 5]);
    }

    #[test]
    fn malformed_user_row_is_isolated() {
        let conn = crate::db::open_in_memory().expect("db");
        let csv = "email,name,role,group,event\n\
                   s1@x.com,One,student,,\n\
                   s2@x.com,Two,student,,\n\
                   ,Three,student,,\n\
                   t1@x.com,Teach,teacher,,\n\
                   s4@x.com,Four,student,,\n";
        let report = import_users(&conn, csv);
        assert_eq!(report.success, 4);
        assert_eq!(report.fail, 1);
        assert_eq!(report.errors[0].line, 4);
        assert_eq!(store::count_profiles(&conn, Role::Student).expect("count"), 3);
        assert_eq!(store::count_profiles(&conn, Role::Teacher).expect("count"), 1);
        let s1 = identity::sign_in(&conn, "s1@x.com", &report.created_users[0].temporary_password)
            .expect("temp password works");
        assert!(s1.needs_password_setup);
    }

    #[test]
    fn students_resolve_group_and_event_names() {
        let conn = crate::db::open_in_memory().expect("db");
        store::insert_group(
            &conn,
            &store::Group {
                id: "g1".into(),
                name: "Group A".into(),
                teacher_id: None,
            },
        )
        .expect("group");
        import_events(&conn, "name,startDate,endDate,description\nCamp 1,2025-02-01,2025-02-07,x\n");
        let report = import_users(
            &conn,
            "email,name,role,group,event\ns@x.com,S,student,Group A,Camp 1\n",
        );
        assert_eq!(report.success, 1);
        let p = store::get_profile(&conn, Role::Student, &report.created_users[0].id)
            .expect("query")
            .expect("profile");
        assert_eq!(p.group_id.as_deref(), Some("g1"));
        assert!(p.event_id.is_some());
    }

    #[test]
    fn events_import_rejects_reversed_ranges_and_admin_role() {
        let conn = crate::db::open_in_memory().expect("db");
        let report = import_events(
            &conn,
            "name,startDate,endDate,description\n\
             Good,2025-02-01,2025-02-07,\n\
             Bad,2025-02-07,2025-02-01,\n\
             NoEnd,2025-02-01,,\n",
        );
        assert_eq!((report.success, report.fail), (1, 2));
        assert_eq!(store::list_events(&conn).expect("list").len(), 1);

        let users = import_users(&conn, "email,name,role\nboss@x.com,Boss,admin\n");
        assert_eq!((users.success, users.fail), (0, 1));
    }
}
