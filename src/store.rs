//! Typed access to the workspace collections.
//!
//! Every function takes a plain `&Connection`, so callers can pass either the
//! connection itself or an open `Transaction` (which derefs to one).

use crate::error::{JournalError, JournalResult};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    /// Probe order used by role resolution.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Teacher, Role::Student];

    pub fn table(self) -> &'static str {
        match self {
            Role::Admin => "admins",
            Role::Teacher => "teachers",
            Role::Student => "students",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Profile record of an account in its role table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub needs_password_setup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub created_at: String,
}

impl Profile {
    /// Unsaved profile; id and email are filled in when the account is created.
    pub fn draft(role: Role, name: &str) -> Self {
        Self {
            id: String::new(),
            email: String::new(),
            name: name.trim().to_string(),
            role,
            needs_password_setup: false,
            group_id: None,
            event_id: None,
            created_at: now_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub learning: String,
    pub feeling: String,
    pub application: String,
    pub clo1: i64,
    pub clo2: i64,
    pub clo3: i64,
    pub clo4: i64,
    pub files: Vec<FileRef>,
    pub event_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JournalEntry {
    pub fn clos(&self) -> [i64; 4] {
        [self.clo1, self.clo2, self.clo3, self.clo4]
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherNote {
    pub id: String,
    pub student_id: String,
    pub date: String,
    pub teacher_id: String,
    pub content: String,
    pub visible_to_student: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityNote {
    pub id: String,
    pub student_id: String,
    pub title: String,
    pub content: String,
    pub files: Vec<FileRef>,
    pub created_at: String,
}

fn parse_files(raw: &str) -> rusqlite::Result<Vec<FileRef>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

// ---- profiles ----

fn profile_select(role: Role) -> String {
    match role {
        Role::Student => "SELECT id, email, name, needs_password_setup, created_at, group_id, event_id
                          FROM students"
            .to_string(),
        _ => format!(
            "SELECT id, email, name, needs_password_setup, created_at, NULL, NULL FROM {}",
            role.table()
        ),
    }
}

fn profile_from_row(role: Role, r: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: r.get(0)?,
        email: r.get(1)?,
        name: r.get(2)?,
        role,
        needs_password_setup: r.get::<_, i64>(3)? != 0,
        created_at: r.get(4)?,
        group_id: r.get(5)?,
        event_id: r.get(6)?,
    })
}

pub fn get_profile(conn: &Connection, role: Role, id: &str) -> JournalResult<Option<Profile>> {
    let sql = format!("{} WHERE id = ?", profile_select(role));
    Ok(conn
        .query_row(&sql, [id], |r| profile_from_row(role, r))
        .optional()?)
}

pub fn list_profiles(conn: &Connection, role: Role) -> JournalResult<Vec<Profile>> {
    let sql = format!("{} ORDER BY name, id", profile_select(role));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| profile_from_row(role, r))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn students_in_group(conn: &Connection, group_id: &str) -> JournalResult<Vec<Profile>> {
    let sql = format!("{} WHERE group_id = ? ORDER BY name, id", profile_select(Role::Student));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([group_id], |r| profile_from_row(Role::Student, r))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_profile(conn: &Connection, p: &Profile) -> JournalResult<()> {
    match p.role {
        Role::Student => conn.execute(
            "INSERT INTO students(id, email, name, group_id, event_id, needs_password_setup, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &p.id,
                &p.email,
                &p.name,
                &p.group_id,
                &p.event_id,
                p.needs_password_setup as i64,
                &p.created_at,
            ),
        )?,
        role => conn.execute(
            &format!(
                "INSERT INTO {}(id, email, name, needs_password_setup, created_at) VALUES(?, ?, ?, ?, ?)",
                role.table()
            ),
            (
                &p.id,
                &p.email,
                &p.name,
                p.needs_password_setup as i64,
                &p.created_at,
            ),
        )?,
    };
    Ok(())
}

pub fn update_profile_name(conn: &Connection, role: Role, id: &str, name: &str) -> JournalResult<()> {
    let n = conn.execute(
        &format!("UPDATE {} SET name = ? WHERE id = ?", role.table()),
        (name, id),
    )?;
    if n == 0 {
        return Err(JournalError::not_found("user"));
    }
    Ok(())
}

pub fn update_student_assignment(
    conn: &Connection,
    id: &str,
    group_id: Option<&str>,
    event_id: Option<&str>,
) -> JournalResult<()> {
    let n = conn.execute(
        "UPDATE students SET group_id = ?, event_id = ? WHERE id = ?",
        (group_id, event_id, id),
    )?;
    if n == 0 {
        return Err(JournalError::not_found("student"));
    }
    Ok(())
}

pub fn set_needs_password_setup(
    conn: &Connection,
    role: Role,
    id: &str,
    needs: bool,
) -> JournalResult<()> {
    conn.execute(
        &format!("UPDATE {} SET needs_password_setup = ? WHERE id = ?", role.table()),
        (needs as i64, id),
    )?;
    Ok(())
}

pub fn delete_profile(conn: &Connection, role: Role, id: &str) -> JournalResult<bool> {
    let n = conn.execute(&format!("DELETE FROM {} WHERE id = ?", role.table()), [id])?;
    Ok(n > 0)
}

pub fn count_profiles(conn: &Connection, role: Role) -> JournalResult<i64> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", role.table()),
        [],
        |r| r.get(0),
    )?)
}

// ---- groups ----

fn group_from_row(r: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: r.get(0)?,
        name: r.get(1)?,
        teacher_id: r.get(2)?,
    })
}

pub fn get_group(conn: &Connection, id: &str) -> JournalResult<Option<Group>> {
    Ok(conn
        .query_row(
            "SELECT id, name, teacher_id FROM student_groups WHERE id = ?",
            [id],
            group_from_row,
        )
        .optional()?)
}

pub fn find_group_by_name(conn: &Connection, name: &str) -> JournalResult<Option<Group>> {
    Ok(conn
        .query_row(
            "SELECT id, name, teacher_id FROM student_groups WHERE name = ? ORDER BY created_at, id LIMIT 1",
            [name],
            group_from_row,
        )
        .optional()?)
}

pub fn list_groups(conn: &Connection) -> JournalResult<Vec<Group>> {
    let mut stmt =
        conn.prepare("SELECT id, name, teacher_id FROM student_groups ORDER BY name, id")?;
    let rows = stmt
        .query_map([], group_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn groups_for_teacher(conn: &Connection, teacher_id: &str) -> JournalResult<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, teacher_id FROM student_groups WHERE teacher_id = ? ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map([teacher_id], group_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_group(conn: &Connection, g: &Group) -> JournalResult<()> {
    conn.execute(
        "INSERT INTO student_groups(id, name, teacher_id, created_at) VALUES(?, ?, ?, ?)",
        (&g.id, &g.name, &g.teacher_id, now_timestamp()),
    )?;
    Ok(())
}

pub fn update_group(conn: &Connection, g: &Group) -> JournalResult<()> {
    let n = conn.execute(
        "UPDATE student_groups SET name = ?, teacher_id = ? WHERE id = ?",
        (&g.name, &g.teacher_id, &g.id),
    )?;
    if n == 0 {
        return Err(JournalError::not_found("group"));
    }
    Ok(())
}

pub fn set_group_teacher(
    conn: &Connection,
    group_id: &str,
    teacher_id: Option<&str>,
) -> JournalResult<()> {
    conn.execute(
        "UPDATE student_groups SET teacher_id = ? WHERE id = ?",
        (teacher_id, group_id),
    )?;
    Ok(())
}

pub fn delete_group(conn: &Connection, id: &str) -> JournalResult<bool> {
    let n = conn.execute("DELETE FROM student_groups WHERE id = ?", [id])?;
    Ok(n > 0)
}

// ---- events ----

fn event_from_row(r: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: r.get(0)?,
        name: r.get(1)?,
        start_date: r.get(2)?,
        end_date: r.get(3)?,
        description: r.get(4)?,
    })
}

pub fn get_event(conn: &Connection, id: &str) -> JournalResult<Option<Event>> {
    Ok(conn
        .query_row(
            "SELECT id, name, start_date, end_date, description FROM events WHERE id = ?",
            [id],
            event_from_row,
        )
        .optional()?)
}

pub fn find_event_by_name(conn: &Connection, name: &str) -> JournalResult<Option<Event>> {
    Ok(conn
        .query_row(
            "SELECT id, name, start_date, end_date, description
             FROM events WHERE name = ? ORDER BY start_date DESC, id LIMIT 1",
            [name],
            event_from_row,
        )
        .optional()?)
}

/// All events, newest start first.
pub fn list_events(conn: &Connection) -> JournalResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, start_date, end_date, description FROM events ORDER BY start_date DESC, id",
    )?;
    let rows = stmt
        .query_map([], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_event(conn: &Connection, e: &Event) -> JournalResult<()> {
    conn.execute(
        "INSERT INTO events(id, name, start_date, end_date, description, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &e.id,
            &e.name,
            &e.start_date,
            &e.end_date,
            &e.description,
            now_timestamp(),
        ),
    )?;
    Ok(())
}

pub fn update_event(conn: &Connection, e: &Event) -> JournalResult<()> {
    let n = conn.execute(
        "UPDATE events SET name = ?, start_date = ?, end_date = ?, description = ? WHERE id = ?",
        (&e.name, &e.start_date, &e.end_date, &e.description, &e.id),
    )?;
    if n == 0 {
        return Err(JournalError::not_found("event"));
    }
    Ok(())
}

pub fn delete_event(conn: &Connection, id: &str) -> JournalResult<bool> {
    let n = conn.execute("DELETE FROM events WHERE id = ?", [id])?;
    Ok(n > 0)
}

// ---- journals ----

const JOURNAL_COLUMNS: &str = "id, student_id, date, learning, feeling, application,
    clo1, clo2, clo3, clo4, files_json, event_id, created_at, updated_at";

fn journal_from_row(r: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    let files_json: String = r.get(10)?;
    Ok(JournalEntry {
        id: r.get(0)?,
        student_id: r.get(1)?,
        date: r.get(2)?,
        learning: r.get(3)?,
        feeling: r.get(4)?,
        application: r.get(5)?,
        clo1: r.get(6)?,
        clo2: r.get(7)?,
        clo3: r.get(8)?,
        clo4: r.get(9)?,
        files: parse_files(&files_json)?,
        event_id: r.get(11)?,
        created_at: r.get(12)?,
        updated_at: r.get(13)?,
    })
}

pub fn find_journal(
    conn: &Connection,
    student_id: &str,
    date: &str,
) -> JournalResult<Option<JournalEntry>> {
    let sql = format!("SELECT {JOURNAL_COLUMNS} FROM journals WHERE student_id = ? AND date = ?");
    Ok(conn
        .query_row(&sql, (student_id, date), journal_from_row)
        .optional()?)
}

pub fn journals_for_student(
    conn: &Connection,
    student_id: &str,
    newest_first: bool,
) -> JournalResult<Vec<JournalEntry>> {
    let order = if newest_first { "DESC" } else { "ASC" };
    let sql = format!(
        "SELECT {JOURNAL_COLUMNS} FROM journals WHERE student_id = ? ORDER BY date {order}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([student_id], journal_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn journal_dates_for_student(conn: &Connection, student_id: &str) -> JournalResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT date FROM journals WHERE student_id = ? ORDER BY date")?;
    let rows = stmt
        .query_map([student_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Student ids with an entry on `date`.
pub fn journal_authors_on(conn: &Connection, date: &str) -> JournalResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT student_id FROM journals WHERE date = ?")?;
    let rows = stmt
        .query_map([date], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_journal(conn: &Connection, j: &JournalEntry) -> JournalResult<()> {
    conn.execute(
        "INSERT INTO journals(id, student_id, date, learning, feeling, application,
            clo1, clo2, clo3, clo4, files_json, event_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            j.id,
            j.student_id,
            j.date,
            j.learning,
            j.feeling,
            j.application,
            j.clo1,
            j.clo2,
            j.clo3,
            j.clo4,
            serde_json::to_string(&j.files)?,
            j.event_id,
            j.created_at,
            j.updated_at,
        ],
    )?;
    Ok(())
}

/// Overwrites the mutable fields; identity and `created_at` stay as stored.
pub fn update_journal(conn: &Connection, j: &JournalEntry) -> JournalResult<()> {
    conn.execute(
        "UPDATE journals SET learning = ?, feeling = ?, application = ?,
            clo1 = ?, clo2 = ?, clo3 = ?, clo4 = ?, files_json = ?, event_id = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            j.learning,
            j.feeling,
            j.application,
            j.clo1,
            j.clo2,
            j.clo3,
            j.clo4,
            serde_json::to_string(&j.files)?,
            j.event_id,
            j.updated_at,
            j.id,
        ],
    )?;
    Ok(())
}

pub fn count_journals(conn: &Connection, student_id: &str) -> JournalResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM journals WHERE student_id = ?",
        [student_id],
        |r| r.get(0),
    )?)
}

// ---- teacher notes ----

fn teacher_note_from_row(r: &Row<'_>) -> rusqlite::Result<TeacherNote> {
    Ok(TeacherNote {
        id: r.get(0)?,
        student_id: r.get(1)?,
        date: r.get(2)?,
        teacher_id: r.get(3)?,
        content: r.get(4)?,
        visible_to_student: r.get::<_, i64>(5)? != 0,
        created_at: r.get(6)?,
        updated_at: r.get(7)?,
    })
}

pub fn find_teacher_note(
    conn: &Connection,
    student_id: &str,
    date: &str,
) -> JournalResult<Option<TeacherNote>> {
    Ok(conn
        .query_row(
            "SELECT id, student_id, date, teacher_id, content, visible_to_student, created_at, updated_at
             FROM teacher_notes WHERE student_id = ? AND date = ?",
            (student_id, date),
            teacher_note_from_row,
        )
        .optional()?)
}

pub fn teacher_notes_for_student(
    conn: &Connection,
    student_id: &str,
) -> JournalResult<Vec<TeacherNote>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, date, teacher_id, content, visible_to_student, created_at, updated_at
         FROM teacher_notes WHERE student_id = ? ORDER BY date",
    )?;
    let rows = stmt
        .query_map([student_id], teacher_note_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_teacher_note(conn: &Connection, n: &TeacherNote) -> JournalResult<()> {
    conn.execute(
        "INSERT INTO teacher_notes(id, student_id, date, teacher_id, content, visible_to_student, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            n.id,
            n.student_id,
            n.date,
            n.teacher_id,
            n.content,
            n.visible_to_student as i64,
            n.created_at,
            n.updated_at,
        ],
    )?;
    Ok(())
}

/// Authorship is not part of the update.
pub fn update_teacher_note(conn: &Connection, n: &TeacherNote) -> JournalResult<()> {
    conn.execute(
        "UPDATE teacher_notes SET content = ?, visible_to_student = ?, updated_at = ? WHERE id = ?",
        (&n.content, n.visible_to_student as i64, &n.updated_at, &n.id),
    )?;
    Ok(())
}

// ---- community notes ----

fn community_note_from_row(r: &Row<'_>) -> rusqlite::Result<CommunityNote> {
    let files_json: String = r.get(4)?;
    Ok(CommunityNote {
        id: r.get(0)?,
        student_id: r.get(1)?,
        title: r.get(2)?,
        content: r.get(3)?,
        files: parse_files(&files_json)?,
        created_at: r.get(5)?,
    })
}

pub fn insert_community_note(conn: &Connection, n: &CommunityNote) -> JournalResult<()> {
    conn.execute(
        "INSERT INTO community_notes(id, student_id, title, content, files_json, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &n.id,
            &n.student_id,
            &n.title,
            &n.content,
            serde_json::to_string(&n.files)?,
            &n.created_at,
        ),
    )?;
    Ok(())
}

pub fn get_community_note(conn: &Connection, id: &str) -> JournalResult<Option<CommunityNote>> {
    Ok(conn
        .query_row(
            "SELECT id, student_id, title, content, files_json, created_at
             FROM community_notes WHERE id = ?",
            [id],
            community_note_from_row,
        )
        .optional()?)
}

/// Newest first.
pub fn community_notes_for_student(
    conn: &Connection,
    student_id: &str,
) -> JournalResult<Vec<CommunityNote>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_id, title, content, files_json, created_at
         FROM community_notes WHERE student_id = ? ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map([student_id], community_note_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_community_note(conn: &Connection, id: &str) -> JournalResult<bool> {
    let n = conn.execute("DELETE FROM community_notes WHERE id = ?", [id])?;
    Ok(n > 0)
}
