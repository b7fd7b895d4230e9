use crate::dates;
use crate::error::{JournalError, JournalResult};
use crate::events;
use crate::store::{self, CommunityNote, Event, FileRef, JournalEntry, TeacherNote};
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub const CLO_FIELDS: [&str; 4] = ["clo1", "clo2", "clo3", "clo4"];
pub const CLO_MAX: i64 = 5;

/// Mutable part of a journal entry as submitted by a student.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalPayload {
    pub learning: String,
    pub feeling: String,
    pub application: String,
    pub clos: [i64; 4],
    pub files: Vec<FileRef>,
}

impl JournalPayload {
    pub fn from_params(params: &serde_json::Value) -> JournalResult<Self> {
        let text = |key: &str| {
            params
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        let mut clos = [0i64; 4];
        for (slot, field) in clos.iter_mut().zip(CLO_FIELDS) {
            *slot = match params.get(field) {
                None => 0,
                Some(v) if v.is_null() => 0,
                Some(v) => v.as_i64().ok_or(JournalError::InvalidClo { field })?,
            };
        }
        let files = match params.get("files") {
            None => Vec::new(),
            Some(v) if v.is_null() => Vec::new(),
            Some(v) => serde_json::from_value::<Vec<FileRef>>(v.clone()).map_err(|e| {
                JournalError::bad_params(format!("files must be a list of {{name, url, type}}: {e}"))
            })?,
        };
        Ok(Self {
            learning: text("learning"),
            feeling: text("feeling"),
            application: text("application"),
            clos,
            files,
        })
    }
}

pub fn validate_clos(clos: &[i64; 4]) -> JournalResult<()> {
    for (v, field) in clos.iter().zip(CLO_FIELDS) {
        if !(0..=CLO_MAX).contains(v) {
            return Err(JournalError::InvalidClo { field });
        }
    }
    Ok(())
}

/// Fails with `OutOfScope` when an active event is known and `date` is not one of its days.
pub fn ensure_in_scope(date: &str, active_event: Option<&Event>) -> JournalResult<()> {
    let Some(ev) = active_event else {
        return Ok(());
    };
    if events::event_days(ev)?.iter().any(|d| d == date) {
        Ok(())
    } else {
        Err(JournalError::OutOfScope {
            date: date.to_string(),
        })
    }
}

fn begin_immediate(conn: &Connection) -> JournalResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

fn retag_duplicate(entity: &'static str) -> impl Fn(JournalError) -> JournalError {
    move |e| match e {
        JournalError::DuplicateWrite { .. } => JournalError::DuplicateWrite { entity },
        other => other,
    }
}

/// Creates or overwrites the single entry for `(student_id, date)`.
pub fn save_journal(
    conn: &Connection,
    student_id: &str,
    date: &str,
    payload: JournalPayload,
    active_event: Option<&Event>,
) -> JournalResult<JournalEntry> {
    let date = dates::normalize_date(date)?;
    ensure_in_scope(&date, active_event)?;
    validate_clos(&payload.clos)?;

    let tx = begin_immediate(conn)?;
    let now = store::now_timestamp();
    let event_id = active_event.map(|e| e.id.clone());
    let [clo1, clo2, clo3, clo4] = payload.clos;

    let entry = match store::find_journal(&tx, student_id, &date)? {
        Some(existing) => {
            let updated = JournalEntry {
                learning: payload.learning,
                feeling: payload.feeling,
                application: payload.application,
                clo1,
                clo2,
                clo3,
                clo4,
                files: payload.files,
                event_id: event_id.or(existing.event_id.clone()),
                updated_at: now,
                ..existing
            };
            store::update_journal(&tx, &updated)?;
            updated
        }
        None => {
            let created = JournalEntry {
                id: store::new_id(),
                student_id: student_id.to_string(),
                date: date.clone(),
                learning: payload.learning,
                feeling: payload.feeling,
                application: payload.application,
                clo1,
                clo2,
                clo3,
                clo4,
                files: payload.files,
                event_id,
                created_at: now.clone(),
                updated_at: now,
            };
            store::insert_journal(&tx, &created).map_err(retag_duplicate("journal"))?;
            created
        }
    };
    tx.commit()?;
    tracing::info!(student_id, date = %entry.date, journal_id = %entry.id, "journal saved");
    Ok(entry)
}

/// Same upsert discipline as journals. The author recorded at creation is kept
/// on later edits, whoever makes them.
pub fn save_teacher_note(
    conn: &Connection,
    teacher_id: &str,
    student_id: &str,
    date: &str,
    content: &str,
    visible_to_student: bool,
    active_event: Option<&Event>,
) -> JournalResult<TeacherNote> {
    let date = dates::normalize_date(date)?;
    ensure_in_scope(&date, active_event)?;

    let tx = begin_immediate(conn)?;
    let now = store::now_timestamp();
    let note = match store::find_teacher_note(&tx, student_id, &date)? {
        Some(existing) => {
            let updated = TeacherNote {
                content: content.to_string(),
                visible_to_student,
                updated_at: now,
                ..existing
            };
            store::update_teacher_note(&tx, &updated)?;
            updated
        }
        None => {
            let created = TeacherNote {
                id: store::new_id(),
                student_id: student_id.to_string(),
                date,
                teacher_id: teacher_id.to_string(),
                content: content.to_string(),
                visible_to_student,
                created_at: now.clone(),
                updated_at: now,
            };
            store::insert_teacher_note(&tx, &created).map_err(retag_duplicate("teacher note"))?;
            created
        }
    };
    tx.commit()?;
    tracing::info!(student_id, teacher_id, date = %note.date, "teacher note saved");
    Ok(note)
}

pub fn add_community_note(
    conn: &Connection,
    student_id: &str,
    title: &str,
    content: &str,
    files: Vec<FileRef>,
) -> JournalResult<CommunityNote> {
    let title = title.trim();
    let content = content.trim();
    if title.is_empty() || content.is_empty() {
        return Err(JournalError::bad_params("title and content are required"));
    }
    let note = CommunityNote {
        id: store::new_id(),
        student_id: student_id.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        files,
        created_at: store::now_timestamp(),
    };
    store::insert_community_note(conn, &note)?;
    Ok(note)
}

pub fn delete_community_note(conn: &Connection, student_id: &str, note_id: &str) -> JournalResult<()> {
    let note = store::get_community_note(conn, note_id)?
        .ok_or(JournalError::not_found("community note"))?;
    if note.student_id != student_id {
        return Err(JournalError::Forbidden);
    }
    store::delete_community_note(conn, note_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Event {
        Event {
            id: "ev1".into(),
            name: "Camp".into(),
            start_date: "2025-02-01".into(),
            end_date: "2025-02-07".into(),
            description: String::new(),
        }
    }

    fn payload(learning: &str, clos: [i64; 4]) -> JournalPayload {
        JournalPayload {
            learning: learning.to_string(),
            clos,
            ..Default::default()
        }
    }

    #[test]
    fn second_save_overwrites_and_keeps_created_at() {
        let conn = crate::db::open_in_memory().expect("db");
        let ev = event();
        let first = save_journal(&conn, "s1", "2025-02-02", payload("first", [1, 2, 3, 4]), Some(&ev))
            .expect("first save");
        let second = save_journal(&conn, "s1", "2025-02-02", payload("second", [5, 5, 5, 5]), Some(&ev))
            .expect("second save");

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);

        let all = store::journals_for_student(&conn, "s1", false).expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].learning, "second");
        assert_eq!(all[0].clos(), [5, 5, 5, 5]);
        assert_eq!(all[0].created_at, first.created_at);
        assert_eq!(all[0].event_id.as_deref(), Some("ev1"));
    }

    #[test]
    fn out_of_scope_date_writes_nothing() {
        let conn = crate::db::open_in_memory().expect("db");
        let ev = event();
        let e = save_journal(&conn, "s1", "2025-02-08", payload("x", [0; 4]), Some(&ev))
            .expect_err("outside event");
        assert_eq!(e.code(), "out_of_scope");
        assert!(store::find_journal(&conn, "s1", "2025-02-08")
            .expect("query")
            .is_none());
    }

    #[test]
    fn no_active_event_accepts_any_date() {
        let conn = crate::db::open_in_memory().expect("db");
        let saved = save_journal(&conn, "s1", "2030-01-01", payload("x", [0; 4]), None).expect("save");
        assert!(saved.event_id.is_none());
    }

    #[test]
    fn clo_out_of_range_is_rejected_before_write() {
        let conn = crate::db::open_in_memory().expect("db");
        for bad in [[6, 0, 0, 0], [0, 0, -1, 0]] {
            let e = save_journal(&conn, "s1", "2025-02-02", payload("x", bad), None).expect_err("clo");
            assert_eq!(e.code(), "invalid_clo");
        }
        assert_eq!(store::count_journals(&conn, "s1").expect("count"), 0);
    }

    #[test]
    fn payload_parsing_defaults_and_rejects_non_integers() {
        let p = JournalPayload::from_params(&json!({ "learning": "  a  ", "clo2": 3 })).expect("parse");
        assert_eq!(p.learning, "a");
        assert_eq!(p.clos, [0, 3, 0, 0]);
        assert!(p.files.is_empty());

        let e = JournalPayload::from_params(&json!({ "clo1": 2.5 })).expect_err("float");
        assert_eq!(e.code(), "invalid_clo");

        let p = JournalPayload::from_params(&json!({
            "files": [{ "name": "a.png", "url": "file:///a.png", "type": "image/png" }]
        }))
        .expect("files");
        assert_eq!(p.files[0].mime_type, "image/png");
    }

    #[test]
    fn teacher_note_keeps_original_author() {
        let conn = crate::db::open_in_memory().expect("db");
        let ev = event();
        save_teacher_note(&conn, "t1", "s1", "2025-02-03", "good", false, Some(&ev)).expect("create");
        let edited = save_teacher_note(&conn, "t2", "s1", "2025-02-03", "better", true, Some(&ev))
            .expect("edit");
        assert_eq!(edited.teacher_id, "t1");
        let stored = store::find_teacher_note(&conn, "s1", "2025-02-03")
            .expect("query")
            .expect("note");
        assert_eq!(stored.content, "better");
        assert!(stored.visible_to_student);
        assert_eq!(stored.teacher_id, "t1");
    }

    #[test]
    fn community_notes_require_title_and_content_and_owner_to_delete() {
        let conn = crate::db::open_in_memory().expect("db");
        assert!(add_community_note(&conn, "s1", " ", "body", vec![]).is_err());
        let note = add_community_note(&conn, "s1", "Well", "Village well is dry", vec![]).expect("add");
        let e = delete_community_note(&conn, "s2", &note.id).expect_err("not owner");
        assert_eq!(e.code(), "forbidden");
        delete_community_note(&conn, "s1", &note.id).expect("delete");
        assert_eq!(
            delete_community_note(&conn, "s1", &note.id).expect_err("gone").code(),
            "not_found"
        );
    }
}
