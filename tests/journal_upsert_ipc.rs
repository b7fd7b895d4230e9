use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn spawn(today: &str) -> Self {
        let exe = env!("CARGO_BIN_EXE_eljournald");
        let mut child = Command::new(exe)
            .env("ELJOURNAL_TODAY", today)
            .env_remove("ELJOURNAL_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn eljournald");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_default()
    }

    fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string()
    }

    fn sign_in(&mut self, email: &str, password: &str) -> serde_json::Value {
        let _ = self.request_ok("auth.signOut", json!({}));
        self.request_ok("auth.signIn", json!({ "email": email, "password": password }))
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn open_workspace(sc: &mut Sidecar, prefix: &str) -> PathBuf {
    let workspace = temp_dir(prefix);
    sc.request_ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    sc.request_ok(
        "setup.bootstrapAdmin",
        json!({ "email": "admin@school.test", "password": "admin123", "name": "Admin" }),
    );
    sc.sign_in("admin@school.test", "admin123");
    workspace
}

fn str_at<'a>(v: &'a serde_json::Value, pointer: &str) -> &'a str {
    v.pointer(pointer)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing string at {pointer} in {v}"))
}

/// Workspace with one seven-day event and one signed-in student assigned to it.
fn student_in_event(sc: &mut Sidecar, prefix: &str) -> PathBuf {
    let workspace = open_workspace(sc, prefix);
    let event = sc.request_ok(
        "events.create",
        json!({ "name": "Camp", "startDate": "2025-02-01", "endDate": "2025-02-07" }),
    );
    sc.request_ok(
        "users.create",
        json!({
            "email": "s@school.test",
            "name": "Student",
            "role": "student",
            "password": "study123",
            "eventId": str_at(&event, "/event/id")
        }),
    );
    sc.sign_in("s@school.test", "study123");
    workspace
}

#[test]
fn saving_twice_on_one_date_overwrites_the_entry() {
    let mut sc = Sidecar::spawn("2025-02-03");
    let workspace = student_in_event(&mut sc, "eljournal-journal-upsert");

    let first = sc.request_ok(
        "journals.save",
        json!({ "date": "2025-02-02", "learning": "first", "clo1": 1, "clo2": 2 }),
    );
    let second = sc.request_ok(
        "journals.save",
        json!({ "date": "2025-02-02T08:30:00Z", "learning": "second", "clo1": 5 }),
    );
    assert_eq!(first["entry"]["id"], second["entry"]["id"]);
    assert_eq!(first["entry"]["createdAt"], second["entry"]["createdAt"]);
    assert_eq!(second["entry"]["clo2"], 0);

    let history = sc.request_ok("journals.history", json!({}));
    let entries = history["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["learning"], "second");
    assert_eq!(entries[0]["clo1"], 5);

    let progress = sc.request_ok("journals.progress", json!({}));
    assert_eq!(progress["progress"]["completedCount"], 1);
    assert_eq!(progress["progress"]["totalCount"], 7);
    assert_eq!(progress["progress"]["percentage"], 14);
    assert_eq!(progress["todayStatus"], "pending");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn dates_outside_the_event_and_bad_clos_are_rejected() {
    let mut sc = Sidecar::spawn("2025-02-03");
    let workspace = student_in_event(&mut sc, "eljournal-journal-scope");

    let err = sc.request(
        "journals.save",
        json!({ "date": "2025-02-08", "learning": "late" }),
    );
    assert_eq!(err["error"]["code"], "out_of_scope");
    assert_eq!(err["error"]["details"]["date"], "2025-02-08");
    assert_eq!(
        sc.request_err("journals.save", json!({ "date": "2025-02-02", "clo3": 6 })),
        "invalid_clo"
    );
    assert_eq!(
        sc.request_err("journals.save", json!({ "date": "2025-02-02", "clo4": -1 })),
        "invalid_clo"
    );

    let history = sc.request_ok("journals.history", json!({}));
    assert_eq!(history["entries"].as_array().map(Vec::len), Some(0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn calendar_classifies_days_of_the_month() {
    let mut sc = Sidecar::spawn("2025-02-03");
    let workspace = student_in_event(&mut sc, "eljournal-journal-calendar");
    sc.request_ok("journals.save", json!({ "date": "2025-02-01", "learning": "day one" }));
    sc.request_ok("journals.get", json!({ "date": "2025-02-05" }));

    let cal = sc.request_ok("journals.calendar", json!({}));
    assert_eq!(cal["month"], "2025-02");
    let days = cal["days"].as_array().expect("days");
    assert_eq!(days.len(), 28);
    assert_eq!(days[0]["status"], "completed");
    assert_eq!(days[1]["status"], "pending");
    assert_eq!(days[2]["isToday"], true);
    assert_eq!(days[3]["status"], "future");
    assert_eq!(days[4]["isSelected"], true);
    assert_eq!(days[7]["status"], "outOfScope");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn journey_unlocks_after_every_day_is_written() {
    let mut sc = Sidecar::spawn("2025-02-07");
    let workspace = student_in_event(&mut sc, "eljournal-journal-journey");

    for day in 1..=6 {
        sc.request_ok(
            "journals.save",
            json!({ "date": format!("2025-02-0{day}"), "learning": "x", "clo1": 4, "clo2": 2 }),
        );
    }
    let locked = sc.request_ok("journals.journey", json!({}));
    assert_eq!(locked["unlocked"], false);

    sc.request_ok(
        "journals.save",
        json!({ "date": "2025-02-07", "learning": "x", "clo1": 5, "clo2": 2 }),
    );
    sc.request_ok("communityNotes.add", json!({ "title": "Road", "content": "Needs repair" }));
    let journey = sc.request_ok("journals.journey", json!({}));
    assert_eq!(journey["unlocked"], true);
    assert_eq!(journey["cloAverages"]["entryCount"], 7);
    assert_eq!(journey["cloAverages"]["display"][1], "2.0");
    assert_eq!(journey["cloAverages"]["display"][3], "0.0");
    let journals = journey["journals"].as_array().expect("journals");
    assert_eq!(journals[0]["date"], "2025-02-01");
    assert_eq!(journey["communityNotes"].as_array().map(Vec::len), Some(1));
    assert_eq!(journey["cloDefinitions"].as_array().map(Vec::len), Some(4));

    let _ = std::fs::remove_dir_all(workspace);
}
