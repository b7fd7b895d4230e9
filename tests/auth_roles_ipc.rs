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

#[test]
fn bootstrap_is_refused_once_an_admin_exists() {
    let mut sc = Sidecar::spawn("2025-02-03");
    let workspace = open_workspace(&mut sc, "eljournal-auth-bootstrap");
    let code = sc.request_err(
        "setup.bootstrapAdmin",
        json!({ "email": "other@school.test", "password": "other123" }),
    );
    assert_eq!(code, "conflict");
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sign_in_resolves_role_and_guards_admin_methods() {
    let mut sc = Sidecar::spawn("2025-02-03");
    let workspace = open_workspace(&mut sc, "eljournal-auth-roles");
    sc.request_ok(
        "users.create",
        json!({ "email": "Teacher@School.test", "name": "T", "role": "teacher", "password": "teach123" }),
    );

    let session = sc.sign_in("teacher@school.test", "teach123");
    assert_eq!(str_at(&session, "/session/account/role"), "teacher");
    assert_eq!(session["session"]["account"]["needsPasswordSetup"], true);

    assert_eq!(sc.request_err("users.list", json!({})), "forbidden");
    assert_eq!(sc.request_err("journals.progress", json!({})), "forbidden");
    sc.request_ok("groups.list", json!({}));

    assert_eq!(
        sc.request_err("auth.setPassword", json!({ "password": "abcdef1", "confirm": "abcdef2" })),
        "bad_params"
    );
    assert_eq!(
        sc.request_err("auth.setPassword", json!({ "password": "abc", "confirm": "abc" })),
        "bad_params"
    );
    let set = sc.request_ok("auth.setPassword", json!({ "password": "newpass1", "confirm": "newpass1" }));
    assert_eq!(set["needsPasswordSetup"], false);

    let session = sc.sign_in("teacher@school.test", "newpass1");
    assert_eq!(session["session"]["account"]["needsPasswordSetup"], false);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn failed_sign_in_clears_the_session() {
    let mut sc = Sidecar::spawn("2025-02-03");
    let workspace = open_workspace(&mut sc, "eljournal-auth-failed");

    let code = sc.request_err(
        "auth.signIn",
        json!({ "email": "admin@school.test", "password": "wrong-password" }),
    );
    assert_eq!(code, "invalid_credentials");
    let session = sc.request_ok("auth.session", json!({}));
    assert!(session["session"].is_null());
    assert_eq!(sc.request_err("users.list", json!({})), "unauthenticated");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn methods_need_a_workspace_first() {
    let mut sc = Sidecar::spawn("2025-02-03");
    assert_eq!(
        sc.request_err("auth.signIn", json!({ "email": "a@b.c", "password": "secret1" })),
        "no_workspace"
    );
    assert_eq!(sc.request_err("events.list", json!({})), "no_workspace");
}
