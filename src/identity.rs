use crate::error::{JournalError, JournalResult};
use crate::store::{self, Event, Profile, Role};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Per-process session context: who is signed in and what they are looking at.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub account: Profile,
    pub current_event: Option<Event>,
    pub selected_date: Option<String>,
}

impl Session {
    pub fn role(&self) -> Role {
        self.account.role
    }

    pub fn account_id(&self) -> &str {
        &self.account.id
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

const KDF_MEMORY_KIB: u32 = 19 * 1024;
const KDF_PASSES: u32 = 2;

/// Argon2id digest of `password` under `salt`, hex encoded.
fn digest_password(salt: &str, password: &str) -> JournalResult<String> {
    let params = argon2::Params::new(KDF_MEMORY_KIB, KDF_PASSES, 1, Some(32))
        .map_err(JournalError::PasswordHash)?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let mut hash = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut hash)
        .map_err(JournalError::PasswordHash)?;
    Ok(hex::encode(hash))
}

/// Compares every byte so the time taken does not reveal the first mismatch.
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn check_password_rules(password: &str) -> JournalResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(JournalError::bad_params(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Random password handed out with admin-created and imported accounts.
pub fn temporary_password() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("temp{}", &raw[..8])
}

/// Registers credentials and returns the new account id.
pub fn create_account(conn: &Connection, email: &str, password: &str) -> JournalResult<String> {
    let email = normalize_email(email);
    if email.is_empty() || !email.contains('@') {
        return Err(JournalError::bad_params("a valid email is required"));
    }
    check_password_rules(password)?;
    let taken: Option<i64> = conn
        .query_row("SELECT 1 FROM accounts WHERE email = ?", [&email], |r| r.get(0))
        .optional()?;
    if taken.is_some() {
        return Err(JournalError::Conflict(format!("{email} is already registered")));
    }
    let id = store::new_id();
    let salt = store::new_id();
    conn.execute(
        "INSERT INTO accounts(id, email, password_salt, password_digest, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            &email,
            &salt,
            digest_password(&salt, password)?,
            store::now_timestamp(),
        ),
    )?;
    Ok(id)
}

pub fn delete_account(conn: &Connection, account_id: &str) -> JournalResult<()> {
    conn.execute("DELETE FROM accounts WHERE id = ?", [account_id])?;
    Ok(())
}

/// Checks credentials and returns the account id.
pub fn verify_credentials(conn: &Connection, email: &str, password: &str) -> JournalResult<String> {
    let email = normalize_email(email);
    let row: Option<(String, String, String)> = conn
        .query_row(
            "SELECT id, password_salt, password_digest FROM accounts WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((id, salt, digest)) = row else {
        return Err(JournalError::InvalidCredentials);
    };
    if !digests_match(&digest_password(&salt, password)?, &digest) {
        return Err(JournalError::InvalidCredentials);
    }
    Ok(id)
}

pub fn set_password(conn: &Connection, account_id: &str, password: &str) -> JournalResult<()> {
    check_password_rules(password)?;
    let salt = store::new_id();
    let n = conn.execute(
        "UPDATE accounts SET password_salt = ?, password_digest = ? WHERE id = ?",
        (&salt, digest_password(&salt, password)?, account_id),
    )?;
    if n == 0 {
        return Err(JournalError::not_found("account"));
    }
    Ok(())
}

/// Finds the role profile for an account by probing every role table.
/// No profile is `NoRole`; profiles in more than one table are an integrity
/// violation and are refused rather than resolved by precedence.
pub fn resolve_role(conn: &Connection, account_id: &str) -> JournalResult<Profile> {
    let mut found: Vec<Profile> = Vec::new();
    for role in Role::ALL {
        if let Some(p) = store::get_profile(conn, role, account_id)? {
            found.push(p);
        }
    }
    match found.len() {
        0 => Err(JournalError::NoRole),
        1 => Ok(found.remove(0)),
        _ => {
            let roles: Vec<&str> = found.iter().map(|p| p.role.as_str()).collect();
            tracing::error!(account_id, ?roles, "account has several role profiles");
            Err(JournalError::IntegrityViolation {
                account_id: account_id.to_string(),
            })
        }
    }
}

/// Credential check followed by role resolution.
pub fn sign_in(conn: &Connection, email: &str, password: &str) -> JournalResult<Profile> {
    let account_id = verify_credentials(conn, email, password)?;
    resolve_role(conn, &account_id)
}

/// Creates account plus role profile in one transaction.
pub fn create_user(
    conn: &Connection,
    email: &str,
    password: &str,
    mut profile: Profile,
) -> JournalResult<Profile> {
    let tx = conn.unchecked_transaction()?;
    let id = create_account(&tx, email, password)?;
    profile.id = id;
    profile.email = normalize_email(email);
    store::insert_profile(&tx, &profile)?;
    tx.commit()?;
    Ok(profile)
}
