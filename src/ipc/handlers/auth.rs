use crate::error::{JournalError, JournalResult};
use crate::events;
use crate::identity::{self, Session};
use crate::ipc::error::IntoResponse;
use crate::ipc::types::{AppState, Params, Request};
use crate::store::{self, Profile, Role};
use serde_json::json;

fn bootstrap_admin(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    let p = Params(&req.params);
    let email = p.text("email")?;
    let password = p.str("password")?;
    let name = p.opt_str("name").map(str::trim).unwrap_or("Administrator");

    if store::count_profiles(conn, Role::Admin)? > 0 {
        return Err(JournalError::Conflict("an administrator already exists".into()));
    }
    let admin = identity::create_user(
        conn,
        email,
        password,
        Profile::draft(Role::Admin, name),
    )?;
    tracing::info!(account_id = %admin.id, "first administrator created");
    Ok(json!({ "user": admin }))
}

fn sign_in(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    // A failed attempt always leaves the process signed out.
    state.session = None;
    let today = state.today();
    let conn = state.conn()?;
    let p = Params(&req.params);
    let email = p.text("email")?;
    let password = p.str("password")?;

    let account = identity::sign_in(conn, email, password).inspect_err(|e| {
        tracing::warn!(email, code = e.code(), "sign-in refused");
    })?;
    let current_event = events::resolve_event_for(conn, &account, &today)?;
    tracing::info!(account_id = %account.id, role = account.role.as_str(), "signed in");
    let session = Session {
        account,
        current_event,
        selected_date: None,
    };
    let result = json!({ "session": session });
    state.session = Some(session);
    Ok(result)
}

fn sign_out(state: &mut AppState) -> JournalResult<serde_json::Value> {
    if let Some(s) = state.session.take() {
        tracing::info!(account_id = %s.account_id(), "signed out");
    }
    Ok(json!({ "signedOut": true }))
}

fn set_password(state: &mut AppState, req: &Request) -> JournalResult<serde_json::Value> {
    let conn = state.conn()?;
    let session = state.session()?;
    let p = Params(&req.params);
    let password = p.str("password")?;
    let confirm = p.str("confirm")?;
    if password != confirm {
        return Err(JournalError::bad_params("passwords do not match"));
    }
    let (role, id) = (session.role(), session.account_id().to_string());

    let tx = conn.unchecked_transaction()?;
    identity::set_password(&tx, &id, password)?;
    store::set_needs_password_setup(&tx, role, &id, false)?;
    tx.commit()?;

    if let Some(s) = state.session.as_mut() {
        s.account.needs_password_setup = false;
    }
    Ok(json!({ "needsPasswordSetup": false }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "setup.bootstrapAdmin" => bootstrap_admin(state, req),
        "auth.signIn" => sign_in(state, req),
        "auth.signOut" => sign_out(state),
        "auth.session" => Ok(json!({ "session": state.session })),
        "auth.setPassword" => set_password(state, req),
        _ => return None,
    };
    Some(result.response(&req.id))
}
