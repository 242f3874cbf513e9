use crate::auth;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use rusqlite::Connection;
use serde_json::json;

pub struct Login {
    pub session: Option<auth::Session>,
    pub account: auth::Account,
}

impl Login {
    pub fn role(&self) -> Option<Role> {
        self.session.as_ref().map(|s| s.role)
    }

    pub fn redirect(&self) -> &'static str {
        self.role().map(Role::landing_path).unwrap_or("/")
    }

    pub fn welcome(&self) -> Option<&'static str> {
        match self.role()? {
            Role::Teacher => Some("You have been logged in as a Teacher!"),
            Role::Student => Some("You have been logged in as a Student!"),
        }
    }
}

/// Verifies credentials and opens a session carrying the account's role.
/// An account without any profile authenticates but gets no session.
pub fn login(conn: &Connection, username: &str, password: &str) -> Result<Login, HandlerErr> {
    let Some(account) = auth::authenticate(conn, username, password)? else {
        log::warn!("login failed for {}", username);
        return Err(HandlerErr::new(
            "auth_failed",
            "There was an error logging in, please try again!",
        ));
    };
    let session = match auth::resolve_role(conn, account.id)? {
        Some(role) => Some(auth::open_session(conn, account.id, role)?),
        None => {
            log::warn!("account {} has no student or teacher profile", account.username);
            None
        }
    };
    log::info!(
        "login {} as {}",
        account.username,
        session.as_ref().map(|s| s.role.as_str()).unwrap_or("no role")
    );
    Ok(Login { session, account })
}

pub fn logout(conn: &Connection, token: Option<&str>) -> Result<bool, HandlerErr> {
    match token {
        Some(t) => Ok(auth::close_session(conn, t)?),
        None => Ok(false),
    }
}

fn handle_login(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let username = required_str(&req.params, "username")?;
    let password = required_str(&req.params, "password")?;
    let login = login(conn, &username, &password)?;
    Ok(json!({
        "session": login.session.as_ref().map(|s| s.token.clone()),
        "role": login.role(),
        "redirect": login.redirect(),
        "account": {
            "id": login.account.id,
            "username": login.account.username,
            "firstName": login.account.first_name,
            "lastName": login.account.last_name,
        }
    }))
}

fn handle_logout(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let closed = logout(conn, req.params.get("session").and_then(|v| v.as_str()))?;
    Ok(json!({ "loggedOut": closed, "redirect": "/" }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "auth.login" => handle_login(state, req),
        "auth.logout" => handle_logout(state, req),
        _ => return None,
    };
    Some(match resp {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
