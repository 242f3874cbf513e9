use crate::auth::{self, Session};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::model::{self, Role};
use chrono::NaiveDateTime;
use rusqlite::Connection;

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// A form value as text. Missing, null and blank values read as `None`;
/// numbers are accepted and rendered as text.
pub fn form_str(params: &serde_json::Value, key: &str) -> Option<String> {
    match params.get(key)? {
        serde_json::Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    form_str(params, key).ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

/// Integer id given either as a JSON number or a numeric string.
pub fn form_id(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    let Some(raw) = form_str(params, key) else {
        return Ok(None);
    };
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| HandlerErr::new("bad_params", format!("{} must be an integer id", key)))
}

pub fn required_id(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    form_id(params, key)?.ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

/// Reporting clock: `params.now` when given, local time otherwise.
pub fn now_from(params: &serde_json::Value) -> Result<NaiveDateTime, HandlerErr> {
    match params.get("now").and_then(|v| v.as_str()) {
        Some(raw) => model::parse_datetime(raw)
            .ok_or_else(|| HandlerErr::new("bad_params", "now must be YYYY-MM-DDTHH:MM[:SS]")),
        None => Ok(chrono::Local::now().naive_local()),
    }
}

pub fn session_from(conn: &Connection, params: &serde_json::Value) -> Result<Session, HandlerErr> {
    let Some(token) = params.get("session").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::new("unauthenticated", "login required"));
    };
    auth::lookup_session(conn, token)?
        .ok_or_else(|| HandlerErr::new("unauthenticated", "session expired or unknown"))
}

pub fn require_role(
    conn: &Connection,
    params: &serde_json::Value,
    role: Role,
) -> Result<Session, HandlerErr> {
    let session = session_from(conn, params)?;
    if session.role != role {
        return Err(HandlerErr::new(
            "forbidden",
            format!("{} role required", role.as_str()),
        ));
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn form_values_accept_strings_and_numbers() {
        let p = json!({ "a": " 12 ", "b": 7, "c": "", "d": null, "e": "x" });
        assert_eq!(form_id(&p, "a").expect("a"), Some(12));
        assert_eq!(form_id(&p, "b").expect("b"), Some(7));
        assert_eq!(form_id(&p, "c").expect("c"), None);
        assert_eq!(form_id(&p, "d").expect("d"), None);
        assert_eq!(form_id(&p, "missing").expect("missing"), None);
        assert_eq!(form_id(&p, "e").map_err(|e| e.code).unwrap_err(), "bad_params");
    }

    #[test]
    fn now_defaults_and_parses() {
        let fixed = now_from(&json!({ "now": "2026-10-14T09:30" })).expect("now");
        assert_eq!(model::format_time(fixed.time()), "09:30");
        assert!(now_from(&json!({})).is_ok());
        assert!(now_from(&json!({ "now": "yesterday" })).is_err());
    }
}
