use crate::model::Role;
use crate::records;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub account_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Returns the account when `password` matches the stored hash.
pub fn authenticate(
    conn: &Connection,
    username: &str,
    password: &str,
) -> rusqlite::Result<Option<Account>> {
    let row: Option<(Account, String, String)> = conn
        .query_row(
            "SELECT id, username, first_name, last_name, password_hash, password_salt
             FROM accounts WHERE username = ?",
            [username],
            |r| {
                Ok((
                    Account {
                        id: r.get(0)?,
                        username: r.get(1)?,
                        first_name: r.get(2)?,
                        last_name: r.get(3)?,
                    },
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()?;
    Ok(row.and_then(|(account, hash, salt)| {
        (hash_password(&salt, password) == hash).then_some(account)
    }))
}

/// Role from the profile the account owns. A teacher profile wins when both
/// exist; no profile means no role.
pub fn resolve_role(conn: &Connection, account_id: i64) -> rusqlite::Result<Option<Role>> {
    if records::teacher_for_account(conn, account_id)?.is_some() {
        return Ok(Some(Role::Teacher));
    }
    if records::student_for_account(conn, account_id)?.is_some() {
        return Ok(Some(Role::Student));
    }
    Ok(None)
}

pub fn open_session(conn: &Connection, account_id: i64, role: Role) -> rusqlite::Result<Session> {
    let token = Uuid::new_v4().to_string();
    let created_at = chrono::Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO sessions(token, account_id, role, created_at) VALUES(?, ?, ?, ?)",
        (&token, account_id, role.as_str(), &created_at),
    )?;
    Ok(Session {
        token,
        account_id,
        role,
    })
}

pub fn lookup_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<Session>> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT account_id, role FROM sessions WHERE token = ?",
            [token],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    Ok(row.and_then(|(account_id, role)| {
        Role::parse(&role).map(|role| Session {
            token: token.to_string(),
            account_id,
            role,
        })
    }))
}

pub fn close_session(conn: &Connection, token: &str) -> rusqlite::Result<bool> {
    let n = conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(n > 0)
}
