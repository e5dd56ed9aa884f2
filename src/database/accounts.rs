use rusqlite::{Connection, OptionalExtension};

use super::now_millis;
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::utils;

pub fn create_user(conn: &Connection, username: &str, password: &str) -> AppResult<User> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::validation("username and password are required"));
    }
    if find_user(conn, username)?.is_some() {
        return Err(AppError::Conflict(format!("username '{}' is taken", username)));
    }

    let salt = uuid::Uuid::new_v4().to_string();
    let password_hash = utils::hash_password(&salt, password);
    let now = now_millis();

    conn.execute(
        "INSERT INTO users (username, password_hash, salt, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![username, &password_hash, &salt, now],
    )?;

    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        password_hash,
        salt,
        created_at: now,
    })
}

pub fn find_user(conn: &Connection, username: &str) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, salt, created_at FROM users WHERE username = ?1",
            [username.trim()],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    salt: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Same error for unknown users and wrong passwords.
pub fn verify_credentials(conn: &Connection, username: &str, password: &str) -> AppResult<User> {
    match find_user(conn, username)? {
        Some(user) if utils::verify_password(&user.salt, password, &user.password_hash) => Ok(user),
        _ => Err(AppError::Unauthorized("invalid credentials".into())),
    }
}

/// Issues a bearer token valid for `ttl_secs`.
pub fn create_session(conn: &Connection, user_id: i64, ttl_secs: i64) -> AppResult<String> {
    let token = utils::new_token();
    let now = now_millis();
    let expires_at = now.saturating_add(ttl_secs.saturating_mul(1000));
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![utils::hash_token(&token), user_id, now, expires_at],
    )?;
    Ok(token)
}

/// Resolves a bearer token to its user id.
pub fn user_for_token(conn: &Connection, token: &str) -> AppResult<i64> {
    let user_id: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
            rusqlite::params![utils::hash_token(token), now_millis()],
            |row| row.get(0),
        )
        .optional()?;
    user_id.ok_or_else(|| AppError::Unauthorized("invalid or expired token".into()))
}

pub fn purge_expired_sessions(conn: &Connection) -> AppResult<usize> {
    let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now_millis()])?;
    Ok(removed)
}
