//! Relational queries against the `users` table.
//!
//! Plain `sqlx::query`/`query_as` rather than the `query!` macros: those
//! require a live database (or an offline cache file) at compile time,
//! which this repo does not assume is available.

use sqlx::Row;
use sqlx::mysql::MySqlConnection;

use crate::error::AppError;

/// A user's public identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// The view of a user loaded only during login, carrying the password hash.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub hashed_password: String,
}

/// Classifies which unique constraint a MySQL insert violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupConflict {
    Username,
    Email,
}

/// MySQL's error code for a unique-key violation (`ER_DUP_ENTRY`).
const ER_DUP_ENTRY: &str = "1062";

/// Inserts a new user row. On a unique-constraint violation, classifies
/// which column conflicted so the caller can map it to `USERNAME_EXISTS`
/// or `EMAIL_EXISTS`.
pub async fn create_user(
    conn: &mut MySqlConnection,
    username: &str,
    email: &str,
    hashed_password: &str,
) -> Result<i64, AppError> {
    let result = sqlx::query("INSERT INTO users (username, email, password) VALUES (?, ?, ?)")
        .bind(username)
        .bind(email)
        .bind(hashed_password)
        .execute(&mut *conn)
        .await;

    match result {
        Ok(done) => Ok(i64::try_from(done.last_insert_id()).unwrap_or(0)),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(ER_DUP_ENTRY) => {
            // As per MySQL documentation, er_dup_entry messages are
            // formatted as: Duplicate entry '<value>' for key '<table.index>'
            match classify_dup_entry(db_err.message()) {
                Some(SignupConflict::Username) => Err(AppError::UsernameExists),
                Some(SignupConflict::Email) => Err(AppError::EmailExists),
                None => Err(AppError::Other(db_err.to_string())),
            }
        }
        Err(err) => Err(err.into()),
    }
}

fn classify_dup_entry(message: &str) -> Option<SignupConflict> {
    if message.ends_with("'users.username'") || message.ends_with("'users_username_key'") {
        Some(SignupConflict::Username)
    } else if message.ends_with("'users.email'") || message.ends_with("'users_email_key'") {
        Some(SignupConflict::Email)
    } else {
        None
    }
}

/// Loads the auth view of a user by email, for login. Absent rows are
/// reported as `AppError::NotFound`, which the caller collapses into
/// `LoginFailed` alongside a hash mismatch (enumeration defense).
pub async fn find_auth_user_by_email(conn: &mut MySqlConnection, email: &str) -> Result<AuthUser, AppError> {
    let row = sqlx::query("SELECT id, password AS hashed_password FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    let row = row.ok_or(AppError::NotFound)?;
    Ok(AuthUser { id: row.get("id"), hashed_password: row.get("hashed_password") })
}

/// Loads a user's public identity by id. Used by cookie auth (C6) after
/// resolving a session token to a `user_id`.
pub async fn find_user_by_id(conn: &mut MySqlConnection, user_id: i64) -> Result<User, AppError> {
    let row = sqlx::query("SELECT id, username FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    let row = row.ok_or(AppError::NotFound)?;
    Ok(User { id: row.get("id"), username: row.get("username") })
}

/// Batch-loads usernames for a set of distinct user ids, used by the
/// room-history service (C9) to build a `UsernameMap`. Skips the query
/// entirely when `user_ids` is empty.
///
/// MySQL has no array-bind equivalent to Postgres's `= ANY($1)`, so the
/// `IN (...)` placeholder list is built to match `user_ids`'s length.
pub async fn find_usernames(conn: &mut MySqlConnection, user_ids: &[i64]) -> Result<Vec<User>, AppError> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; user_ids.len()].join(", ");
    let sql = format!("SELECT id, username FROM users WHERE id IN ({placeholders})");
    let mut query = sqlx::query(&sql);
    for user_id in user_ids {
        query = query.bind(user_id);
    }
    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.into_iter().map(|row| User { id: row.get("id"), username: row.get("username") }).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_username_conflict_from_dup_entry_message() {
        let msg = "Duplicate entry 'alice' for key 'users.username'";
        assert_eq!(classify_dup_entry(msg), Some(SignupConflict::Username));
    }

    #[test]
    fn classifies_email_conflict_from_dup_entry_message() {
        let msg = "Duplicate entry 'a@x.com' for key 'users.email'";
        assert_eq!(classify_dup_entry(msg), Some(SignupConflict::Email));
    }

    #[test]
    fn unrecognized_key_name_classifies_as_none() {
        let msg = "Duplicate entry '1' for key 'PRIMARY'";
        assert_eq!(classify_dup_entry(msg), None);
    }
}
