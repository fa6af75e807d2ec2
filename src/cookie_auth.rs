//! Bridges the session store (C5) and HTTP request/response headers (C6).

use crate::cookie::{CookieList, SameSite, SetCookieBuilder};
use crate::db::repo::{self, User};
use crate::error::AppError;
use crate::kv::KvClient;
use crate::session;

const SESSION_COOKIE_NAME: &str = "sid";

/// Issues a new session for `user_id` and builds its `Set-Cookie` header.
pub async fn set_session_cookie(kv: &KvClient, user_id: i64) -> Result<String, AppError> {
    let token = session::issue(kv, user_id, session::DEFAULT_TTL_SECS).await?;
    let header = SetCookieBuilder::new(SESSION_COOKIE_NAME, token)
        .map_err(|_| AppError::Other("generated session token was not a valid cookie value".to_owned()))?
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(session::DEFAULT_TTL_SECS)
        .build_header();
    Ok(header)
}

/// Finds the `sid` cookie in a `Cookie:` header and resolves it to a
/// `user_id`. Absent or unknown tokens are `RequiresAuth`.
pub async fn user_id_from_cookie_header(kv: &KvClient, cookie_header: Option<&str>) -> Result<i64, AppError> {
    let header = cookie_header.ok_or(AppError::RequiresAuth)?;
    let token = CookieList::new(header).get(SESSION_COOKIE_NAME).ok_or(AppError::RequiresAuth)?;
    session::lookup(kv, token).await
}

/// As [`user_id_from_cookie_header`], then loads the full user from the
/// relational DB. A dangling session (user deleted) collapses to
/// `RequiresAuth`.
pub async fn user_from_cookie_header(
    kv: &KvClient,
    db: &mut sqlx::mysql::MySqlConnection,
    cookie_header: Option<&str>,
) -> Result<User, AppError> {
    let user_id = user_id_from_cookie_header(kv, cookie_header).await?;
    match repo::find_user_by_id(db, user_id).await {
        Ok(user) => Ok(user),
        Err(AppError::NotFound) => Err(AppError::RequiresAuth),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_session_cookie_header_would_carry_expected_attributes() {
        // set_session_cookie depends on a live KV store; exercise the
        // header shape directly instead, matching build_header's contract.
        let header = SetCookieBuilder::new("sid", "token123")
            .unwrap()
            .http_only(true)
            .same_site(SameSite::Strict)
            .max_age(session::DEFAULT_TTL_SECS)
            .build_header();
        assert_eq!(header, "sid=token123; HttpOnly; Max-Age=604800; SameSite=Strict");
    }
}
