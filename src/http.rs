//! `/api/*` request handlers (C11): account creation and login. Routing,
//! the websocket upgrade handoff, and static-file fallback are wired up in
//! [`crate::build_router`].

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use protocol::{CreateAccountRequest, HttpErrorBody, LoginRequest};
use serde::de::DeserializeOwned;

use crate::cookie_auth;
use crate::db::repo;
use crate::email;
use crate::error::AppError;
use crate::password_hash;
use crate::state::AppState;

const MIN_USERNAME_LEN: usize = 4;
const MAX_USERNAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 100;
const MIN_PASSWORD_LEN: usize = 10;
const MAX_PASSWORD_LEN: usize = 100;

fn json_error(status: StatusCode, id: &str, message: impl Into<String>) -> Response {
    (status, Json(HttpErrorBody { id: id.to_owned(), message: message.into() })).into_response()
}

fn error_response(err: AppError) -> Response {
    let code = err.http_code();
    match err {
        AppError::LoginFailed => json_error(StatusCode::BAD_REQUEST, code, "Login failed"),
        AppError::UsernameExists => json_error(StatusCode::BAD_REQUEST, code, ""),
        AppError::EmailExists => json_error(StatusCode::BAD_REQUEST, code, ""),
        AppError::BadRequest(message) => json_error(StatusCode::BAD_REQUEST, code, message),
        other => {
            tracing::warn!(error = %other, "unhandled error in API handler");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Parses a request body as JSON, the way the HTTP dispatcher's contract
/// requires: a missing or non-`application/json` `Content-Type`, or a body
/// that doesn't deserialize, both become `AppError::BadRequest` -- and so
/// both render through [`error_response`] as the same frozen
/// `{"id":"BAD_REQUEST","message":...}` envelope every other validation
/// failure uses. Using the `Json<T>` extractor directly would instead let
/// axum's own rejections (`415`, `422`) leak past that envelope.
fn parse_json_body<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, AppError> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or("");
    let is_json = content_type.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case("application/json");
    if !is_json {
        return Err(AppError::BadRequest("expected Content-Type: application/json".to_owned()));
    }
    serde_json::from_slice(body).map_err(|err| AppError::BadRequest(format!("malformed request body: {err}")))
}

/// `POST /api/create-account`.
pub async fn create_account(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let req: CreateAccountRequest = match parse_json_body(&headers, &body) {
        Ok(req) => req,
        Err(err) => return error_response(err),
    };
    match create_account_impl(&state, req).await {
        Ok(cookie) => (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_account_impl(state: &AppState, req: CreateAccountRequest) -> Result<String, AppError> {
    if req.username.chars().count() < MIN_USERNAME_LEN || req.username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::BadRequest("username: invalid size".to_owned()));
    }
    if req.email.chars().count() > MAX_EMAIL_LEN {
        return Err(AppError::BadRequest("email: too long".to_owned()));
    }
    if !email::is_email(&req.email) {
        return Err(AppError::BadRequest("email: invalid format".to_owned()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN || req.password.chars().count() > MAX_PASSWORD_LEN {
        return Err(AppError::BadRequest("password: invalid size".to_owned()));
    }

    let hashed = password_hash::hash_password(&req.password)?;

    let mut conn = state.db().get_connection().await?;
    let user_id = repo::create_user(&mut conn, &req.username, &req.email, &hashed).await?;

    cookie_auth::set_session_cookie(state.kv(), user_id).await
}

/// `POST /api/login`.
pub async fn login(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let req: LoginRequest = match parse_json_body(&headers, &body) {
        Ok(req) => req,
        Err(err) => return error_response(err),
    };
    match login_impl(&state, req).await {
        Ok(cookie) => (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]).into_response(),
        Err(err) => error_response(err),
    }
}

async fn login_impl(state: &AppState, req: LoginRequest) -> Result<String, AppError> {
    if req.email.chars().count() > MAX_EMAIL_LEN {
        return Err(AppError::BadRequest("email: too long".to_owned()));
    }
    if !email::is_email(&req.email) {
        return Err(AppError::BadRequest("email: invalid format".to_owned()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN || req.password.chars().count() > MAX_PASSWORD_LEN {
        return Err(AppError::BadRequest("password: invalid size".to_owned()));
    }

    let mut conn = state.db().get_connection().await?;
    let auth_user = match repo::find_auth_user_by_email(&mut conn, &req.email).await {
        Ok(user) => user,
        Err(AppError::NotFound) => return Err(AppError::LoginFailed),
        Err(err) => return Err(err),
    };
    drop(conn);

    if !password_hash::verify_password(&req.password, &auth_user.hashed_password) {
        return Err(AppError::LoginFailed);
    }

    cookie_auth::set_session_cookie(state.kv(), auth_user.id).await
}

/// `/api/*` routes not otherwise matched.
pub async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "")
}
