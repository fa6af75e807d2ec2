//! Error kinds shared across the server, mirroring §7 of the design: a
//! small closed set of concept-level failures, each with a fixed mapping
//! to an HTTP response or websocket close behavior at the call boundary.

use thiserror::Error;

/// A server-wide error. Component-level error types (`PoolError`, `KvError`)
/// convert into this at their call boundary via `From`.
#[derive(Debug, Error)]
pub enum AppError {
    /// No session cookie, or the cookie names an unknown/expired session.
    #[error("authentication required")]
    RequiresAuth,

    /// Login credentials did not match any account. Deliberately
    /// indistinguishable from an unknown email (see C11).
    #[error("invalid email or password")]
    LoginFailed,

    #[error("username already in use")]
    UsernameExists,

    #[error("email already in use")]
    EmailExists,

    #[error("resource not found")]
    NotFound,

    /// A `SET NX` collision. Callers that can retry (session issuance)
    /// do so internally; this should not normally escape to the top.
    #[error("key already exists")]
    AlreadyExists,

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Malformed JSON from the KV store or a websocket client.
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    /// Caught at the HTTP/websocket dispatch boundary from a panicking handler.
    #[error("internal error")]
    UncaughtException,

    /// Opaque lower-layer failure (DB connect/reset/ping, socket I/O) not
    /// otherwise classified above; logged and surfaced as an internal error.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Other(err.to_string())
    }
}

impl AppError {
    /// The `{"id": ..., "message": ...}` code used in HTTP error bodies.
    /// `RequiresAuth` has no HTTP code: it is only ever surfaced as a
    /// websocket close, never as a JSON body (see C10).
    pub fn http_code(&self) -> &'static str {
        match self {
            AppError::LoginFailed => protocol::error_codes::LOGIN_FAILED,
            AppError::UsernameExists => protocol::error_codes::USERNAME_EXISTS,
            AppError::EmailExists => protocol::error_codes::EMAIL_EXISTS,
            _ => protocol::error_codes::BAD_REQUEST,
        }
    }
}

/// Renders a `catch_unwind` payload as a loggable string. The payload is
/// almost always a `&str` or `String` (the two types `panic!` produces),
/// but any other payload type just falls back to a fixed marker.
pub fn panic_message(payload: &(dyn std::any::Any + Send + 'static)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
