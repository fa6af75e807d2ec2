pub mod async_mutex;
pub mod chat_session;
pub mod cookie;
pub mod cookie_auth;
pub mod db;
pub mod email;
pub mod error;
pub mod http;
pub mod kv;
pub mod password_hash;
pub mod pubsub;
pub mod room_history;
pub mod rooms;
pub mod session;
pub mod state;
pub mod static_files;
pub mod ws;

pub use state::AppState;

use axum::Router;
use axum::extract::{FromRequestParts, Request, State};
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::{AppError, panic_message};

/// 10 KB body cap on every request, per the HTTP dispatcher's contract (C11).
const MAX_BODY_BYTES: usize = 10 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/create-account", post(http::create_account))
        .route("/api/login", post(http::login))
        .route("/api/*rest", axum::routing::any(http::not_found))
        .fallback(dispatch)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Turns a panic anywhere in request dispatch into a generic `500` instead of
/// dropping the connection. The per-request task still unwinds and is torn
/// down; nothing about the listener or other in-flight requests is affected.
fn handle_panic(payload: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let err = AppError::UncaughtException;
    tracing::error!(error = %err, panic = %panic_message(payload.as_ref()), "request handler panicked");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

/// Anything not matched by an explicit `/api/*` route: a websocket upgrade
/// on any path, or (failing that) a static file from the doc root.
///
/// The websocket check happens before routing on the path at all, mirroring
/// the original's per-connection loop, which inspects the raw request for
/// an `Upgrade: websocket` header before it ever looks at the target.
async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let is_upgrade = req
        .headers()
        .get(header::UPGRADE)
        .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"websocket"));

    if is_upgrade {
        let (mut parts, _body) = req.into_parts();
        let cookie_header =
            parts.headers.get(header::COOKIE).and_then(|value| value.to_str().ok()).map(str::to_owned);
        return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(ws) => ws.on_upgrade(move |socket| chat_session::run(socket, state.clone(), cookie_header)),
            Err(rejection) => rejection.into_response(),
        };
    }

    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    static_files::serve(&method, &path, state.doc_root()).await
}
