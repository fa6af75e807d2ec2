//! Per-client websocket session state machine (C10).
//!
//! `Authenticating -> BeforeHello -> Running -> Closed`. Mirrors the
//! sequencing of the original's `chat_websocket_session::run`: authenticate
//! from the preserved upgrade request, lock writes, subscribe, load
//! history, emit hello, release the write lock, then loop reads.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::FutureExt;
use protocol::{
    ClientEvent, ClientMessagesPayload, HelloPayload, RequestRoomHistoryPayload, ServerEvent, ServerMessagesPayload,
    StoredMessage, UserRef, WireRoom,
};
use tracing::{info, warn};

use crate::cookie_auth;
use crate::db::repo::User;
use crate::error::{AppError, panic_message};
use crate::pubsub::{Subscriber, SubscriberHandle};
use crate::room_history;
use crate::rooms;
use crate::state::AppState;
use crate::ws::{CLOSE_POLICY_VIOLATION, ChatReader, ChatWriter};

/// Subscriber adapter: the bus hands delivered payloads straight to this
/// session's websocket. A write failure (socket already gone) is logged
/// and swallowed -- the dispatch loop's next read observes the closed
/// connection and tears the session down on its own.
///
/// `on_message` returns the write future directly instead of spawning one of
/// its own: `PubSubBus::publish` already spawns a single task per subscriber
/// per publication, and awaits this future from inside it. Spawning again
/// here would let two publications to the same room race each other onto
/// this session's socket out of publication order.
struct BusRelay {
    writer: ChatWriter,
}

impl Subscriber for BusRelay {
    fn on_message<'a>(&'a self, topic_id: &'a str, message: Arc<str>) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if let Err(err) = self.writer.write(&message).await {
                warn!(topic_id, error = %err, "dropped late delivery to a closed websocket");
            }
        })
    }
}

/// Runs a session to completion. Never surfaces an error to the caller --
/// any failure along the way just ends the session.
pub async fn run(socket: axum::extract::ws::WebSocket, state: AppState, cookie_header: Option<String>) {
    let (writer, mut reader) = crate::ws::split(socket);

    // Authenticating: websocket clients can't observe an HTTP 401 from a
    // failed upgrade, so auth failure is signaled by accepting then closing.
    let user = match authenticate(&state, cookie_header.as_deref()).await {
        Ok(user) => user,
        Err(err) => {
            info!(error = %err, "websocket authentication failed");
            let _ = writer.close(CLOSE_POLICY_VIOLATION, "authentication required").await;
            return;
        }
    };

    // A panic anywhere in the authenticated session body must not take down
    // the pool, the pub/sub bus, or any other session's task -- it ends only
    // this connection, logged the same as any other session-ending error.
    let outcome = AssertUnwindSafe(run_authenticated(writer, &mut reader, &state, user)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => info!(error = %err, "chat session ended"),
        Err(panic) => {
            let err = AppError::UncaughtException;
            warn!(error = %err, panic = %panic_message(panic.as_ref()), "chat session task panicked");
        }
    }
}

async fn authenticate(state: &AppState, cookie_header: Option<&str>) -> Result<User, AppError> {
    let mut conn = state.db().get_connection().await?;
    cookie_auth::user_from_cookie_header(state.kv(), &mut conn, cookie_header).await
}

async fn run_authenticated(
    writer: ChatWriter,
    reader: &mut ChatReader,
    state: &AppState,
    current_user: User,
) -> Result<(), AppError> {
    // BeforeHello: lock writes before anything else can race a write in.
    let write_guard = writer.lock_writes().await;

    let relay = Arc::new(BusRelay { writer: writer.clone() });
    let handle = SubscriberHandle::new(relay);
    let room_ids = rooms::room_ids();
    let _subscription = state.pubsub().subscribe_guarded(handle, &room_ids);

    let (batches, usernames) = room_history::fetch_initial(state.kv(), state.db(), &room_ids).await?;
    let wire_rooms = rooms::ROOMS
        .iter()
        .zip(batches)
        .map(|(room, batch)| WireRoom {
            id: room.id.to_owned(),
            name: room.name.to_owned(),
            messages: batch.messages,
            has_more_messages: batch.has_more_messages,
        })
        .collect();

    let hello = ServerEvent::Hello(HelloPayload {
        me: UserRef { id: current_user.id, username: current_user.username.clone() },
        rooms: wire_rooms,
    });
    let serialized = serde_json::to_string(&hello).map_err(|err| AppError::Other(err.to_string()))?;
    writer.write_locked(&write_guard, &serialized).await?;

    // Running: releasing the guard lets broadcasts and the dispatch loop's
    // own responses interleave with ordinary write-lock contention.
    drop(write_guard);
    let _ = usernames;

    loop {
        let raw = reader.read().await?;
        let event: ClientEvent = match serde_json::from_str(&raw) {
            Ok(event) => event,
            Err(err) => return Err(AppError::ParseError(err.to_string())),
        };
        dispatch(event, &writer, state, &current_user).await?;
    }
}

async fn dispatch(event: ClientEvent, writer: &ChatWriter, state: &AppState, current_user: &User) -> Result<(), AppError> {
    match event {
        ClientEvent::ClientMessages(payload) => handle_client_messages(payload, state, current_user).await,
        ClientEvent::RequestRoomHistory(payload) => handle_request_room_history(payload, writer, state).await,
    }
}

async fn handle_client_messages(payload: ClientMessagesPayload, state: &AppState, current_user: &User) -> Result<(), AppError> {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let stored: Vec<StoredMessage> =
        payload.messages.iter().map(|msg| StoredMessage { content: msg.content.clone(), timestamp, user_id: current_user.id }).collect();

    let entries: Vec<(&str, &StoredMessage)> = stored.iter().map(|msg| (payload.room_id.as_str(), msg)).collect();
    let ids = state.kv().append_batch(&entries).await?;

    let wire_messages = stored
        .into_iter()
        .zip(ids)
        .map(|(msg, id)| protocol::WireMessage {
            id,
            content: msg.content,
            user: UserRef { id: current_user.id, username: current_user.username.clone() },
            timestamp: msg.timestamp,
        })
        .collect();

    let event = ServerEvent::ServerMessages(ServerMessagesPayload { room_id: payload.room_id.clone(), messages: wire_messages });
    let serialized = serde_json::to_string(&event).map_err(|err| AppError::Other(err.to_string()))?;
    state.pubsub().publish(&payload.room_id, Arc::from(serialized));
    Ok(())
}

async fn handle_request_room_history(payload: RequestRoomHistoryPayload, writer: &ChatWriter, state: &AppState) -> Result<(), AppError> {
    let batch = room_history::fetch_room(state.kv(), state.db(), &payload.room_id, Some(&payload.first_message_id)).await?;
    let event = ServerEvent::RoomHistory(protocol::RoomHistoryPayload {
        room_id: payload.room_id,
        messages: batch.messages,
        has_more_messages: batch.has_more_messages,
    });
    let serialized = serde_json::to_string(&event).map_err(|err| AppError::Other(err.to_string()))?;
    writer.write(&serialized).await
}
