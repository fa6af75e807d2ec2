// protocol: wire-schema types shared between the chat server and any client.
//
// All WebSocket frames are UTF-8 JSON objects of the shape
// `{"type": <string>, "payload": <object>}`; HTTP error bodies are
// `{"id": <CODE>, "message": <text>}`. Everything here is a plain serde
// type -- no I/O, no business logic.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared sub-types
// ---------------------------------------------------------------------------

/// A chat room participant's public identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub username: String,
}

/// A single persisted chat message, as carried on the wire.
///
/// `id` is always present here; the server never serializes a message
/// before the KV store has assigned it a stream id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub content: String,
    pub user: UserRef,
    pub timestamp: i64,
}

/// A page of room history plus a "more history exists" flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessageBatch {
    pub messages: Vec<WireMessage>,
    pub has_more_messages: bool,
}

/// One room's static identity plus its initial history, as sent in `hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRoom {
    pub id: String,
    pub name: String,
    pub messages: Vec<WireMessage>,
    #[serde(rename = "hasMoreMessages")]
    pub has_more_messages: bool,
}

// ---------------------------------------------------------------------------
// Client -> Server messages
// ---------------------------------------------------------------------------

/// Body of a single client-submitted message -- no id, no timestamp yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessageBody {
    pub content: String,
}

/// `clientMessages` event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessagesPayload {
    pub room_id: String,
    pub messages: Vec<ClientMessageBody>,
}

/// `requestRoomHistory` event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRoomHistoryPayload {
    pub room_id: String,
    pub first_message_id: String,
}

/// Messages a client may send over the websocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    #[serde(rename = "clientMessages")]
    ClientMessages(ClientMessagesPayload),
    #[serde(rename = "requestRoomHistory")]
    RequestRoomHistory(RequestRoomHistoryPayload),
}

// ---------------------------------------------------------------------------
// Server -> Client messages
// ---------------------------------------------------------------------------

/// `hello` event payload: sent once, as the very first frame of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub me: UserRef,
    pub rooms: Vec<WireRoom>,
}

/// `serverMessages` event payload: a fan-out broadcast to room subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessagesPayload {
    pub room_id: String,
    pub messages: Vec<WireMessage>,
}

/// `roomHistory` event payload: the response to `requestRoomHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHistoryPayload {
    pub room_id: String,
    pub messages: Vec<WireMessage>,
    #[serde(rename = "hasMoreMessages")]
    pub has_more_messages: bool,
}

/// Messages the server may send over the websocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    #[serde(rename = "hello")]
    Hello(HelloPayload),
    #[serde(rename = "serverMessages")]
    ServerMessages(ServerMessagesPayload),
    #[serde(rename = "roomHistory")]
    RoomHistory(RoomHistoryPayload),
}

// ---------------------------------------------------------------------------
// KV-store payload (not sent over the websocket, stored in the stream)
// ---------------------------------------------------------------------------

/// The JSON payload stored for a single entry in a room's KV stream.
///
/// No `id` field: the id is assigned by the KV store itself (the stream
/// entry id), not carried inside the stored JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub content: String,
    pub timestamp: i64,
    pub user_id: i64,
}

// ---------------------------------------------------------------------------
// HTTP API types
// ---------------------------------------------------------------------------

/// `POST /api/create-account` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// `POST /api/login` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Frozen HTTP error envelope used by all non-2xx API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorBody {
    pub id: String,
    pub message: String,
}

/// Frozen v1 HTTP error codes (see spec §6/§7).
pub mod error_codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const USERNAME_EXISTS: &str = "USERNAME_EXISTS";
    pub const EMAIL_EXISTS: &str = "EMAIL_EXISTS";
    pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_round_trips_through_json() {
        let json = r#"{"type":"clientMessages","payload":{"roomId":"wasm","messages":[{"content":"hi"}]}}"#;
        let evt: ClientEvent = serde_json::from_str(json).unwrap();
        match evt {
            ClientEvent::ClientMessages(p) => {
                assert_eq!(p.room_id, "wasm");
                assert_eq!(p.messages.len(), 1);
                assert_eq!(p.messages[0].content, "hi");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn request_room_history_round_trips_through_json() {
        let json = r#"{"type":"requestRoomHistory","payload":{"roomId":"wasm","firstMessageId":"123-0"}}"#;
        let evt: ClientEvent = serde_json::from_str(json).unwrap();
        match evt {
            ClientEvent::RequestRoomHistory(p) => {
                assert_eq!(p.room_id, "wasm");
                assert_eq!(p.first_message_id, "123-0");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn hello_payload_serializes_with_camel_case_fields() {
        let evt = ServerEvent::Hello(HelloPayload {
            me: UserRef { id: 1, username: "alice".to_owned() },
            rooms: vec![WireRoom {
                id: "wasm".to_owned(),
                name: "Web assembly".to_owned(),
                messages: vec![],
                has_more_messages: false,
            }],
        });
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], "hello");
        assert_eq!(json["payload"]["me"]["username"], "alice");
        assert_eq!(json["payload"]["rooms"][0]["hasMoreMessages"], false);
    }

    #[test]
    fn stored_message_has_no_id_field() {
        let msg = StoredMessage { content: "hi".to_owned(), timestamp: 123, user_id: 9 };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn unknown_event_type_fails_to_parse() {
        let json = r#"{"type":"bogus","payload":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }
}
