//! Typed façade over a Redis-family key/value store (C4).
//!
//! Stream responses are walked by hand rather than deserialized through
//! `redis`'s generic `FromRedisValue` for tuples/maps: the validation
//! rules here (the lone field must be named `payload`, its value must be
//! valid message JSON) are part of this component's contract, not an
//! incidental consequence of a convenient type.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use protocol::StoredMessage;

use crate::error::AppError;

/// Default page size for `reverse_range`.
pub const PAGE_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed stream response: {0}")]
    Parse(String),
    #[error("key already exists")]
    AlreadyExists,
    #[error("key not found")]
    NotFound,
}

impl From<KvError> for AppError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::AlreadyExists => AppError::AlreadyExists,
            KvError::NotFound => AppError::NotFound,
            KvError::Parse(msg) => AppError::ParseError(msg),
            KvError::Redis(err) => AppError::Other(err.to_string()),
        }
    }
}

/// One persisted message as returned by a stream read, with its
/// store-assigned id attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub message: StoredMessage,
}

/// A reverse-range request for a single room: newest-first, optionally
/// starting strictly before `last_seen_id`.
pub struct RangeRequest<'a> {
    pub room_id: &'a str,
    pub last_seen_id: Option<&'a str>,
}

#[derive(Clone)]
pub struct KvClient {
    conn: ConnectionManager,
}

impl KvClient {
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// `XADD room_id * payload <json>`. Returns the store-assigned id.
    pub async fn append_to_stream(&self, room_id: &str, message: &StoredMessage) -> Result<String, KvError> {
        let ids = self.append_batch(&[(room_id, message)]).await?;
        ids.into_iter().next().ok_or_else(|| KvError::Parse("XADD returned no id".to_owned()))
    }

    /// Batched `XADD`, one command per entry, returning ids in order.
    pub async fn append_batch(&self, entries: &[(&str, &StoredMessage)]) -> Result<Vec<String>, KvError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for (room_id, message) in entries {
            let json = serde_json::to_string(message)
                .map_err(|err| KvError::Parse(format!("failed to encode message payload: {err}")))?;
            pipe.cmd("XADD").arg(*room_id).arg("*").arg("payload").arg(json);
        }
        let mut conn = self.conn.clone();
        let reply: redis::Value = pipe.query_async(&mut conn).await?;
        parse_id_list(&reply)
    }

    /// Single-room reverse range: the most recent page, or the page
    /// strictly before `last_seen_id` when given.
    pub async fn reverse_range(&self, request: RangeRequest<'_>, limit: usize) -> Result<Vec<StreamEntry>, KvError> {
        let mut batched = self.reverse_range_batch(&[request], limit).await?;
        Ok(batched.pop().unwrap_or_default())
    }

    /// Batched `XREVRANGE`, one command per request, each capped at `limit`.
    pub async fn reverse_range_batch(
        &self,
        requests: &[RangeRequest<'_>],
        limit: usize,
    ) -> Result<Vec<Vec<StreamEntry>>, KvError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for request in requests {
            let start = match request.last_seen_id {
                Some(id) => format!("({id}"),
                None => "+".to_owned(),
            };
            pipe.cmd("XREVRANGE").arg(request.room_id).arg(start).arg("-").arg("COUNT").arg(limit);
        }
        let mut conn = self.conn.clone();
        let reply: redis::Value = pipe.query_async(&mut conn).await?;
        parse_stream_batches(&reply, requests.len())
    }

    /// `SET key value NX EX ttl`. Returns `Ok(())` on insert,
    /// `Err(KvError::AlreadyExists)` on collision.
    pub async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::EX(ttl_secs));
        let result: Option<String> = conn.set_options(key, value, opts).await?;
        match result {
            Some(_) => Ok(()),
            None => Err(KvError::AlreadyExists),
        }
    }

    /// `GET key`, parsed as an integer. `NotFound` when absent.
    pub async fn get_int(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        let raw = value.ok_or(KvError::NotFound)?;
        raw.parse::<i64>().map_err(|err| KvError::Parse(format!("value for {key} is not an integer: {err}")))
    }
}

/// Parses the reply to a pipeline of `XADD` commands: a top-level array
/// of bulk-string ids, one per queued command.
fn parse_id_list(value: &redis::Value) -> Result<Vec<String>, KvError> {
    let redis::Value::Array(items) = value else {
        return Err(KvError::Parse("expected an array of XADD ids".to_owned()));
    };
    items
        .iter()
        .map(|item| match item {
            redis::Value::BulkString(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|err| KvError::Parse(err.to_string()))
            }
            redis::Value::Okay => Err(KvError::Parse("unexpected OK in place of an XADD id".to_owned())),
            redis::Value::Nil => Err(KvError::Parse("XADD returned nil id".to_owned())),
            _ => Err(KvError::Parse("unexpected node shape in XADD id list".to_owned())),
        })
        .collect()
}

/// One-pass walk over the flat node sequence a pipeline of `XREVRANGE`
/// commands produces: a top-level array with one entry per command, each
/// itself an array of `[id, [key, value]]` pairs. The lone field name
/// must be `"payload"`, and its value must decode as message JSON —
/// any other shape is a parse error.
fn parse_stream_batches(value: &redis::Value, expected_commands: usize) -> Result<Vec<Vec<StreamEntry>>, KvError> {
    let redis::Value::Array(commands) = value else {
        return Err(KvError::Parse("expected an array of XREVRANGE replies".to_owned()));
    };
    if commands.len() != expected_commands {
        return Err(KvError::Parse(format!(
            "expected {expected_commands} XREVRANGE replies, got {}",
            commands.len()
        )));
    }
    commands.iter().map(parse_stream_entries).collect()
}

fn parse_stream_entries(command_reply: &redis::Value) -> Result<Vec<StreamEntry>, KvError> {
    let redis::Value::Array(entries) = command_reply else {
        return Err(KvError::Parse("expected an array of stream entries".to_owned()));
    };
    entries.iter().map(parse_stream_entry).collect()
}

fn parse_stream_entry(entry: &redis::Value) -> Result<StreamEntry, KvError> {
    let redis::Value::Array(pair) = entry else {
        return Err(KvError::Parse("expected a [id, fields] pair".to_owned()));
    };
    let [id_node, fields_node] = pair.as_slice() else {
        return Err(KvError::Parse("expected exactly [id, fields]".to_owned()));
    };
    let id = bulk_string(id_node)?;

    let redis::Value::Array(fields) = fields_node else {
        return Err(KvError::Parse("expected a flat [key, value, ...] field list".to_owned()));
    };
    let [key_node, value_node] = fields.as_slice() else {
        return Err(KvError::Parse(format!("expected exactly one field, got {}", fields.len() / 2)));
    };
    let key = bulk_string(key_node)?;
    if key != "payload" {
        return Err(KvError::Parse(format!("expected field \"payload\", got {key:?}")));
    }
    let raw_json = bulk_string(value_node)?;
    let message: StoredMessage = serde_json::from_str(&raw_json)
        .map_err(|err| KvError::Parse(format!("malformed message payload: {err}")))?;

    Ok(StreamEntry { id, message })
}

fn bulk_string(value: &redis::Value) -> Result<String, KvError> {
    match value {
        redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).map_err(|err| KvError::Parse(err.to_string())),
        _ => Err(KvError::Parse("expected a bulk string node".to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(items: Vec<redis::Value>) -> redis::Value {
        redis::Value::Array(items)
    }
    fn data(s: &str) -> redis::Value {
        redis::Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn parses_well_formed_stream_batch() {
        let msg = StoredMessage { content: "hi".to_owned(), timestamp: 123, user_id: 9 };
        let json = serde_json::to_string(&msg).unwrap();
        let entry = bulk(vec![data("1700-0"), bulk(vec![data("payload"), data(&json)])]);
        let command_reply = bulk(vec![entry]);
        let top = bulk(vec![command_reply]);

        let result = parse_stream_batches(&top, 1).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].len(), 1);
        assert_eq!(result[0][0].id, "1700-0");
        assert_eq!(result[0][0].message, msg);
    }

    #[test]
    fn rejects_field_name_other_than_payload() {
        let entry = bulk(vec![data("1700-0"), bulk(vec![data("not_payload"), data("{}")])]);
        let top = bulk(vec![bulk(vec![entry])]);
        assert!(matches!(parse_stream_batches(&top, 1), Err(KvError::Parse(_))));
    }

    #[test]
    fn rejects_payload_that_is_not_valid_message_json() {
        let entry = bulk(vec![data("1700-0"), bulk(vec![data("payload"), data("not json")])]);
        let top = bulk(vec![bulk(vec![entry])]);
        assert!(matches!(parse_stream_batches(&top, 1), Err(KvError::Parse(_))));
    }

    #[test]
    fn rejects_unexpected_top_level_shape() {
        let not_an_array = redis::Value::Okay;
        assert!(matches!(parse_stream_batches(&not_an_array, 1), Err(KvError::Parse(_))));
    }

    #[test]
    fn parses_xadd_id_list() {
        let top = bulk(vec![data("1700-0"), data("1700-1")]);
        let ids = parse_id_list(&top).unwrap();
        assert_eq!(ids, vec!["1700-0".to_owned(), "1700-1".to_owned()]);
    }
}
