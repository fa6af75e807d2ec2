//! Composes KV room history with relational username lookup (C9).

use std::collections::HashMap;

use protocol::{UserRef, WireMessage, WireMessageBatch};

use crate::db::Pool;
use crate::db::repo;
use crate::error::AppError;
use crate::kv::{KvClient, PAGE_SIZE, RangeRequest, StreamEntry};

/// `user_id -> username`, populated from a single batched query. Ids with
/// no matching row are simply absent; the serializer then emits an empty
/// username for that message's author.
pub type UsernameMap = HashMap<i64, String>;

fn to_wire_messages(entries: Vec<StreamEntry>, usernames: &UsernameMap) -> Vec<WireMessage> {
    entries
        .into_iter()
        .map(|entry| {
            let username = usernames.get(&entry.message.user_id).cloned().unwrap_or_default();
            WireMessage {
                id: entry.id,
                content: entry.message.content,
                user: UserRef { id: entry.message.user_id, username },
                timestamp: entry.message.timestamp,
            }
        })
        .collect()
}

async fn load_usernames(db: &Pool, entries: &[Vec<StreamEntry>]) -> Result<UsernameMap, AppError> {
    let mut user_ids: Vec<i64> = entries.iter().flatten().map(|entry| entry.message.user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();

    if user_ids.is_empty() {
        return Ok(UsernameMap::new());
    }

    let mut conn = db.get_connection().await?;
    let users = repo::find_usernames(&mut conn, &user_ids).await?;
    Ok(users.into_iter().map(|user| (user.id, user.username)).collect())
}

/// Fetches the most recent page for every room in `room_ids`, plus a
/// `UsernameMap` covering every author that appears in any of them.
pub async fn fetch_initial(kv: &KvClient, db: &Pool, room_ids: &[String]) -> Result<(Vec<WireMessageBatch>, UsernameMap), AppError> {
    let requests: Vec<RangeRequest<'_>> =
        room_ids.iter().map(|room_id| RangeRequest { room_id, last_seen_id: None }).collect();
    let pages = kv.reverse_range_batch(&requests, PAGE_SIZE).await?;
    let usernames = load_usernames(db, &pages).await?;

    let batches = pages
        .into_iter()
        .map(|entries| {
            let has_more_messages = entries.len() >= PAGE_SIZE;
            WireMessageBatch { messages: to_wire_messages(entries, &usernames), has_more_messages }
        })
        .collect();

    Ok((batches, usernames))
}

/// Cursor-paginated single-room fetch: the page strictly before
/// `cursor_message_id` when given, otherwise the newest page.
pub async fn fetch_room(
    kv: &KvClient,
    db: &Pool,
    room_id: &str,
    cursor_message_id: Option<&str>,
) -> Result<WireMessageBatch, AppError> {
    let request = RangeRequest { room_id, last_seen_id: cursor_message_id };
    let entries = kv.reverse_range(request, PAGE_SIZE).await?;
    let has_more_messages = entries.len() >= PAGE_SIZE;
    let usernames = load_usernames(db, std::slice::from_ref(&entries)).await?;
    Ok(WireMessageBatch { messages: to_wire_messages(entries, &usernames), has_more_messages })
}
