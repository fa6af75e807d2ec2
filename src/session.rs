//! Issues and validates opaque session tokens via the KV store (C5).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

use crate::error::AppError;
use crate::kv::{KvClient, KvError};

/// Default session lifetime: 7 days.
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

const TOKEN_BYTES: usize = 16; // 128 bits

fn session_key(token: &str) -> String {
    format!("session_{token}")
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates a random session id, stores `session_<id> -> user_id` with a
/// TTL, and retries with a fresh id on the astronomically unlikely
/// collision. The retry loop has no cap, matching the source.
pub async fn issue(kv: &KvClient, user_id: i64, ttl_secs: u64) -> Result<String, AppError> {
    loop {
        let token = random_token();
        match kv.set_if_absent(&session_key(&token), &user_id.to_string(), ttl_secs).await {
            Ok(()) => return Ok(token),
            Err(KvError::AlreadyExists) => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Resolves a session token to its `user_id`. A missing token becomes
/// `RequiresAuth` at this boundary (the caller is always an auth check).
pub async fn lookup(kv: &KvClient, token: &str) -> Result<i64, AppError> {
    match kv.get_int(&session_key(token)).await {
        Ok(user_id) => Ok(user_id),
        Err(KvError::NotFound) => Err(AppError::RequiresAuth),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_has_expected_prefix() {
        assert_eq!(session_key("abc"), "session_abc");
    }

    #[test]
    fn random_token_is_url_safe_and_unpadded() {
        let token = random_token();
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(!token.contains('='));
        // 16 bytes base64-no-pad encodes to 22 characters.
        assert_eq!(token.len(), 22);
    }

    #[test]
    fn random_token_is_not_constant() {
        assert_ne!(random_token(), random_token());
    }
}
