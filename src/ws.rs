//! Duplex websocket frame transport (C8).
//!
//! `split` hands back a [`ChatWriter`] (cloneable, shared) and a
//! [`ChatReader`] (not cloneable, owns the stream outright). At most one
//! outstanding read is therefore a structural invariant, not just a
//! documented contract: `ChatReader::read` takes `&mut self`, and nothing
//! else holds a handle to the stream. Writes are different -- the pub/sub
//! bus (C7) delivers broadcasts to a session from other tasks while the
//! session's own dispatch loop may also be writing (a `roomHistory`
//! response), so the sink needs shared, lock-guarded access. [`AsyncMutex`]
//! is the serialization contract a caller acquires before writing; the
//! `tokio::sync::Mutex` around the sink is just the safe-Rust mechanism for
//! getting a `&mut` to it once that contract is satisfied -- it is never
//! contended, since nothing touches the sink without holding the outer lock
//! first.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex as AsyncDataMutex;

use crate::async_mutex::AsyncMutex;
use crate::error::AppError;

/// How long a read may remain outstanding before the connection is torn down.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Close code for an authentication failure during the upgrade handshake.
pub const CLOSE_POLICY_VIOLATION: u16 = close_code::POLICY;

struct WriterInner {
    sink: AsyncDataMutex<SplitSink<WebSocket, Message>>,
    write_mtx: AsyncMutex,
}

/// The write half. Cloning shares the same underlying socket and write
/// lock, so every clone serializes against every other.
#[derive(Clone)]
pub struct ChatWriter {
    inner: Arc<WriterInner>,
}

/// Scoped handle proving the holder has acquired the write lock. Releases
/// it on drop.
pub struct WriteGuard {
    inner: Arc<WriterInner>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.inner.write_mtx.unlock();
    }
}

impl ChatWriter {
    /// Acquires the write lock. Held across the hello emission so no other
    /// writer (a broadcast delivery racing in from C7) can get ahead of it.
    pub async fn lock_writes(&self) -> WriteGuard {
        self.inner.write_mtx.lock().await;
        WriteGuard { inner: self.inner.clone() }
    }

    /// Writes bypassing the write lock's acquisition step; `guard` proves
    /// the caller already holds it.
    pub async fn write_locked(&self, guard: &WriteGuard, payload: &str) -> Result<(), AppError> {
        let _ = guard;
        let mut sink = self.inner.sink.lock().await;
        sink.send(Message::Text(payload.to_owned().into())).await.map_err(|err| AppError::Other(err.to_string()))
    }

    /// Acquires the write lock, writes, releases it. Safe to call
    /// concurrently from multiple tasks (e.g. pub/sub deliveries).
    pub async fn write(&self, payload: &str) -> Result<(), AppError> {
        let guard = self.lock_writes().await;
        self.write_locked(&guard, payload).await
    }

    /// Sends a close frame. Subsequent reads observe the connection as closed.
    pub async fn close(&self, code: u16, reason: &str) -> Result<(), AppError> {
        let mut sink = self.inner.sink.lock().await;
        let frame = CloseFrame { code, reason: reason.to_owned().into() };
        sink.send(Message::Close(Some(frame))).await.map_err(|err| AppError::Other(err.to_string()))
    }
}

/// The read half. Not `Clone`: ownership is the enforcement mechanism for
/// "at most one outstanding read."
pub struct ChatReader {
    stream: SplitStream<WebSocket>,
}

impl ChatReader {
    /// Reads the next text frame, failing the connection on anything else
    /// (binary frames, a close frame, or the stream ending). Idle for
    /// longer than [`IDLE_TIMEOUT`] also fails it.
    pub async fn read(&mut self) -> Result<String, AppError> {
        let next = tokio::time::timeout(IDLE_TIMEOUT, self.stream.next()).await.map_err(|_| AppError::Timeout)?;
        match next {
            Some(Ok(Message::Text(text))) => Ok(text.to_string()),
            Some(Ok(_)) => Err(AppError::ParseError("expected a text frame".to_owned())),
            Some(Err(err)) => Err(AppError::Other(err.to_string())),
            None => Err(AppError::Other("connection closed".to_owned())),
        }
    }
}

/// Splits an accepted websocket into its independent read and write halves.
pub fn split(socket: WebSocket) -> (ChatWriter, ChatReader) {
    let (sink, stream) = socket.split();
    let inner = Arc::new(WriterInner { sink: AsyncDataMutex::new(sink), write_mtx: AsyncMutex::new() });
    (ChatWriter { inner }, ChatReader { stream })
}
