//! Shared application state threaded through axum's extractors.

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::Pool;
use crate::kv::KvClient;
use crate::pubsub::PubSubBus;

struct Inner {
    pub db: Pool,
    pub kv: KvClient,
    pub pubsub: PubSubBus,
    pub doc_root: PathBuf,
}

/// Cheaply cloneable handle to every shared backend: the DB pool (C3), the
/// KV client (C4), and the pub/sub bus (C7), plus the static-file doc root.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl AppState {
    pub fn new(db: Pool, kv: KvClient, pubsub: PubSubBus, doc_root: PathBuf) -> Self {
        Self { inner: Arc::new(Inner { db, kv, pubsub, doc_root }) }
    }

    pub fn db(&self) -> &Pool {
        &self.inner.db
    }

    pub fn kv(&self) -> &KvClient {
        &self.inner.kv
    }

    pub fn pubsub(&self) -> &PubSubBus {
        &self.inner.pubsub
    }

    pub fn doc_root(&self) -> &std::path::Path {
        &self.inner.doc_root
    }
}
