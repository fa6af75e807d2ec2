//! In-process many-to-many topic dispatch (C7).
//!
//! Subscribers are identified by handle identity, not value: two
//! subscribers with identical content are still distinct. A publish
//! schedules exactly one delivery task per matching subscription -- never a
//! second, nested spawn for the write itself -- so that, on the
//! current-thread runtime this server runs on, two publications to the same
//! topic reach a given subscriber in the order they were published. A
//! subscriber that unsubscribes after a publish observed it as subscribed
//! may still receive that delivery (the subscriber's future must tolerate
//! late deliveries, the same way a write to a closed socket is simply
//! logged and discarded).

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Receives published messages. Implemented by chat sessions (C10); the
/// message is an `Arc` so one publish allocates once and every subscriber
/// shares the same payload.
///
/// Returns the delivery future itself rather than spawning one internally:
/// `PubSubBus::publish` is the only place that spawns, once per subscriber
/// per publication, and awaits this future directly from inside that task.
pub trait Subscriber: Send + Sync + 'static {
    fn on_message<'a>(&'a self, topic_id: &'a str, message: Arc<str>) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// The identity under which the bus remembers a subscription. Cloning a
/// handle shares the same identity; `unsubscribe` removes every
/// subscription registered under it.
#[derive(Clone)]
pub struct SubscriberHandle {
    id: u64,
    subscriber: Arc<dyn Subscriber>,
}

impl SubscriberHandle {
    pub fn new(subscriber: Arc<dyn Subscriber>) -> Self {
        Self { id: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed), subscriber }
    }
}

impl PartialEq for SubscriberHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for SubscriberHandle {}
impl PartialOrd for SubscriberHandle {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SubscriberHandle {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// The in-process broker. Two indexes over the same subscription set: by
/// topic (for publish) and by subscriber (for bulk unsubscribe).
#[derive(Clone, Default)]
pub struct PubSubBus {
    by_topic: Arc<DashMap<String, BTreeSet<SubscriberHandle>>>,
    by_subscriber: Arc<DashMap<u64, Vec<String>>>,
}

impl PubSubBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` for every topic in `topic_ids`.
    pub fn subscribe(&self, handle: &SubscriberHandle, topic_ids: &[String]) {
        for topic_id in topic_ids {
            self.by_topic.entry(topic_id.clone()).or_default().insert(handle.clone());
        }
        self.by_subscriber.entry(handle.id).or_default().extend(topic_ids.iter().cloned());
    }

    /// Removes every subscription registered under `handle`. A no-op if
    /// none exist.
    pub fn unsubscribe(&self, handle: &SubscriberHandle) {
        if let Some((_, topic_ids)) = self.by_subscriber.remove(&handle.id) {
            for topic_id in topic_ids {
                if let Some(mut subscribers) = self.by_topic.get_mut(&topic_id) {
                    subscribers.remove(handle);
                }
            }
        }
    }

    /// Schedules exactly one delivery task per subscription currently
    /// registered for `topic_id`, awaiting each subscriber's delivery
    /// future directly inside that task. `message` is shared, not
    /// re-cloned per byte.
    pub fn publish(&self, topic_id: &str, message: Arc<str>) {
        let Some(subscribers) = self.by_topic.get(topic_id) else { return };
        let topic_id = topic_id.to_owned();
        for handle in subscribers.iter() {
            let subscriber = handle.subscriber.clone();
            let message = message.clone();
            let topic_id = topic_id.clone();
            tokio::spawn(async move {
                subscriber.on_message(&topic_id, message).await;
            });
        }
    }

    /// Subscribes `handle` and returns a scoped guard that unsubscribes
    /// it on drop.
    pub fn subscribe_guarded(&self, handle: SubscriberHandle, topic_ids: &[String]) -> SubscriptionGuard {
        self.subscribe(&handle, topic_ids);
        SubscriptionGuard { bus: self.clone(), handle }
    }
}

/// RAII handle coupling a subscription's lifetime to this guard's.
pub struct SubscriptionGuard {
    bus: PubSubBus,
    handle: SubscriberHandle,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.handle);
    }
}
