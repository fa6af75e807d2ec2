//! A cooperative single-slot mutex for async tasks sharing one scheduler.
//!
//! Not thread-safe in the `std::sync::Mutex` sense: it assumes tasks
//! acquiring it are driven by the same executor and never blocks a thread,
//! only suspends a task. Used to serialize concurrent writers on a single
//! websocket (C8) without requiring a real OS-level lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

struct Inner {
    locked: AtomicBool,
    notify: Notify,
}

/// A binary async lock. Cloning shares the same underlying slot.
#[derive(Clone)]
pub struct AsyncMutex {
    inner: Arc<Inner>,
}

impl AsyncMutex {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                locked: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    /// Suspends until the lock is free, then acquires it.
    ///
    /// A race may wake a different task than the one that releases the
    /// lock next, so we loop and re-check on every wake rather than
    /// assuming the notification means we now hold it.
    pub async fn lock(&self) {
        loop {
            if self
                .inner
                .locked
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Non-suspending acquire attempt.
    pub fn try_lock(&self) -> bool {
        self.inner
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the lock. Wakes at most one waiter.
    ///
    /// Calling this without holding the lock is a programmer error; it is
    /// not checked in release builds since the caller always pairs this
    /// with a prior `lock`/`try_lock`.
    pub fn unlock(&self) {
        self.inner.locked.store(false, Ordering::Release);
        self.inner.notify.notify_one();
    }

    /// Acquires the lock and returns a scoped guard that releases it on drop.
    pub async fn lock_with_guard(&self) -> AsyncMutexGuard<'_> {
        self.lock().await;
        AsyncMutexGuard { mutex: self }
    }
}

impl Default for AsyncMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by [`AsyncMutex::lock_with_guard`].
pub struct AsyncMutexGuard<'a> {
    mutex: &'a AsyncMutex,
}

impl Drop for AsyncMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn try_lock_fails_while_held() {
        let mutex = AsyncMutex::new();
        assert!(mutex.try_lock());
        assert!(!mutex.try_lock());
        mutex.unlock();
        assert!(mutex.try_lock());
    }

    #[tokio::test]
    async fn unlock_wakes_exactly_one_waiter() {
        let mutex = AsyncMutex::new();
        mutex.lock().await;

        let order = Arc::new(tokio::sync::Mutex::new(Vec::<u32>::new()));

        let mut handles = Vec::new();
        for id in 0..3u32 {
            let mutex = mutex.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                mutex.lock().await;
                order.lock().await.push(id);
                tokio::time::sleep(Duration::from_millis(5)).await;
                mutex.unlock();
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        mutex.unlock();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(order.lock().await.len(), 3);
        assert!(!mutex.locked());
    }

    #[tokio::test]
    async fn lock_with_guard_releases_on_drop() {
        let mutex = AsyncMutex::new();
        {
            let _guard = mutex.lock_with_guard().await;
            assert!(mutex.locked());
        }
        assert!(!mutex.locked());
    }
}
