use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tracing::debug;

use crate::types::ScanReport;

type Handler = Arc<dyn Fn(&Arc<ScanReport>) + Send + Sync>;

/// Single-slot publish/subscribe channel for the current scan report.
///
/// Cloning yields another handle to the same slot. The slot starts empty and
/// is never persisted; a publish replaces the previous report wholesale.
#[derive(Clone, Default)]
pub struct ResultChannel {
    inner: Arc<ChannelInner>,
}

#[derive(Default)]
struct ChannelInner {
    current: RwLock<Option<Arc<ScanReport>>>,
    subscribers: Mutex<Vec<(u64, Handler)>>,
    // Serializes swap+notify so the last publish is the last thing every handler sees.
    publish_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl ChannelInner {
    fn remove(&self, id: u64) {
        let mut subs = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subs.retain(|(sid, _)| *sid != id);
    }
}

impl ResultChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `report` as current and synchronously notify every subscriber.
    ///
    /// Handlers run on the publishing thread and must not publish themselves.
    pub fn publish(&self, report: ScanReport) -> Arc<ScanReport> {
        let report = Arc::new(report);
        self.publish_shared(Arc::clone(&report));
        report
    }

    /// Like [`publish`](Self::publish) for a report that is already shared.
    pub fn publish_shared(&self, report: Arc<ScanReport>) {
        let _serial = self
            .inner
            .publish_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        *self
            .inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&report));

        // Snapshot so handlers may subscribe/unsubscribe without deadlocking.
        let handlers: Vec<Handler> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        debug!(
            target_url = %report.target,
            subscribers = handlers.len(),
            "publishing scan report"
        );
        for handler in handlers {
            handler(&report);
        }
    }

    /// Register `handler` for every future publish. There is no replay of the
    /// current report; use [`current`](Self::current) for that.
    ///
    /// The handler stays registered until the returned guard is dropped.
    /// A publish already running on another thread works from its own copy
    /// of the handler list, so it may still call this handler once after the
    /// guard is gone. Handlers must tolerate that; keep their state behind
    /// an `Arc` rather than borrowing from the subscriber.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Arc<ScanReport>) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// The most recently published report, if any.
    pub fn current(&self) -> Option<Arc<ScanReport>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Registration handle returned by [`ResultChannel::subscribe`].
/// Unregisters on drop.
pub struct Subscription {
    id: u64,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
