//! Short-lived feedback messages for mutation outcomes.
//!
//! Each visible notification owns its expiry timer. Expiry, manual dismissal,
//! eviction and `clear` all go through [`Inner::release`], which aborts the
//! timer and removes the entry, so a removed notification never leaves a
//! timer behind.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 5;
pub const DEFAULT_DISPLAY_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Success => f.write_str("success"),
            NotificationKind::Error => f.write_str("error"),
            NotificationKind::Info => f.write_str("info"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub message: String,
    pub shown_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Maximum number of notifications visible at once.
    pub capacity: usize,
    /// How long a notification stays visible; also the de-duplication window.
    pub display_duration: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            display_duration: DEFAULT_DISPLAY_DURATION,
        }
    }
}

#[derive(Clone)]
pub struct NotificationBridge {
    config: NotificationConfig,
    inner: Arc<Mutex<Inner>>,
}

struct Entry {
    notification: Notification,
    timer: Option<AbortHandle>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    visible: VecDeque<Entry>,
    last_shown: HashMap<(NotificationKind, String), Instant>,
}

impl Inner {
    fn release(&mut self, id: NotificationId) -> bool {
        let Some(pos) = self.visible.iter().position(|e| e.notification.id == id) else {
            return false;
        };
        if let Some(entry) = self.visible.remove(pos) {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
        true
    }

    fn release_expired(&mut self, now: Instant, ttl: Duration) {
        let expired: Vec<NotificationId> = self
            .visible
            .iter()
            .filter(|e| now.duration_since(e.notification.shown_at) >= ttl)
            .map(|e| e.notification.id)
            .collect();
        for id in expired {
            self.release(id);
        }
        self.last_shown
            .retain(|_, shown_at| now.duration_since(*shown_at) < ttl);
    }
}

impl NotificationBridge {
    #[must_use]
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config: NotificationConfig {
                capacity: config.capacity.max(1),
                ..config
            },
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Show a notification.
    ///
    /// Returns `None` when an identical `(kind, message)` was shown within the
    /// display window. When the bridge is full the oldest notification is
    /// evicted.
    pub fn notify(&self, kind: NotificationKind, message: impl Into<String>) -> Option<NotificationId> {
        let message = message.into();
        let now = Instant::now();
        let ttl = self.config.display_duration;
        let mut inner = self.lock();
        inner.release_expired(now, ttl);

        let key = (kind, message);
        if inner.last_shown.contains_key(&key) {
            tracing::debug!(%kind, message = %key.1, "suppressing duplicate notification");
            return None;
        }
        let (kind, message) = key;
        inner.last_shown.insert((kind, message.clone()), now);

        inner.next_id += 1;
        let id = NotificationId(inner.next_id);
        let timer = self.spawn_expiry(id);
        inner.visible.push_back(Entry {
            notification: Notification {
                id,
                kind,
                message,
                shown_at: now,
            },
            timer,
        });

        while inner.visible.len() > self.config.capacity {
            if let Some(oldest) = inner.visible.front().map(|e| e.notification.id) {
                inner.release(oldest);
            }
        }
        Some(id)
    }

    pub fn success(&self, message: impl Into<String>) -> Option<NotificationId> {
        self.notify(NotificationKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Option<NotificationId> {
        self.notify(NotificationKind::Error, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Option<NotificationId> {
        self.notify(NotificationKind::Info, message)
    }

    /// Remove a notification before it expires. Returns whether it was visible.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.lock().release(id)
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        let ids: Vec<NotificationId> = inner.visible.iter().map(|e| e.notification.id).collect();
        for id in ids {
            inner.release(id);
        }
    }

    /// Visible notifications, oldest first.
    #[must_use]
    pub fn visible(&self) -> Vec<Notification> {
        let mut inner = self.lock();
        inner.release_expired(Instant::now(), self.config.display_duration);
        inner
            .visible
            .iter()
            .map(|e| e.notification.clone())
            .collect()
    }

    /// Expiry timers still owned by visible notifications.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.lock()
            .visible
            .iter()
            .filter(|e| e.timer.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }

    // Without a runtime there is no timer; `release_expired` still drops the
    // entry on the next read.
    fn spawn_expiry(&self, id: NotificationId) -> Option<AbortHandle> {
        let handle = Handle::try_current().ok()?;
        let inner: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let ttl = self.config.display_duration;
        let task = handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = inner.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .release(id);
            }
        });
        Some(task.abort_handle())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationBridge {
    fn default() -> Self {
        Self::new(NotificationConfig::default())
    }
}
