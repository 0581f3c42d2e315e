//! Transient user-facing notifications.
//!
//! # Responsibility
//! - Queue short-lived messages raised by mutation outcomes.
//! - Expire each message after the configured TTL unless dismissed first.
//!
//! # Invariants
//! - `notify` never blocks; expiry runs on a tokio timer task.
//! - Each visible notification owns at most one timer; dismissal aborts it,
//!   so no expiry fires after a manual removal.
//! - `snapshot` returns notifications in insertion order.

use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
    #[default]
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl Display for NotificationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub severity: Severity,
}

#[derive(Default)]
struct ChannelState {
    next_id: u64,
    visible: Vec<Notification>,
    timers: HashMap<NotificationId, AbortHandle>,
}

impl ChannelState {
    fn remove(&mut self, id: NotificationId) -> bool {
        let before = self.visible.len();
        self.visible.retain(|notification| notification.id != id);
        before != self.visible.len()
    }
}

/// Cloneable handle to one notification queue.
#[derive(Clone)]
pub struct NotificationChannel {
    state: Arc<Mutex<ChannelState>>,
    ttl: Duration,
}

impl NotificationChannel {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState::default())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Appends a notification and schedules its expiry.
    ///
    /// Outside a tokio runtime no timer can be scheduled; the notification
    /// then stays visible until dismissed.
    pub fn notify(&self, message: impl Into<String>, severity: Severity) -> NotificationId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = NotificationId(state.next_id);
        state.visible.push(Notification {
            id,
            message: message.into(),
            severity,
        });

        // Spawned while holding the lock so the timer cannot observe a
        // half-registered notification.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(expire(Arc::downgrade(&self.state), id, self.ttl));
                state.timers.insert(id, task.abort_handle());
            }
            Err(_) => {
                warn!(
                    "event=notification_timer module=notify status=skipped reason=no_runtime id={}",
                    id
                );
            }
        }

        info!(
            "event=notification_raised module=notify severity={} id={}",
            severity.as_str(),
            id
        );
        id
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, Severity::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, Severity::Error)
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.notify(message, Severity::Info)
    }

    /// Removes a notification before it expires and cancels its timer.
    ///
    /// Returns `false` when the notification is already gone.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        let mut state = self.state.lock();
        if let Some(timer) = state.timers.remove(&id) {
            timer.abort();
        }
        let removed = state.remove(id);
        if removed {
            info!("event=notification_dismissed module=notify id={}", id);
        }
        removed
    }

    /// Visible notifications in insertion order.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.state.lock().visible.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().visible.is_empty()
    }

    /// Drops every notification and cancels every pending timer.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        state.visible.clear();
    }
}

async fn expire(state: Weak<Mutex<ChannelState>>, id: NotificationId, ttl: Duration) {
    tokio::time::sleep(ttl).await;
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock();
    state.timers.remove(&id);
    if state.remove(id) {
        info!("event=notification_expired module=notify id={}", id);
    }
}
