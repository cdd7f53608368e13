//! User activity recording
//!
//! Activity signals (requests, clicks, key presses forwarded by the UI) are
//! frequent. They are rate-limited to one per debounce window and then
//! persisted through the session manager, which picks them up on its next
//! reconciliation.

use chrono::{DateTime, Duration, Utc};
use std::sync::Weak;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::session::SessionManager;

/// Admits at most one activity signal per window
pub struct ActivityLimiter {
    window: Duration,
    last_admitted: RwLock<Option<DateTime<Utc>>>,
}

impl ActivityLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_admitted: RwLock::new(None),
        }
    }

    /// Whether a signal at `at` should be recorded
    pub async fn admit(&self, at: DateTime<Utc>) -> bool {
        let mut last = self.last_admitted.write().await;
        match *last {
            Some(previous) if at - previous < self.window => false,
            _ => {
                *last = Some(at);
                true
            }
        }
    }

    /// Forget the last admitted signal (new session)
    pub async fn reset(&self) {
        *self.last_admitted.write().await = None;
    }
}

/// Sender side of the activity pipeline
#[derive(Clone)]
pub struct ActivityChannel {
    sender: mpsc::UnboundedSender<DateTime<Utc>>,
}

impl ActivityChannel {
    /// Start the consumer task
    ///
    /// The task ends once every sender is dropped or the manager is gone.
    pub fn spawn(manager: Weak<SessionManager>, window: Duration) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<DateTime<Utc>>();
        let limiter = ActivityLimiter::new(window);

        let handle = tokio::spawn(async move {
            while let Some(at) = receiver.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if !manager.is_active() {
                    limiter.reset().await;
                    continue;
                }
                if limiter.admit(at).await {
                    manager.record_activity(at);
                } else {
                    tracing::trace!("Activity signal debounced");
                }
            }
            tracing::debug!("Activity channel closed");
        });

        (Self { sender }, handle)
    }

    /// Queue an activity signal; never blocks
    pub fn record(&self, at: DateTime<Utc>) {
        if self.sender.send(at).is_err() {
            tracing::debug!("Activity channel closed, signal dropped");
        }
    }
}
