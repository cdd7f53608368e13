//! Background session timers
//!
//! While a session is active two tasks run: the countdown tick and the
//! activity reconciliation. Both hold only a weak reference to the manager,
//! stop by themselves once no session is active, and are aborted when the
//! `SessionTimers` value is dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::manager::SessionManager;

/// Handles of the running timer tasks
#[derive(Debug)]
pub struct SessionTimers {
    tick: JoinHandle<()>,
    reconcile: JoinHandle<()>,
}

impl SessionTimers {
    pub fn start(manager: &Arc<SessionManager>) -> Self {
        let settings = manager.settings();
        let tick = tokio::spawn(run_periodic(
            Arc::downgrade(manager),
            settings.tick_interval(),
            |manager| {
                manager.tick();
            },
        ));
        let reconcile = tokio::spawn(run_periodic(
            Arc::downgrade(manager),
            settings.reconcile_interval(),
            |manager| {
                manager.reconcile();
            },
        ));
        Self { tick, reconcile }
    }

    pub fn is_finished(&self) -> bool {
        self.tick.is_finished() && self.reconcile.is_finished()
    }
}

impl Drop for SessionTimers {
    fn drop(&mut self) {
        self.tick.abort();
        self.reconcile.abort();
    }
}

async fn run_periodic<F>(manager: Weak<SessionManager>, period: Duration, step: F)
where
    F: Fn(&SessionManager) + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };
        step(&manager);
        if !manager.is_active() {
            break;
        }
    }
}
