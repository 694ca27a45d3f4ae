//! Periodic background sync of every enabled source.
//!
//! Config saves tend to arrive in bursts, so [`AutoSync::restart`] is
//! debounced: each call replaces the pending restart, and only the last one
//! in a window actually restarts the timer.

use crate::config::ConfigStore;
use crate::sync::reconciler::SyncReconciler;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Quiet period before a requested restart takes effect.
pub const DEFAULT_RESTART_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Default)]
struct AutoSyncState {
    interval_task: Option<JoinHandle<()>>,
    restart_task: Option<JoinHandle<()>>,
    restart_id: u64,
}

/// Interval timer that runs [`SyncReconciler::sync_all`].
pub struct AutoSync {
    store: Arc<dyn ConfigStore>,
    reconciler: Arc<SyncReconciler>,
    debounce: Duration,
    state: Mutex<AutoSyncState>,
}

impl AutoSync {
    pub fn new(store: Arc<dyn ConfigStore>, reconciler: Arc<SyncReconciler>) -> Self {
        Self {
            store,
            reconciler,
            debounce: DEFAULT_RESTART_DEBOUNCE,
            state: Mutex::new(AutoSyncState::default()),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AutoSyncState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stop any running timer, then start a new one if auto-sync is enabled.
    ///
    /// The first sync runs immediately. Returns whether a timer is running.
    pub fn start(&self) -> bool {
        let document = self.store.load();

        let mut state = self.lock();
        abort_all(&mut state);

        if !document.auto_sync_enabled {
            info!("auto-sync disabled");
            return false;
        }

        let minutes = document.sync_interval_minutes();
        let period = Duration::from_secs(minutes.saturating_mul(60));
        let reconciler = Arc::clone(&self.reconciler);
        state.interval_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                debug!("auto-sync tick");
                let result = reconciler.sync_all().await;
                if result.success {
                    info!(
                        "auto-sync finished: {} items from {} sources",
                        result.total_count,
                        result.results.len() - result.failed_count()
                    );
                } else {
                    warn!(
                        "auto-sync failed for all {} sources",
                        result.results.len()
                    );
                }
            }
        }));

        info!("auto-sync started, every {minutes} minutes");
        true
    }

    /// Abort the timer and any pending restart.
    pub fn stop(&self) {
        let mut state = self.lock();
        if state.interval_task.is_some() {
            info!("auto-sync stopped");
        }
        abort_all(&mut state);
    }

    /// Schedule a [`start`](Self::start) after the debounce window,
    /// replacing any restart that is still waiting.
    pub fn restart(self: &Arc<Self>) {
        let mut state = self.lock();
        if let Some(pending) = state.restart_task.take() {
            pending.abort();
        }
        state.restart_id += 1;
        let id = state.restart_id;

        let this = Arc::clone(self);
        let debounce = self.debounce;
        state.restart_task = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            {
                let mut state = this.lock();
                if state.restart_id != id {
                    return;
                }
                state.restart_task = None;
            }
            this.start();
        }));
        debug!("auto-sync restart scheduled in {debounce:?}");
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .interval_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

fn abort_all(state: &mut AutoSyncState) {
    if let Some(task) = state.interval_task.take() {
        task.abort();
    }
    if let Some(task) = state.restart_task.take() {
        task.abort();
    }
}
