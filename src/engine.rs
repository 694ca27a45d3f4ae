//! Engine service object wiring the scheduler, sync, and config store.
//!
//! The host layer owns exactly one [`Engine`]. It is built with injected
//! collaborators so tests can swap in an in-memory store, a canned fetcher,
//! or a recording shutdown executor.

use crate::config::{ConfigDocument, ConfigStore};
use crate::error::{LightsOutError, Result};
use crate::events::{EngineEvent, EventSender, emit};
use crate::scheduler::{
    DEFAULT_COUNTDOWN_SECS, ScheduledTimer, SchedulerPhase, ShutdownExecutor, ShutdownScheduler,
};
use crate::sync::{
    AutoSync, BatchSyncResult, DEFAULT_RESTART_DEBOUNCE, DeleteResult, SourceFetcher,
    SyncReconciler, SyncResult,
};
use lightsout_fetch::SourceRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// Tunables for an [`Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    /// Seconds between a timer firing and the shutdown command.
    pub countdown_secs: u64,
    /// Quiet period before an auto-sync restart takes effect.
    pub auto_sync_debounce_ms: u64,
    /// Buffered events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            auto_sync_debounce_ms: DEFAULT_RESTART_DEBOUNCE.as_millis() as u64,
            event_capacity: 256,
        }
    }
}

impl EngineSettings {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(LightsOutError::Config(
                "event_capacity must be greater than 0".into(),
            ));
        }
        if self.countdown_secs > 24 * 3600 {
            return Err(LightsOutError::Config(format!(
                "countdown_secs must be at most one day, got {}",
                self.countdown_secs
            )));
        }
        Ok(())
    }
}

/// Options accepted by [`Engine::save_config`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SaveOptions {
    /// Leave the auto-sync timer alone (the caller changed nothing it reads).
    pub skip_auto_sync_restart: bool,
}

/// The shutdown scheduling and knowledge sync engine.
pub struct Engine {
    store: Arc<dyn ConfigStore>,
    scheduler: Arc<ShutdownScheduler>,
    reconciler: Arc<SyncReconciler>,
    auto_sync: Arc<AutoSync>,
    events: EventSender,
}

impl Engine {
    /// Build an engine. Nothing is armed until [`init`](Self::init).
    pub fn new(
        store: Arc<dyn ConfigStore>,
        fetcher: Arc<dyn SourceFetcher>,
        executor: Arc<dyn ShutdownExecutor>,
        settings: EngineSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let (events, _) = broadcast::channel(settings.event_capacity);

        let scheduler = Arc::new(
            ShutdownScheduler::new(Arc::clone(&store), executor, events.clone())
                .with_countdown(Duration::from_secs(settings.countdown_secs)),
        );
        let reconciler = Arc::new(SyncReconciler::new(
            Arc::clone(&store),
            fetcher,
            events.clone(),
        ));
        let auto_sync = Arc::new(
            AutoSync::new(Arc::clone(&store), Arc::clone(&reconciler))
                .with_debounce(Duration::from_millis(settings.auto_sync_debounce_ms)),
        );

        Ok(Self {
            store,
            scheduler,
            reconciler,
            auto_sync,
            events,
        })
    }

    /// Arm the shutdown timers and start auto-sync. Returns the timer count.
    pub fn init(&self) -> usize {
        let timers = self.scheduler.rebuild();
        let syncing = self.auto_sync.start();
        info!("engine initialised: {timers} shutdown timers, auto-sync {syncing}");
        timers
    }

    /// Disarm every timer and stop background sync.
    pub fn dispose(&self) {
        self.scheduler.cancel_all();
        self.auto_sync.stop();
        info!("engine disposed");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Current config document, built-in sources included.
    pub fn config(&self) -> ConfigDocument {
        self.store.load()
    }

    /// Persist a new document, rebuild the schedule, and (unless told not
    /// to) restart auto-sync after the debounce window.
    pub fn save_config(&self, document: &ConfigDocument, options: SaveOptions) -> Result<()> {
        self.store.save(document)?;
        self.scheduler.rebuild();
        if !options.skip_auto_sync_restart {
            self.auto_sync.restart();
        }
        emit(&self.events, EngineEvent::ConfigSaved);
        Ok(())
    }

    pub async fn sync_source(&self, source: &SourceRequest) -> SyncResult {
        self.reconciler.sync_source(source).await
    }

    pub async fn sync_all(&self) -> BatchSyncResult {
        self.reconciler.sync_all().await
    }

    pub fn delete_cloud_by_source(&self, source_ids: &[String]) -> DeleteResult {
        self.reconciler.delete_by_source(source_ids)
    }

    pub fn delete_all_cloud(&self) -> DeleteResult {
        self.reconciler.delete_all()
    }

    pub fn rebuild_schedule(&self) -> usize {
        self.scheduler.rebuild()
    }

    pub fn pending_shutdowns(&self) -> Vec<ScheduledTimer> {
        self.scheduler.pending()
    }

    pub fn scheduler_phase(&self) -> SchedulerPhase {
        self.scheduler.phase()
    }

    /// Start the shutdown countdown now. `false` if one is already running.
    pub fn trigger_shutdown(&self) -> bool {
        self.scheduler.trigger_now()
    }

    pub async fn cancel_shutdown(&self) -> Result<()> {
        self.scheduler.cancel_pending_shutdown().await
    }

    pub fn restart_auto_sync(&self) {
        self.auto_sync.restart();
    }

    pub fn auto_sync_running(&self) -> bool {
        self.auto_sync.is_running()
    }
}
