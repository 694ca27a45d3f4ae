//! Production host handler backed by an [`Engine`].

use crate::engine::Engine;
use crate::error::Result;
use crate::events::EngineEvent;
use crate::host::channel::HostHandler;
use crate::host::contract::ConfigSavePayload;
use crate::sync::{BatchSyncResult, DeleteResult, SyncResult};
use async_trait::async_trait;
use lightsout_fetch::SourceRequest;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Routes host commands to a shared [`Engine`].
pub struct EngineHostHandler {
    engine: Arc<Engine>,
}

impl std::fmt::Debug for EngineHostHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHostHandler").finish_non_exhaustive()
    }
}

impl EngineHostHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl HostHandler for EngineHostHandler {
    fn config_get(&self) -> Result<Value> {
        serde_json::to_value(self.engine.config())
            .map_err(|e| crate::LightsOutError::Persistence(format!("cannot serialize config: {e}")))
    }

    fn config_save(&self, payload: ConfigSavePayload) -> Result<()> {
        self.engine.save_config(&payload.config, payload.options)
    }

    async fn sync_source(&self, source: SourceRequest) -> Result<SyncResult> {
        Ok(self.engine.sync_source(&source).await)
    }

    async fn sync_all(&self) -> Result<BatchSyncResult> {
        Ok(self.engine.sync_all().await)
    }

    fn delete_cloud_by_source(&self, source_ids: &[String]) -> Result<DeleteResult> {
        Ok(self.engine.delete_cloud_by_source(source_ids))
    }

    fn delete_all_cloud(&self) -> Result<DeleteResult> {
        Ok(self.engine.delete_all_cloud())
    }

    fn schedule_rebuild(&self) -> Result<usize> {
        Ok(self.engine.rebuild_schedule())
    }

    fn schedule_list(&self) -> Result<Value> {
        Ok(json!({
            "phase": self.engine.scheduler_phase(),
            "pending": self.engine.pending_shutdowns(),
            "autoSyncRunning": self.engine.auto_sync_running(),
        }))
    }

    fn shutdown_trigger(&self) -> Result<bool> {
        Ok(self.engine.trigger_shutdown())
    }

    async fn shutdown_cancel(&self) -> Result<()> {
        self.engine.cancel_shutdown().await
    }

    fn auto_sync_restart(&self) -> Result<()> {
        self.engine.restart_auto_sync();
        Ok(())
    }

    fn runtime_stop(&self) -> Result<()> {
        info!("runtime.stop received; disposing engine");
        self.engine.dispose();
        Ok(())
    }

    fn engine_events(&self) -> Option<broadcast::Receiver<EngineEvent>> {
        Some(self.engine.subscribe())
    }
}
