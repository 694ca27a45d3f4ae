//! Host command channel and router.
//!
//! [`HostCommandClient`] sends validated envelopes over an mpsc channel to a
//! [`HostCommandServer`], which routes each one to a [`HostHandler`] on its
//! own task and answers through a oneshot. Handler errors are folded into
//! `ok = false` responses; callers always get an envelope back.

use crate::error::{LightsOutError, Result};
use crate::events::EngineEvent;
use crate::host::contract::{
    CommandEnvelope, CommandName, ConfigSavePayload, DeleteBySourcePayload, EVENT_VERSION,
    EventEnvelope, ResponseEnvelope,
};
use crate::sync::{BatchSyncResult, DeleteResult, SyncResult};
use async_trait::async_trait;
use lightsout_fetch::SourceRequest;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Engine operations reachable from the host boundary.
#[async_trait]
pub trait HostHandler: Send + Sync + 'static {
    fn config_get(&self) -> Result<Value>;
    fn config_save(&self, payload: ConfigSavePayload) -> Result<()>;
    async fn sync_source(&self, source: SourceRequest) -> Result<SyncResult>;
    async fn sync_all(&self) -> Result<BatchSyncResult>;
    fn delete_cloud_by_source(&self, source_ids: &[String]) -> Result<DeleteResult>;
    fn delete_all_cloud(&self) -> Result<DeleteResult>;
    fn schedule_rebuild(&self) -> Result<usize>;
    fn schedule_list(&self) -> Result<Value>;
    /// Returns `false` when a countdown is already running.
    fn shutdown_trigger(&self) -> Result<bool>;
    async fn shutdown_cancel(&self) -> Result<()>;
    fn auto_sync_restart(&self) -> Result<()>;

    /// Called once the bridge has answered `runtime.stop`.
    fn runtime_stop(&self) -> Result<()> {
        Ok(())
    }

    /// Engine events to forward to the UI as [`EventEnvelope`]s.
    fn engine_events(&self) -> Option<broadcast::Receiver<EngineEvent>> {
        None
    }
}

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<ResponseEnvelope>,
}

/// Sending half of the command channel.
#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
}

impl HostCommandClient {
    /// Dispatch one command and wait for its response.
    ///
    /// Invalid envelopes are answered locally with an error response. An
    /// `Err` means the server is gone.
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        if let Err(e) = envelope.validate() {
            return Ok(ResponseEnvelope::error(envelope.request_id, e.to_string()));
        }

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| LightsOutError::Channel(format!("failed to send host command: {e}")))?;

        response_rx
            .await
            .map_err(|e| LightsOutError::Channel(format!("host command response dropped: {e}")))
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }
}

/// Receiving half of the command channel.
pub struct HostCommandServer<H: HostHandler> {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    event_tx: broadcast::Sender<EventEnvelope>,
    handler: Arc<H>,
}

#[must_use]
pub fn command_channel<H: HostHandler>(
    request_capacity: usize,
    event_capacity: usize,
    handler: H,
) -> (HostCommandClient, HostCommandServer<H>) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    let (event_tx, _) = broadcast::channel(event_capacity.max(1));
    (
        HostCommandClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        HostCommandServer {
            request_rx,
            event_tx,
            handler: Arc::new(handler),
        },
    )
}

impl<H: HostHandler> HostCommandServer<H> {
    /// Serve until every client is dropped.
    ///
    /// Each command runs on its own task, so a long batch sync never holds
    /// up `shutdown.cancel`.
    pub async fn run(mut self) {
        let forwarder = self
            .handler
            .engine_events()
            .map(|rx| tokio::spawn(forward_engine_events(rx, self.event_tx.clone())));

        while let Some(request) = self.request_rx.recv().await {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let response = route(handler.as_ref(), &request.envelope).await;
                if request.response_tx.send(response).is_err() {
                    debug!("host command caller went away before the response");
                }
            });
        }

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
    }

    /// Route one envelope on the current task.
    pub async fn route(&self, envelope: &CommandEnvelope) -> ResponseEnvelope {
        route(self.handler.as_ref(), envelope).await
    }
}

/// Route a command to `handler` and wrap the outcome in a response.
pub async fn route<H: HostHandler + ?Sized>(handler: &H, envelope: &CommandEnvelope) -> ResponseEnvelope {
    let request_id = envelope.request_id.clone();
    match dispatch(handler, envelope).await {
        Ok(payload) => ResponseEnvelope::ok(request_id, payload),
        Err(e) => {
            warn!("host command {} failed: {e}", envelope.command);
            ResponseEnvelope::error(request_id, e.to_string())
        }
    }
}

async fn dispatch<H: HostHandler + ?Sized>(handler: &H, envelope: &CommandEnvelope) -> Result<Value> {
    match envelope.command {
        CommandName::HostPing => Ok(json!({"pong": true})),
        CommandName::HostVersion => Ok(json!({
            "contract_version": EVENT_VERSION,
            "engine_version": env!("CARGO_PKG_VERSION"),
        })),
        CommandName::ConfigGet => handler.config_get(),
        CommandName::ConfigSave => {
            handler.config_save(envelope.payload_as().map_err(contract_error)?)?;
            Ok(json!({"success": true}))
        }
        CommandName::SyncSource => {
            let source: SourceRequest = envelope.payload_as().map_err(contract_error)?;
            to_payload(&handler.sync_source(source).await?)
        }
        CommandName::SyncAll => to_payload(&handler.sync_all().await?),
        CommandName::CloudDeleteBySource => {
            let payload: DeleteBySourcePayload = envelope.payload_as().map_err(contract_error)?;
            to_payload(&handler.delete_cloud_by_source(&payload.source_ids)?)
        }
        CommandName::CloudDeleteAll => to_payload(&handler.delete_all_cloud()?),
        CommandName::ScheduleRebuild => Ok(json!({"pending": handler.schedule_rebuild()?})),
        CommandName::ScheduleList => handler.schedule_list(),
        CommandName::ShutdownTrigger => Ok(json!({"started": handler.shutdown_trigger()?})),
        CommandName::ShutdownCancel => {
            handler.shutdown_cancel().await?;
            Ok(json!({"cancelled": true}))
        }
        CommandName::AutoSyncRestart => {
            handler.auto_sync_restart()?;
            Ok(json!({"accepted": true}))
        }
        CommandName::RuntimeStop => {
            handler.runtime_stop()?;
            Ok(json!({"stopping": true}))
        }
    }
}

fn contract_error(e: crate::host::contract::ContractError) -> LightsOutError {
    LightsOutError::Config(e.to_string())
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| LightsOutError::Channel(format!("cannot serialize response payload: {e}")))
}

/// Re-publish engine events as versioned envelopes until the source closes.
async fn forward_engine_events(
    mut rx: broadcast::Receiver<EngineEvent>,
    event_tx: broadcast::Sender<EventEnvelope>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let envelope = EventEnvelope::new(
                    uuid::Uuid::new_v4().to_string(),
                    event.name(),
                    event.payload(),
                );
                let _ = event_tx.send(envelope);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("engine event forwarder lagged; {n} events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
