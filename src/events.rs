//! Events emitted by the engine for UI and observability.
//!
//! Events are fire-and-forget: a send with no subscribers is not an error,
//! and slow subscribers may lag and drop events.

use crate::scheduler::ScheduledTimer;
use crate::sync::BatchSyncResult;
use serde::Serialize;
use tokio::sync::broadcast;

/// Events that describe what the engine just did.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum EngineEvent {
    /// The shutdown timer set was rebuilt from config.
    ScheduleRebuilt {
        pending: Vec<ScheduledTimer>,
    },
    /// A shutdown timer fired; the cancellable countdown is running.
    ShutdownCountdownStarted {
        /// RFC 3339 instant the shutdown command will be issued.
        fires_at: String,
        countdown_secs: u64,
    },
    /// The countdown was aborted before the shutdown command ran.
    ShutdownCancelled,
    /// The platform shutdown command was issued.
    ShutdownExecuted,
    /// The platform shutdown command failed. Not retried.
    ShutdownFailed { error: String },
    /// An auto-sync (or manual batch) run finished.
    SyncCompleted { result: BatchSyncResult },
    /// The config document was saved through the engine.
    ConfigSaved,
}

impl EngineEvent {
    /// Wire name used by the host event envelope.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScheduleRebuilt { .. } => "schedule.rebuilt",
            Self::ShutdownCountdownStarted { .. } => "shutdown.countdown_started",
            Self::ShutdownCancelled => "shutdown.cancelled",
            Self::ShutdownExecuted => "shutdown.executed",
            Self::ShutdownFailed { .. } => "shutdown.failed",
            Self::SyncCompleted { .. } => "sync.completed",
            Self::ConfigSaved => "config.saved",
        }
    }

    /// Event body without the tag wrapper.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("payload").unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        }
    }
}

/// Broadcast sender shared by every engine component.
pub type EventSender = broadcast::Sender<EngineEvent>;

/// Send an event, ignoring the "no subscribers" case.
pub(crate) fn emit(events: &EventSender, event: EngineEvent) {
    let _ = events.send(event);
}
