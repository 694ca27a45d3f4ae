//! Versioned command/response/event envelopes exchanged with the UI shell.

use crate::config::ConfigDocument;
use crate::engine::SaveOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Contract version carried by every envelope.
pub const EVENT_VERSION: u32 = 1;

/// Commands the host accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "config.get")]
    ConfigGet,
    #[serde(rename = "config.save")]
    ConfigSave,
    #[serde(rename = "sync.source")]
    SyncSource,
    #[serde(rename = "sync.all")]
    SyncAll,
    #[serde(rename = "cloud.delete_by_source")]
    CloudDeleteBySource,
    #[serde(rename = "cloud.delete_all")]
    CloudDeleteAll,
    #[serde(rename = "schedule.rebuild")]
    ScheduleRebuild,
    #[serde(rename = "schedule.list")]
    ScheduleList,
    #[serde(rename = "shutdown.trigger")]
    ShutdownTrigger,
    #[serde(rename = "shutdown.cancel")]
    ShutdownCancel,
    #[serde(rename = "auto_sync.restart")]
    AutoSyncRestart,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Every command, in wire order.
    pub const ALL: [Self; 14] = [
        Self::HostPing,
        Self::HostVersion,
        Self::ConfigGet,
        Self::ConfigSave,
        Self::SyncSource,
        Self::SyncAll,
        Self::CloudDeleteBySource,
        Self::CloudDeleteAll,
        Self::ScheduleRebuild,
        Self::ScheduleList,
        Self::ShutdownTrigger,
        Self::ShutdownCancel,
        Self::AutoSyncRestart,
        Self::RuntimeStop,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::ConfigGet => "config.get",
            Self::ConfigSave => "config.save",
            Self::SyncSource => "sync.source",
            Self::SyncAll => "sync.all",
            Self::CloudDeleteBySource => "cloud.delete_by_source",
            Self::CloudDeleteAll => "cloud.delete_all",
            Self::ScheduleRebuild => "schedule.rebuild",
            Self::ScheduleList => "schedule.list",
            Self::ShutdownTrigger => "shutdown.trigger",
            Self::ShutdownCancel => "shutdown.cancel",
            Self::AutoSyncRestart => "auto_sync.restart",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI → host request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: Value,
}

impl CommandEnvelope {
    #[must_use]
    pub fn new(request_id: impl Into<String>, command: CommandName, payload: Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Check version and request id before dispatch.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::UnsupportedVersion {
                got: self.v,
                expected: EVENT_VERSION,
            });
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::InvalidEnvelope(
                "request_id cannot be empty".into(),
            ));
        }
        Ok(())
    }

    /// Deserialize the payload into a command-specific type.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ContractError> {
        let payload = if self.payload.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            self.payload.clone()
        };
        serde_json::from_value(payload).map_err(|e| ContractError::InvalidPayload {
            command: self.command,
            reason: e.to_string(),
        })
    }
}

/// Host → UI reply. Exactly one per command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Host → UI notification, unsolicited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: Value,
}

impl EventEnvelope {
    #[must_use]
    pub fn new(event_id: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Payload of `config.save`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSavePayload {
    pub config: ConfigDocument,
    #[serde(default)]
    pub options: SaveOptions,
}

/// Payload of `cloud.delete_by_source`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBySourcePayload {
    pub source_ids: Vec<String>,
}

/// Envelope or payload rejected before reaching the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("unsupported contract version {got}; expected {expected}")]
    UnsupportedVersion { got: u32, expected: u32 },

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("invalid payload for {command}: {reason}")]
    InvalidPayload { command: CommandName, reason: String },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use lightsout_fetch::SourceRequest;

    #[test]
    fn command_names_round_trip_through_wire_format() {
        for command in CommandName::ALL {
            assert_eq!(CommandName::parse(command.as_str()), Some(command));
            let json = serde_json::to_value(command).unwrap();
            assert_eq!(json, Value::from(command.as_str()));
        }
        assert_eq!(CommandName::parse("scheduler.create"), None);
    }

    #[test]
    fn envelope_validation() {
        let mut env = CommandEnvelope::new("r1", CommandName::HostPing, Value::Null);
        env.validate().unwrap();

        env.v = 9;
        assert!(matches!(
            env.validate(),
            Err(ContractError::UnsupportedVersion { got: 9, .. })
        ));

        let env = CommandEnvelope::new("  ", CommandName::HostPing, Value::Null);
        assert!(matches!(env.validate(), Err(ContractError::InvalidEnvelope(_))));
    }

    #[test]
    fn typed_payloads() {
        let env = CommandEnvelope::new(
            "r1",
            CommandName::SyncSource,
            serde_json::json!({"sourceId": "s1", "name": "One", "url": "http://one"}),
        );
        let source: SourceRequest = env.payload_as().unwrap();
        assert_eq!(source.source_id, "s1");

        let env = CommandEnvelope::new(
            "r2",
            CommandName::ConfigSave,
            serde_json::json!({"config": {"autoSyncEnabled": true}}),
        );
        let save: ConfigSavePayload = env.payload_as().unwrap();
        assert!(save.config.auto_sync_enabled);
        assert!(!save.options.skip_auto_sync_restart);

        let env = CommandEnvelope::new("r3", CommandName::CloudDeleteBySource, Value::Null);
        let err = env.payload_as::<DeleteBySourcePayload>().unwrap_err();
        assert!(err.to_string().starts_with("invalid payload for cloud.delete_by_source"));
    }

    #[test]
    fn error_response_omits_payload_details() {
        let resp = ResponseEnvelope::error("r1", "nope");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "nope");
        assert_eq!(json["payload"], Value::Null);
    }
}
