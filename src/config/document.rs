//! The persisted config document and the records it holds.
//!
//! Keys are camelCase on disk so documents written by earlier releases load
//! unchanged. Fields this crate does not model (UI state, backgrounds) are
//! kept in `extra` maps and written back verbatim on save. Modelled fields
//! decode through [`lenient`](super::lenient), so one drifted value never
//! costs the rest of the document.

use crate::config::lenient;
use lightsout_fetch::FetchedItem;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default auto-sync interval in minutes.
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 60;

/// Longest auto-sync interval honoured: one week.
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_MINUTES
}

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A recurring weekly shutdown rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRule {
    /// Local wall-clock time, `HH:MM:SS` (or `HH:MM`).
    #[serde(default, deserialize_with = "lenient::string")]
    pub time: String,
    /// Days of week, 0 = Sunday .. 6 = Saturday.
    #[serde(default, deserialize_with = "lenient::weekdays")]
    pub weekdays: Vec<u8>,
    #[serde(default = "default_true", deserialize_with = "lenient::bool_or_true")]
    pub active: bool,
}

impl ShutdownRule {
    pub fn new(time: impl Into<String>, weekdays: impl Into<Vec<u8>>) -> Self {
        Self {
            time: time.into(),
            weekdays: weekdays.into(),
            active: true,
        }
    }
}

/// Where a knowledge item came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Authored by the user in the app. Never touched by sync.
    #[default]
    Local,
    /// Written by the reconciler from a cloud source.
    Cloud,
}

/// One entry of the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    #[serde(default, deserialize_with = "lenient::string")]
    pub author: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub source: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub content: String,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::data_source")]
    pub data_source: DataSource,
    /// Set for every cloud item; references a [`CloudKnowledgeSource::id`].
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub sync_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KnowledgeItem {
    /// A locally authored item.
    pub fn local(
        author: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            source: source.into(),
            content: content.into(),
            create_time: None,
            update_time: None,
            data_source: DataSource::Local,
            source_id: None,
            source_name: None,
            sync_time: None,
            extra: Map::new(),
        }
    }

    /// Tag a fetched item as belonging to a cloud source.
    pub fn from_fetched(
        item: FetchedItem,
        source_id: &str,
        source_name: &str,
        synced_at: &str,
    ) -> Self {
        Self {
            author: item.author,
            source: item.source,
            content: item.content,
            create_time: item.create_time,
            update_time: item.update_time,
            data_source: DataSource::Cloud,
            source_id: Some(source_id.to_owned()),
            source_name: Some(source_name.to_owned()),
            sync_time: Some(synced_at.to_owned()),
            extra: item.extra,
        }
    }

    pub fn is_cloud(&self) -> bool {
        self.data_source == DataSource::Cloud
    }
}

/// A named, URL-addressed remote knowledge feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudKnowledgeSource {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub url: String,
    #[serde(default = "default_true", deserialize_with = "lenient::bool_or_true")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::bool_or_false", skip_serializing_if = "is_false")]
    pub is_built_in: bool,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CloudKnowledgeSource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            enabled: true,
            last_sync_time: None,
            is_built_in: false,
            description: None,
        }
    }
}

/// Running totals of scheduled shutdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownStats {
    /// Countdowns started by a firing timer or manual trigger.
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_scheduled: u64,
    /// Countdowns the user aborted.
    #[serde(default, deserialize_with = "lenient::count")]
    pub total_canceled: u64,
    /// Time the last shutdown command was issued.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub last_shutdown: Option<String>,
}

/// Aggregate root persisted by the config store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(default, rename = "shutdownTimes", deserialize_with = "lenient::list")]
    pub shutdown_rules: Vec<ShutdownRule>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub knowledge_base: Vec<KnowledgeItem>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub cloud_knowledge_sources: Vec<CloudKnowledgeSource>,
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    pub auto_sync_enabled: bool,
    /// Minutes between auto-sync runs. 0 means the default.
    #[serde(default = "default_sync_interval", deserialize_with = "lenient::sync_interval")]
    pub sync_interval: u64,
    #[serde(default, deserialize_with = "lenient::optional", skip_serializing_if = "Option::is_none")]
    pub shutdown_stats: Option<ShutdownStats>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            shutdown_rules: Vec::new(),
            knowledge_base: Vec::new(),
            cloud_knowledge_sources: Vec::new(),
            auto_sync_enabled: false,
            sync_interval: DEFAULT_SYNC_INTERVAL_MINUTES,
            shutdown_stats: None,
            extra: Map::new(),
        }
    }
}

impl ConfigDocument {
    /// Effective auto-sync interval in minutes, capped at one week.
    pub fn sync_interval_minutes(&self) -> u64 {
        if self.sync_interval == 0 {
            DEFAULT_SYNC_INTERVAL_MINUTES
        } else {
            self.sync_interval.min(MAX_SYNC_INTERVAL_MINUTES)
        }
    }

    /// Sources with `enabled = true`, in document order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &CloudKnowledgeSource> {
        self.cloud_knowledge_sources.iter().filter(|s| s.enabled)
    }

    pub fn source(&self, id: &str) -> Option<&CloudKnowledgeSource> {
        self.cloud_knowledge_sources.iter().find(|s| s.id == id)
    }

    /// Number of knowledge items tagged with `source_id`.
    pub fn items_from_source(&self, source_id: &str) -> usize {
        self.knowledge_base
            .iter()
            .filter(|item| item.source_id.as_deref() == Some(source_id))
            .count()
    }

    /// Mutable stats block, created on first use.
    pub fn stats_mut(&mut self) -> &mut ShutdownStats {
        self.shutdown_stats.get_or_insert_with(ShutdownStats::default)
    }
}
