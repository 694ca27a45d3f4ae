//! Core types shared between the fetcher and its callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The addressing triple needed to fetch one knowledge source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRequest {
    /// Stable source identifier, used to tag synced items.
    #[serde(alias = "id")]
    pub source_id: String,
    /// Human-readable source name.
    pub name: String,
    /// HTTP(S) location of the payload.
    pub url: String,
}

impl SourceRequest {
    pub fn new(
        source_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            url: url.into(),
        }
    }
}

/// One knowledge item accepted from a remote payload.
///
/// Only `author` and `content` are required on ingest. Fields the fetcher
/// does not model are kept in `extra` and written back out untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedItem {
    pub author: String,
    #[serde(default)]
    pub source: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    /// Pass-through fields from the remote object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FetchedItem {
    /// Build an item with no timestamps or extra fields.
    pub fn new(
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
            extra: Map::new(),
        }
    }
}
