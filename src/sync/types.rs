//! Result objects returned across the sync boundary.
//!
//! Sync never returns an error to its caller; every failure is folded into
//! one of these values with `success = false` and a readable message.

use serde::{Deserialize, Serialize};

/// Outcome of syncing one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
}

impl SyncResult {
    pub fn succeeded(item_count: usize) -> Self {
        Self {
            success: true,
            message: format!("synced {item_count} items"),
            item_count: Some(item_count),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            item_count: None,
        }
    }
}

/// One entry of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSyncOutcome {
    pub source_id: String,
    pub source_name: String,
    pub result: SyncResult,
}

/// Outcome of syncing every enabled source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResult {
    /// True when at least one source succeeded.
    pub success: bool,
    pub results: Vec<SourceSyncOutcome>,
    /// Items written by the succeeding sources.
    pub total_count: usize,
}

impl BatchSyncResult {
    pub(crate) fn from_outcomes(results: Vec<SourceSyncOutcome>) -> Self {
        let success = results.iter().any(|r| r.result.success);
        let total_count = results
            .iter()
            .filter(|r| r.result.success)
            .filter_map(|r| r.result.item_count)
            .sum();
        Self {
            success,
            results,
            total_count,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.result.success).count()
    }
}

/// Outcome of removing cloud items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
}
