//! Applies fetched source payloads to the knowledge base.
//!
//! Reconciliation is replace-by-source: every item tagged with a source id
//! is dropped and the freshly fetched set is appended in its place. Local
//! items are never touched.

use crate::config::{ConfigDocument, ConfigStore, KnowledgeItem};
use crate::error::LightsOutError;
use crate::events::{EngineEvent, EventSender, emit};
use crate::sync::types::{BatchSyncResult, DeleteResult, SourceSyncOutcome, SyncResult};
use async_trait::async_trait;
use chrono::Local;
use lightsout_fetch::{FetchedItem, HttpFetcher, SourceRequest};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Retrieves the items of one remote source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceRequest) -> lightsout_fetch::Result<Vec<FetchedItem>>;
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceRequest) -> lightsout_fetch::Result<Vec<FetchedItem>> {
        HttpFetcher::fetch(self, source).await
    }
}

/// Syncs cloud sources into the config document.
pub struct SyncReconciler {
    store: Arc<dyn ConfigStore>,
    fetcher: Arc<dyn SourceFetcher>,
    events: EventSender,
    /// Serializes this reconciler's own load-modify-save cycles.
    write_lock: Mutex<()>,
}

impl SyncReconciler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        fetcher: Arc<dyn SourceFetcher>,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            fetcher,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// Fetch one source and reconcile it. Never fails; see [`SyncResult`].
    pub async fn sync_source(&self, source: &SourceRequest) -> SyncResult {
        info!("syncing knowledge source {} ({})", source.name, source.url);
        match self.fetcher.fetch(source).await {
            Ok(items) => self.reconcile(&source.source_id, &source.name, items),
            Err(e) => {
                let e = LightsOutError::from(e);
                warn!("sync of {} failed: {e}", source.name);
                SyncResult::failed(e.to_string())
            }
        }
    }

    /// Replace every item of `source_id` with `items`.
    pub fn reconcile(&self, source_id: &str, source_name: &str, items: Vec<FetchedItem>) -> SyncResult {
        if items.is_empty() {
            warn!("source {source_name} returned no items; keeping existing data");
            return SyncResult::failed(LightsOutError::NoData.to_string());
        }

        let synced_at = Local::now().to_rfc3339();
        let count = items.len();

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document = self.store.load();

        let before = document.knowledge_base.len();
        document
            .knowledge_base
            .retain(|item| item.source_id.as_deref() != Some(source_id));
        let removed = before - document.knowledge_base.len();

        document.knowledge_base.extend(
            items
                .into_iter()
                .map(|item| KnowledgeItem::from_fetched(item, source_id, source_name, &synced_at)),
        );

        let built_in = match document
            .cloud_knowledge_sources
            .iter_mut()
            .find(|s| s.id == source_id)
        {
            Some(source) if source.is_built_in => true,
            Some(source) => {
                source.last_sync_time = Some(synced_at.clone());
                false
            }
            None => false,
        };

        if let Err(e) = self.store.save(&document) {
            warn!("cannot save synced items for {source_name}: {e}");
            return SyncResult::failed(format!("failed to save config: {e}"));
        }
        if built_in {
            self.store.record_builtin_sync(source_id, &synced_at);
        }

        debug!("source {source_id}: replaced {removed} items with {count}");
        info!("synced {count} items from {source_name}");
        SyncResult::succeeded(count)
    }

    /// Sync every enabled source, one at a time, in document order.
    pub async fn sync_all(&self) -> BatchSyncResult {
        let sources: Vec<SourceRequest> = self
            .store
            .load()
            .enabled_sources()
            .map(|s| SourceRequest::new(s.id.clone(), s.name.clone(), s.url.clone()))
            .collect();

        if sources.is_empty() {
            info!("no enabled knowledge sources to sync");
            let result = BatchSyncResult::default();
            emit(&self.events, EngineEvent::SyncCompleted { result: result.clone() });
            return result;
        }

        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            let result = self.sync_source(&source).await;
            outcomes.push(SourceSyncOutcome {
                source_id: source.source_id,
                source_name: source.name,
                result,
            });
        }

        let result = BatchSyncResult::from_outcomes(outcomes);
        info!(
            "batch sync finished: {} ok, {} failed, {} items",
            result.results.len() - result.failed_count(),
            result.failed_count(),
            result.total_count
        );
        emit(&self.events, EngineEvent::SyncCompleted { result: result.clone() });
        result
    }

    /// Remove the cloud items of the given sources.
    pub fn delete_by_source(&self, source_ids: &[String]) -> DeleteResult {
        if source_ids.is_empty() {
            return DeleteResult {
                success: true,
                message: "no sources selected".into(),
                deleted_count: 0,
            };
        }
        self.delete_where(|item| {
            item.source_id
                .as_deref()
                .is_some_and(|id| source_ids.iter().any(|s| s == id))
        })
    }

    /// Remove every cloud item.
    pub fn delete_all(&self) -> DeleteResult {
        self.delete_where(|_| true)
    }

    fn delete_where(&self, matches: impl Fn(&KnowledgeItem) -> bool) -> DeleteResult {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut document: ConfigDocument = self.store.load();

        let before = document.knowledge_base.len();
        document
            .knowledge_base
            .retain(|item| !(item.is_cloud() && matches(item)));
        let deleted_count = before - document.knowledge_base.len();

        if deleted_count == 0 {
            return DeleteResult {
                success: true,
                message: "no cloud items to delete".into(),
                deleted_count,
            };
        }

        match self.store.save(&document) {
            Ok(()) => {
                info!("deleted {deleted_count} cloud items");
                DeleteResult {
                    success: true,
                    message: format!("deleted {deleted_count} items"),
                    deleted_count,
                }
            }
            Err(e) => {
                warn!("cannot save after deleting cloud items: {e}");
                DeleteResult {
                    success: false,
                    message: format!("failed to save config: {e}"),
                    deleted_count: 0,
                }
            }
        }
    }
}
