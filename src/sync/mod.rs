//! Cloud knowledge source sync.

pub mod auto;
pub mod reconciler;
pub mod types;

pub use auto::{AutoSync, DEFAULT_RESTART_DEBOUNCE};
pub use reconciler::{SourceFetcher, SyncReconciler};
pub use types::{BatchSyncResult, DeleteResult, SourceSyncOutcome, SyncResult};
