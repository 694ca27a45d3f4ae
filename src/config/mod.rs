//! Config document model and its persistence boundary.

pub mod document;
mod lenient;
pub mod store;

pub use document::{
    CloudKnowledgeSource, ConfigDocument, DataSource, KnowledgeItem, ShutdownRule, ShutdownStats,
};
pub use store::{BuiltinSources, ConfigStore, JsonConfigStore, MemoryConfigStore};
