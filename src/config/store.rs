//! Config document persistence.
//!
//! Every component reads a fresh [`ConfigDocument`] per operation and writes
//! the whole document back. Two logically concurrent read-modify-write
//! cycles can therefore lose one side's changes; callers accept that.

use crate::config::document::{CloudKnowledgeSource, ConfigDocument};
use crate::error::{LightsOutError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

/// Durable home of the config document.
pub trait ConfigStore: Send + Sync {
    /// Read the current document.
    ///
    /// Never fails: a missing or unreadable document yields the default
    /// document (with built-in sources merged in).
    fn load(&self) -> ConfigDocument;

    /// Persist the whole document. Built-in sources are never written.
    fn save(&self, document: &ConfigDocument) -> Result<()>;

    /// Record a sync time for a built-in source, which cannot be persisted.
    fn record_builtin_sync(&self, source_id: &str, synced_at: &str) {
        let _ = (source_id, synced_at);
    }
}

/// Sources defined in code rather than in the document.
///
/// They are merged ahead of user-defined sources on every load and stripped
/// before every save. Their last sync time lives in memory only.
#[derive(Debug, Default)]
pub struct BuiltinSources {
    definitions: Vec<CloudKnowledgeSource>,
    sync_times: Mutex<HashMap<String, String>>,
}

impl BuiltinSources {
    pub fn new(definitions: Vec<CloudKnowledgeSource>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|mut source| {
                source.is_built_in = true;
                source.last_sync_time = None;
                source
            })
            .collect();
        Self {
            definitions,
            sync_times: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn is_builtin_id(&self, id: &str) -> bool {
        self.definitions.iter().any(|d| d.id == id)
    }

    /// Prepend built-ins to the document's source list. Stale copies that
    /// were persisted by older versions are dropped.
    pub fn merge_into(&self, document: &mut ConfigDocument) {
        if self.is_empty() {
            return;
        }
        let times = self.sync_times.lock().unwrap_or_else(|e| e.into_inner());
        let mut merged: Vec<CloudKnowledgeSource> = self
            .definitions
            .iter()
            .map(|def| {
                let mut source = def.clone();
                source.last_sync_time = times.get(&def.id).cloned();
                source
            })
            .collect();
        drop(times);

        merged.extend(
            document
                .cloud_knowledge_sources
                .drain(..)
                .filter(|s| !s.is_built_in && !self.is_builtin_id(&s.id)),
        );
        document.cloud_knowledge_sources = merged;
    }

    /// Copy of `document` with every built-in source removed.
    pub fn strip(&self, document: &ConfigDocument) -> ConfigDocument {
        let mut stripped = document.clone();
        stripped
            .cloud_knowledge_sources
            .retain(|s| !s.is_built_in && !self.is_builtin_id(&s.id));
        stripped
    }

    pub fn record_sync(&self, source_id: &str, synced_at: &str) {
        self.sync_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source_id.to_owned(), synced_at.to_owned());
    }

    pub fn last_sync(&self, source_id: &str) -> Option<String> {
        self.sync_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source_id)
            .cloned()
    }
}

/// JSON file backed [`ConfigStore`].
///
/// When the file exists but cannot be parsed, loads fall back to defaults
/// and saves are refused until a later load succeeds, so the unreadable
/// file is never replaced by a default document.
#[derive(Debug)]
pub struct JsonConfigStore {
    path: PathBuf,
    builtins: BuiltinSources,
    unreadable: AtomicBool,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            builtins: BuiltinSources::default(),
            unreadable: AtomicBool::new(false),
        }
    }

    /// Store at [`app_dirs::config_file`](crate::app_dirs::config_file).
    pub fn at_default_path() -> Self {
        Self::new(crate::app_dirs::config_file())
    }

    pub fn with_builtin_sources(mut self, definitions: Vec<CloudKnowledgeSource>) -> Self {
        self.builtins = BuiltinSources::new(definitions);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn builtins(&self) -> &BuiltinSources {
        &self.builtins
    }

    /// Whether the last load found a file it could not parse.
    pub fn is_unreadable(&self) -> bool {
        self.unreadable.load(Ordering::SeqCst)
    }

    /// Where [`ensure_exists`](Self::ensure_exists) moves an unparsable file.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".broken");
        self.path.with_file_name(name)
    }

    /// Write the default document if none exists yet, and backfill the
    /// top-level collections when an older document lacks them. A file that
    /// is not a JSON object is moved to [`backup_path`](Self::backup_path)
    /// before the default document takes its place.
    pub fn ensure_exists(&self) -> Result<()> {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(serde_json::Value::Object(map))
                    if map.contains_key("shutdownTimes") && map.contains_key("knowledgeBase") =>
                {
                    Ok(())
                }
                Ok(serde_json::Value::Object(_)) => {
                    debug!("backfilling missing collections in {}", self.path.display());
                    self.save(&self.load())
                }
                _ => {
                    let backup = self.backup_path();
                    warn!(
                        "config at {} is not a JSON object; moving it to {} and resetting to defaults",
                        self.path.display(),
                        backup.display()
                    );
                    std::fs::rename(&self.path, &backup).map_err(|e| {
                        LightsOutError::Persistence(format!(
                            "cannot move unreadable config to {}: {e}",
                            backup.display()
                        ))
                    })?;
                    self.unreadable.store(false, Ordering::SeqCst);
                    self.save(&ConfigDocument::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.save(&ConfigDocument::default())
            }
            Err(e) => Err(LightsOutError::Persistence(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// `Ok(None)` when the file does not exist.
    fn read_document(&self) -> Result<Option<ConfigDocument>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LightsOutError::Persistence(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            LightsOutError::Persistence(format!("cannot parse {}: {e}", self.path.display()))
        })
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> ConfigDocument {
        let mut document = match self.read_document() {
            Ok(doc) => {
                self.unreadable.store(false, Ordering::SeqCst);
                doc.unwrap_or_default()
            }
            Err(e) => {
                error!("error reading config file, using defaults until it is fixed: {e}");
                self.unreadable.store(true, Ordering::SeqCst);
                ConfigDocument::default()
            }
        };
        self.builtins.merge_into(&mut document);
        document
    }

    fn save(&self, document: &ConfigDocument) -> Result<()> {
        if self.is_unreadable() {
            return Err(LightsOutError::Persistence(format!(
                "refusing to overwrite unreadable config at {}",
                self.path.display()
            )));
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LightsOutError::Persistence(format!(
                    "cannot create config directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let stripped = self.builtins.strip(document);
        let json = serde_json::to_string_pretty(&stripped).map_err(|e| {
            LightsOutError::Persistence(format!("cannot serialize config: {e}"))
        })?;

        std::fs::write(&self.path, json).map_err(|e| {
            error!("error saving config file: {e}");
            LightsOutError::Persistence(format!("cannot write {}: {e}", self.path.display()))
        })?;

        debug!("saved config to {}", self.path.display());
        Ok(())
    }

    fn record_builtin_sync(&self, source_id: &str, synced_at: &str) {
        self.builtins.record_sync(source_id, synced_at);
    }
}

/// In-memory [`ConfigStore`] for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    document: Mutex<ConfigDocument>,
    builtins: BuiltinSources,
    fail_saves: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new(document: ConfigDocument) -> Self {
        Self {
            document: Mutex::new(document),
            ..Default::default()
        }
    }

    pub fn with_builtin_sources(mut self, definitions: Vec<CloudKnowledgeSource>) -> Self {
        self.builtins = BuiltinSources::new(definitions);
        self
    }

    /// Make every subsequent `save` fail with a persistence error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> ConfigDocument {
        let mut document = self
            .document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        self.builtins.merge_into(&mut document);
        document
    }

    fn save(&self, document: &ConfigDocument) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(LightsOutError::Persistence("store is read-only".into()));
        }
        *self.document.lock().unwrap_or_else(|e| e.into_inner()) = self.builtins.strip(document);
        Ok(())
    }

    fn record_builtin_sync(&self, source_id: &str, synced_at: &str) {
        self.builtins.record_sync(source_id, synced_at);
    }
}
