//! lightsout: weekly shutdown scheduling and cloud knowledge sync.
//!
//! # Architecture
//!
//! - **Scheduler**: turns weekly shutdown rules into armed timers and runs a
//!   cancellable countdown before issuing the platform shutdown command
//! - **Sync**: fetches remote knowledge sources and reconciles them into the
//!   config document, by hand or on an auto-sync interval
//! - **Engine**: owns both and exposes them to the UI shell through the host
//!   command channel
//!
//! Everything persists in one JSON config document behind [`ConfigStore`].

pub mod app_dirs;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod scheduler;
pub mod sync;

#[doc(hidden)]
pub mod test_utils;

pub use config::{ConfigDocument, ConfigStore, JsonConfigStore};
pub use engine::{Engine, EngineSettings, SaveOptions};
pub use error::{LightsOutError, Result};
pub use events::EngineEvent;
