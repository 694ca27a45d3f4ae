//! Weekly shutdown scheduling.
//!
//! Turns the configured shutdown rules into armed timers, runs the
//! cancellable countdown, and issues the platform shutdown command.

pub mod executor;
pub mod recurrence;
pub mod shutdown;

pub use executor::{DryRunShutdown, ShutdownExecutor, SystemShutdown};
pub use recurrence::{expand_rule, next_occurrence};
pub use shutdown::{DEFAULT_COUNTDOWN_SECS, ScheduledTimer, SchedulerPhase, ShutdownScheduler};
