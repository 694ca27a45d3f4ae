//! Host-facing command channel for the UI shell.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod stdio;
