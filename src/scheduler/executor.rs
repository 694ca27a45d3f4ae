//! Scheduler → operating system bridge.
//!
//! [`ShutdownExecutor`] is the seam between the countdown logic and the
//! platform. [`SystemShutdown`] issues the real commands; [`DryRunShutdown`]
//! only logs and is what the host binary uses when `LIGHTSOUT_DRY_RUN` is set.

use crate::error::{LightsOutError, Result};
use async_trait::async_trait;
use tracing::{info, warn};

/// Issues and revokes an OS-level power-off.
#[async_trait]
pub trait ShutdownExecutor: Send + Sync {
    /// Ask the OS to power off.
    async fn execute_shutdown(&self) -> Result<()>;

    /// Abort an OS power-off that was already requested.
    async fn cancel_shutdown(&self) -> Result<()>;
}

/// A program plus its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCommand {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl std::fmt::Display for PlatformCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Power-off command for the current platform.
pub fn shutdown_command() -> PlatformCommand {
    if cfg!(windows) {
        PlatformCommand {
            program: "shutdown",
            args: &["/s", "/f", "/t", "60"],
        }
    } else {
        PlatformCommand {
            program: "sudo",
            args: &["shutdown", "-h", "+1"],
        }
    }
}

/// Abort command for the current platform.
pub fn cancel_command() -> PlatformCommand {
    if cfg!(windows) {
        PlatformCommand {
            program: "shutdown",
            args: &["/a"],
        }
    } else {
        PlatformCommand {
            program: "sudo",
            args: &["shutdown", "-c"],
        }
    }
}

/// Runs the platform's `shutdown` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdown;

impl SystemShutdown {
    async fn run(command: PlatformCommand) -> Result<()> {
        let output = tokio::process::Command::new(command.program)
            .args(command.args)
            .output()
            .await
            .map_err(|e| LightsOutError::Shutdown(format!("failed to execute `{command}`: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LightsOutError::Shutdown(format!(
                "`{command}` exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ShutdownExecutor for SystemShutdown {
    async fn execute_shutdown(&self) -> Result<()> {
        let command = shutdown_command();
        info!("issuing shutdown: {command}");
        Self::run(command).await
    }

    async fn cancel_shutdown(&self) -> Result<()> {
        let command = cancel_command();
        info!("cancelling shutdown: {command}");
        Self::run(command).await
    }
}

/// Logs instead of powering off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunShutdown;

#[async_trait]
impl ShutdownExecutor for DryRunShutdown {
    async fn execute_shutdown(&self) -> Result<()> {
        warn!("dry run: would issue `{}`", shutdown_command());
        Ok(())
    }

    async fn cancel_shutdown(&self) -> Result<()> {
        warn!("dry run: would issue `{}`", cancel_command());
        Ok(())
    }
}
