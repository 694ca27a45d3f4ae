//! Headless engine host speaking newline-delimited JSON over stdin/stdout.
//!
//! All tracing output goes to stderr and a daily log file so that stdout
//! stays a clean protocol channel.
//!
//! Set `LIGHTSOUT_DRY_RUN=1` to log shutdown commands instead of running them.

use lightsout::config::JsonConfigStore;
use lightsout::engine::{Engine, EngineSettings};
use lightsout::host::handler::EngineHostHandler;
use lightsout::host::stdio::run_stdio_bridge;
use lightsout::scheduler::{DryRunShutdown, ShutdownExecutor, SystemShutdown};
use lightsout_fetch::HttpFetcher;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const LOG_FILE_PREFIX: &str = "lightsout-host.log";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();

    tracing::info!("lightsout-host starting");

    let store = JsonConfigStore::at_default_path();
    if let Err(e) = store.ensure_exists() {
        tracing::warn!("cannot initialise config at {}: {e}", store.path().display());
    }

    let executor: Arc<dyn ShutdownExecutor> = if std::env::var_os("LIGHTSOUT_DRY_RUN").is_some() {
        tracing::warn!("LIGHTSOUT_DRY_RUN set; shutdown commands will only be logged");
        Arc::new(DryRunShutdown)
    } else {
        Arc::new(SystemShutdown)
    };
    let fetcher = HttpFetcher::with_defaults()
        .map_err(|e| anyhow::anyhow!("cannot build HTTP fetcher: {e}"))?;

    let engine = Arc::new(
        Engine::new(
            Arc::new(store),
            Arc::new(fetcher),
            executor,
            EngineSettings::default(),
        )
        .map_err(|e| anyhow::anyhow!("cannot build engine: {e}"))?,
    );
    engine.init();

    let result = run_stdio_bridge(EngineHostHandler::new(Arc::clone(&engine))).await;
    engine.dispose();

    result.map_err(|e| {
        tracing::error!(error = %e, "lightsout-host exited with error");
        anyhow::anyhow!("lightsout-host failed: {e}")
    })?;

    tracing::info!("lightsout-host shut down cleanly");
    Ok(())
}

/// Stderr plus a daily-rolling file in the logs directory. The returned
/// guard flushes the file writer on drop.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lightsout=info,lightsout_fetch=info,lightsout_host=info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let logs_dir = lightsout::app_dirs::logs_dir();
    match std::fs::create_dir_all(&logs_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&logs_dir, LOG_FILE_PREFIX);
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(file_writer),
                )
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            tracing::warn!("cannot create log directory {}: {e}", logs_dir.display());
            None
        }
    }
}
