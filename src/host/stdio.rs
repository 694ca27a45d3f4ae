//! Newline-delimited JSON bridge for the host command channel.
//!
//! Reads `CommandEnvelope` lines, dispatches each through the command
//! channel, and writes `ResponseEnvelope` and `EventEnvelope` lines back.
//! Responses are written as soon as their command finishes, so they may
//! arrive out of request order; `request_id` pairs them up.
//!
//! Stdout is reserved for the protocol; diagnostics go to stderr.

use crate::error::{LightsOutError, Result};
use crate::host::channel::{HostCommandClient, HostHandler, command_channel};
use crate::host::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const REQUEST_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 128;

type SharedWriter<W> = Arc<Mutex<W>>;

/// Run the bridge on the process's stdin/stdout.
pub async fn run_stdio_bridge<H: HostHandler>(handler: H) -> Result<()> {
    run_bridge(
        handler,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}

/// Run the bridge until `input` reaches EOF or `runtime.stop` is answered.
pub async fn run_bridge<H, R, W>(handler: H, input: R, output: W) -> Result<()>
where
    H: HostHandler,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client, server) = command_channel(REQUEST_CAPACITY, EVENT_CAPACITY, handler);
    let writer: SharedWriter<W> = Arc::new(Mutex::new(output));

    let mut event_rx = client.subscribe_events();
    let server_handle = tokio::spawn(server.run());

    let event_writer = Arc::clone(&writer);
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(envelope) => match serde_json::to_string(&envelope) {
                    Ok(json) => {
                        if let Err(e) = write_line(&event_writer, &json).await {
                            warn!("cannot write event envelope; stopping event forwarder: {e}");
                            break;
                        }
                    }
                    Err(e) => error!("cannot serialize event envelope: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event forwarder lagged; {n} events dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let result = run_reader(client, input, Arc::clone(&writer)).await;

    event_handle.abort();
    let _ = event_handle.await;
    let _ = server_handle.await;
    result
}

async fn run_reader<R, W>(client: HostCommandClient, mut input: R, writer: SharedWriter<W>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut in_flight: JoinSet<Result<()>> = JoinSet::new();
    let mut line = String::new();

    loop {
        line.clear();
        let read = input
            .read_line(&mut line)
            .await
            .map_err(|e| LightsOutError::Channel(format!("failed to read command: {e}")))?;
        if read == 0 {
            info!("input closed; shutting down host bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("cannot parse command envelope: {e}");
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&writer, &response).await?;
                continue;
            }
        };

        if envelope.command == CommandName::RuntimeStop {
            // Let in-flight commands answer before the final response.
            while let Some(done) = in_flight.join_next().await {
                if let Ok(Err(e)) = done {
                    warn!("in-flight command failed to respond: {e}");
                }
            }
            let response = dispatch(&client, envelope).await;
            write_response(&writer, &response).await?;
            info!("runtime.stop answered; shutting down host bridge");
            return Ok(());
        }

        let client = client.clone();
        let writer = Arc::clone(&writer);
        in_flight.spawn(async move {
            let response = dispatch(&client, envelope).await;
            write_response(&writer, &response).await
        });

        while let Some(done) = in_flight.try_join_next() {
            if let Ok(Err(e)) = done {
                return Err(e);
            }
        }
    }

    while let Some(done) = in_flight.join_next().await {
        if let Ok(Err(e)) = done {
            warn!("in-flight command failed to respond: {e}");
        }
    }
    Ok(())
}

async fn dispatch(client: &HostCommandClient, envelope: CommandEnvelope) -> ResponseEnvelope {
    let request_id = envelope.request_id.clone();
    match client.send(envelope).await {
        Ok(response) => response,
        Err(e) => {
            error!("host command dispatch failed: {e}");
            ResponseEnvelope::error(request_id, format!("dispatch failed: {e}"))
        }
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| LightsOutError::Channel(format!("cannot serialize response: {e}")))?;
    write_line(writer, &json).await
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &SharedWriter<W>, json: &str) -> Result<()> {
    let mut w = writer.lock().await;
    w.write_all(json.as_bytes()).await?;
    w.write_all(b"\n").await?;
    w.flush().await?;
    Ok(())
}
