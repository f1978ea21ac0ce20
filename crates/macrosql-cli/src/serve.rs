//! Line-delimited JSON request loop
//!
//! Each input line is one request `{"id", "path", "body"}`; each output line
//! is one response `{"id", "status", "body"}`. Requests run concurrently on
//! the blocking pool, so responses can come back out of order and are
//! matched by `id`.

use anyhow::Result;
use macrosql_api::{failure_body, HttpResponse, ResourceHandler};
use macrosql_core::{Cancelled, QueryContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const BAD_REQUEST: u16 = 400;

#[derive(Debug, Deserialize)]
struct ServeRequest {
    #[serde(default)]
    id: Value,
    path: String,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Serialize)]
struct ServeResponse {
    id: Value,
    status: u16,
    body: Value,
}

/// Serve requests from `reader` until EOF; returns the writer once every
/// response has been written
pub async fn serve<R, W>(handler: Arc<ResourceHandler>, timeout: Duration, reader: R, writer: W) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<ServeResponse>();
    let writer_task = tokio::spawn(write_responses(rx, writer));

    let mut requests = JoinSet::new();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        reap_finished(&mut requests);

        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<ServeRequest>(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                let _ = tx.send(ServeResponse {
                    id: Value::Null,
                    status: BAD_REQUEST,
                    body: failure_body(e.to_string()),
                });
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        let tx = tx.clone();
        requests.spawn(async move {
            let response = handle_request(handler, timeout, request.path, request.body).await;
            let _ = tx.send(ServeResponse {
                id: request.id,
                status: response.status,
                body: response.body,
            });
        });
    }

    while let Some(joined) = requests.join_next().await {
        log_join(joined);
    }

    drop(tx);
    let writer = writer_task.await??;
    Ok(writer)
}

/// Drop the entries of requests that already answered; returns how many
fn reap_finished(requests: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = requests.try_join_next() {
        log_join(joined);
        reaped += 1;
    }
    reaped
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "request task failed");
    }
}

/// Run one request on the blocking pool, cancelling it after `timeout`
async fn handle_request(handler: Arc<ResourceHandler>, timeout: Duration, path: String, body: Value) -> HttpResponse {
    let ctx = QueryContext::new().with_timeout(timeout);
    let worker_ctx = ctx.clone();

    // Bodies may arrive either as an embedded object or as a JSON string.
    let body = match body {
        Value::String(raw) => raw.into_bytes(),
        other => other.to_string().into_bytes(),
    };

    let task = tokio::task::spawn_blocking(move || handler.handle(&path, &body, &worker_ctx));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "request worker failed");
            HttpResponse::ok(failure_body(macrosql_api::UNKNOWN_ERROR))
        }
        Err(_) => {
            ctx.cancel();
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "request timed out");
            HttpResponse::ok(failure_body(Cancelled::DeadlineExceeded.to_string()))
        }
    }
}

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<ServeResponse>, mut writer: W) -> std::io::Result<W>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(writer)
}
