// SPDX-License-Identifier: MIT

//! HTTP front end
//!
//! Tasks run through the shared `Orchestrator`; generated files are served
//! from the output root under the asset URL prefix so the references written
//! into processed documents resolve.

use crate::adk::error::ForgeError;
use crate::forge::workflow::graph::GraphEvent;
use crate::forge::workflow::{Orchestrator, TaskOutcome};
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

#[derive(Debug, Deserialize)]
struct TaskRequest {
    query: String,
    #[serde(default)]
    document: Option<String>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    let layout = &orchestrator.config().layout;
    let assets = ServeDir::new(&layout.output_root);
    let prefix = layout.asset_url_prefix.clone();

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/stream", post(stream_task))
        .nest_service(&prefix, assets)
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(orchestrator: Arc<Orchestrator>, port: u16) -> Result<(), ForgeError> {
    let app = router(orchestrator);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Response body for a finished task
pub fn task_summary(outcome: &TaskOutcome) -> Value {
    let state = &outcome.state;
    json!({
        "status": "completed",
        "task_id": outcome.task_id,
        "root": outcome.root,
        "route": state.route,
        "score": state.score,
        "retry_count": state.retry_count,
        "file_path": state.file_path,
        "pdf_path": state.pdf_path,
        "markdown_path": state.markdown_path,
        "processed_markdown_path": state.processed_markdown_path,
        "media_assets": state.media_assets,
        "audio_path": state.audio_path,
        "markdown_content": state.markdown_content,
        "trace": outcome.trace,
    })
}

/// Response body for a failed task
pub fn task_failure(error: &ForgeError) -> Value {
    json!({
        "status": "failed",
        "stage": error.failed_stage(),
        "error": error.to_string(),
    })
}

async fn create_task(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(payload): Json<TaskRequest>,
) -> (StatusCode, Json<Value>) {
    let handle = orchestrator.submit(&payload.query, payload.document);
    log::info!("Accepted task {} for '{}'", handle.id(), payload.query);

    match handle.wait().await {
        Ok(outcome) => (StatusCode::OK, Json(task_summary(&outcome))),
        Err(e) => {
            log::error!("Task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(task_failure(&e)))
        }
    }
}

async fn stream_task(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(payload): Json<TaskRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Value>(100);

    tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel::<GraphEvent>(100);
        let handle = orchestrator.submit_with_events(&payload.query, payload.document, Some(event_tx));
        log::info!("Streaming task {} for '{}'", handle.id(), payload.query);

        let forward_tx = tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let value = match serde_json::to_value(&event) {
                    Ok(v) => v,
                    Err(e) => {
                        log::warn!("Dropping unserializable event: {}", e);
                        continue;
                    }
                };
                if forward_tx.send(value).await.is_err() {
                    break;
                }
            }
        });

        let result = handle.wait().await;
        let _ = forwarder.await;

        let message = match result {
            Ok(outcome) => json!({ "event": "completed", "task": task_summary(&outcome) }),
            Err(e) => {
                log::error!("Streaming task failed: {}", e);
                json!({ "event": "failed", "task": task_failure(&e) })
            }
        };
        let _ = tx.send(message).await;
    });

    let stream = ReceiverStream::new(rx).map(|value| Ok(Event::default().data(value.to_string())));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}
