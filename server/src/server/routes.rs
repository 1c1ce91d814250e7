//! HTTP front end
//!
//! Every path is served by the command dispatcher; only `/health` is routed
//! separately. The query string picks the command.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics::counter;
use serde::Serialize;
use tracing::{Instrument, Span, error, info, info_span, warn};
use uuid::Uuid;

use super::dispatch::{Command, Dispatcher, Reply};
use super::worker::{Job, WorkerPool};

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub workers: Arc<dyn WorkerPool>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, workers: Arc<dyn WorkerPool>) -> Self {
        Self {
            dispatcher,
            workers,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(handle_command)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    slide_root: &'static str,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let root_ready = state.dispatcher.config().location.is_dir();
    let (status, slide_root, http_status) = if root_ready {
        ("healthy", "ready", StatusCode::OK)
    } else {
        ("degraded", "unavailable", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        http_status,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            slide_root,
        }),
    )
}

/// Entry point for every command request.
///
/// A request without a recognised `command` is never answered: the handler
/// parks until the client gives up and closes the connection.
pub async fn handle_command(
    State(state): State<AppState>,
    uri: Uri,
    query: Option<Query<HashMap<String, String>>>,
) -> Response {
    let params = query.map(|Query(params)| params).unwrap_or_default();
    let request_id = Uuid::new_v4();
    let span = info_span!("request", id = %request_id);

    async move {
        info!("{}", uri);

        let Some(command) = Command::parse(params.get("command").map(String::as_str)) else {
            warn!(
                "Unmapped command {:?}; leaving request {} unanswered",
                params.get("command"),
                request_id
            );
            counter!("slidetile_unmapped_commands_total").increment(1);
            return std::future::pending::<Response>().await;
        };

        let dispatcher = state.dispatcher.clone();
        let span = Span::current();
        let job: Job = Box::new(move || {
            let _entered = span.enter();
            dispatcher.dispatch(command, &params)
        });

        match state.workers.run(job).await {
            Ok(reply) => reply.into_response(),
            Err(e) => {
                error!("{} request {} failed: {}", command.as_str(), request_id, e);
                Reply::empty(StatusCode::BAD_REQUEST).into_response()
            }
        }
    }
    .instrument(span)
    .await
}
