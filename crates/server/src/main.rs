use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{stream, Stream, StreamExt};
use shared::{
    domain::RunId,
    error::{ApiError, ErrorCode},
    protocol::{AckResponse, CreateRunRequest, CreateRunResponse, UiResponse},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod runs;

use app_state::AppState;
use config::load_settings;
use runs::{RunStore, RunStoreError};

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let state = AppState {
        runs: RunStore::default(),
        runner: settings.runner(),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, ui_timeout_ms = settings.ui_timeout_ms, "run server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/runs", post(create_run))
        .route("/runs/:run_id/events", get(run_events))
        .route("/runs/:run_id/ui-response", post(ui_response))
        .route("/runs/:run_id/cancel", post(cancel_run))
        .with_state(state)
}

fn store_error(err: RunStoreError) -> (StatusCode, Json<ApiError>) {
    match err {
        RunStoreError::NotFound => (StatusCode::NOT_FOUND, Json(ApiError::run_not_found())),
        RunStoreError::StreamAttached => (
            StatusCode::CONFLICT,
            Json(ApiError::new(
                ErrorCode::Conflict,
                "event stream already attached",
            )),
        ),
        RunStoreError::NoPendingRequest => (
            StatusCode::CONFLICT,
            Json(ApiError::new(ErrorCode::Conflict, "no pending ui request")),
        ),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRunRequest>,
) -> Json<CreateRunResponse> {
    let run_id = state
        .runs
        .create(req.user_input, state.runner.clone())
        .await;
    Json(CreateRunResponse { run_id })
}

async fn run_events(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let run_id = RunId(run_id);
    let rx = state.runs.take_events(&run_id).await.map_err(store_error)?;
    info!(run_id = %run_id, "event stream attached");

    let connected = stream::once(async { Ok(Event::default().comment("connected")) });
    let events = UnboundedReceiverStream::new(rx)
        .map(|event| Event::default().event("message").json_data(&event));
    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}

async fn ui_response(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
    Json(body): Json<UiResponse>,
) -> ApiResult<Json<AckResponse>> {
    let run_id = RunId(run_id);
    state
        .runs
        .respond(&run_id, body)
        .await
        .map_err(|err| {
            warn!(run_id = %run_id, ?err, "ui response rejected");
            store_error(err)
        })?;
    Ok(Json(AckResponse { ok: true }))
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<AckResponse>> {
    state
        .runs
        .cancel(&RunId(run_id))
        .await
        .map_err(store_error)?;
    Ok(Json(AckResponse { ok: true }))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
