//! Run lifecycle and inspection routes.

use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use taleloom::project::GameProject;
use taleloom::store::{RunLocation, RunStore};

use crate::error::ApiError;
use crate::state::AppState;

use super::new_request_id;

pub(crate) fn resolve_run(
    state: &AppState,
    run_id: &str,
    request_id: &str,
) -> Result<RunLocation, ApiError> {
    RunStore::resolve_run_location(&state.config.game_projects_root, run_id)
        .map_err(|err| ApiError::from_store(err, request_id))?
        .ok_or_else(|| {
            ApiError::not_found("RUN_NOT_FOUND", format!("run not found: {run_id}"), request_id)
        })
}

pub(crate) async fn open_run(
    state: &AppState,
    location: &RunLocation,
    run_id: &str,
    request_id: &str,
) -> Result<RunStore, ApiError> {
    RunStore::open(
        &state.config.game_projects_root,
        &location.game_project_id,
        run_id,
    )
    .await
    .map_err(|err| ApiError::from_store(err, request_id))
}

/// POST /run/start
#[instrument(skip(state))]
async fn start_run(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let fail =
        |message: String| ApiError::internal("RUN_START_FAILED", message, &request_id);

    let project = GameProject::locate(
        &state.config.game_projects_root,
        &state.config.default_game_project,
    )
    .map_err(|err| fail(err.to_string()))?;
    let manifest = project.manifest().map_err(|err| fail(err.to_string()))?;

    let run_id = Uuid::new_v4().to_string();
    let store = RunStore::initialize(
        &state.config.game_projects_root,
        project.id(),
        &run_id,
        &project.lore_seed(),
    )
    .await
    .map_err(|err| fail(err.to_string()))?;
    store.close().await;

    tracing::info!(run_id = %run_id, game_project_id = %project.id(), "run started");
    Ok(Json(json!({ "runId": run_id, "gameProject": manifest })))
}

/// GET /run/{run_id}/state
#[instrument(skip(state))]
async fn get_state(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let location = resolve_run(&state, &run_id, &request_id)?;
    let store = open_run(&state, &location, &run_id, &request_id).await?;

    let view = store.read_session_state().await;
    store.close().await;
    let view = view.map_err(|err| ApiError::from_store(err, &request_id))?;

    Ok(Json(json!({
        "runId": run_id,
        "gameProjectId": location.game_project_id,
        "messages": view.messages,
        "debugEntries": view.debug_entries,
        "nextTurn": view.next_turn,
    })))
}

/// GET /run/{run_id}/turn/{turn}/pipeline
#[instrument(skip(state))]
async fn get_pipeline(
    State(state): State<AppState>,
    Path((run_id, turn)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let turn: i64 = turn.parse().map_err(|_| {
        ApiError::bad_request("INVALID_TURN_INDEX", "turn must be an integer", &request_id)
    })?;
    if turn < 1 {
        return Err(ApiError::bad_request(
            "INVALID_TURN_INDEX",
            "turn must be >= 1",
            &request_id,
        ));
    }

    let location = resolve_run(&state, &run_id, &request_id)?;
    let store = open_run(&state, &location, &run_id, &request_id).await?;

    let execution = store.get_turn_execution(turn).await;
    let events = store.list_pipeline_events(turn).await;
    store.close().await;

    let execution = execution.map_err(|err| ApiError::from_store(err, &request_id))?;
    let events = events.map_err(|err| ApiError::from_store(err, &request_id))?;

    Ok(Json(json!({
        "runId": run_id,
        "turn": turn,
        "execution": execution,
        "events": events,
    })))
}

/// POST /run/{run_id}/open-saved-folder
#[instrument(skip(state))]
async fn open_saved_folder(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let location = resolve_run(&state, &run_id, &request_id)?;
    let folder = location
        .db_path
        .parent()
        .map(FsPath::to_path_buf)
        .unwrap_or(location.db_path.clone());

    spawn_opener(&folder);

    Ok(Json(json!({
        "ok": true,
        "runId": run_id,
        "openedPath": folder.display().to_string(),
    })))
}

/// Best-effort platform opener; the path is returned regardless.
fn spawn_opener(path: &FsPath) {
    #[cfg(target_os = "macos")]
    const OPENER: &str = "open";
    #[cfg(not(target_os = "macos"))]
    const OPENER: &str = "xdg-open";

    if let Err(err) = std::process::Command::new(OPENER).arg(path).spawn() {
        tracing::debug!(path = %path.display(), error = %err, "could not spawn folder opener");
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/run/start", post(start_run))
        .route("/run/{run_id}/state", get(get_state))
        .route("/run/{run_id}/turn/{turn}/pipeline", get(get_pipeline))
        .route("/run/{run_id}/open-saved-folder", post(open_saved_folder))
}
