//! Game project manifest and session listing.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::instrument;

use taleloom::project::{GameProject, ProjectError};
use taleloom::store::RunStore;

use crate::error::ApiError;
use crate::state::AppState;

use super::new_request_id;

/// GET /game_projects/{id}
#[instrument(skip(state))]
async fn get_manifest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let project = GameProject::locate(&state.config.game_projects_root, &id).map_err(|err| {
        match err {
            ProjectError::NotFound { id } => ApiError::not_found(
                "GAME_PROJECT_NOT_FOUND",
                format!("game project not found: {id}"),
                &request_id,
            ),
            other => ApiError::internal("GAME_PROJECT_READ_FAILED", other.to_string(), &request_id),
        }
    })?;
    let manifest = project.manifest().map_err(|err| match err {
        ProjectError::Io(_) => ApiError::not_found(
            "GAME_PROJECT_NOT_FOUND",
            format!("game project has no readable manifest: {id}"),
            &request_id,
        ),
        other => ApiError::internal("GAME_PROJECT_READ_FAILED", other.to_string(), &request_id),
    })?;
    Ok(Json(manifest))
}

/// GET /game_projects/{id}/sessions
#[instrument(skip(state))]
async fn list_sessions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let sessions = RunStore::list_sessions(&state.config.game_projects_root, &id)
        .map_err(|err| ApiError::internal("SESSION_LIST_FAILED", err.to_string(), &request_id))?;
    Ok(Json(json!({ "gameProjectId": id, "sessions": sessions })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/game_projects/{id}", get(get_manifest))
        .route("/game_projects/{id}/sessions", get(list_sessions))
}
