//! Turn submission: the single-call pipeline and the step-mode endpoints.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::instrument;

use taleloom::contracts::RunContext;
use taleloom::pipeline::PipelineDriver;
use taleloom::store::RunStore;

use crate::error::ApiError;
use crate::state::AppState;

use super::new_request_id;
use super::run::{open_run, resolve_run};

fn required_str(body: &Value, key: &str, request_id: &str) -> Result<String, ApiError> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::bad_request(
                "BAD_TURN_REQUEST",
                format!("missing or empty field: {key}"),
                request_id,
            )
        })
}

fn required_turn(body: &Value, request_id: &str) -> Result<i64, ApiError> {
    let raw = body.get("turn").ok_or_else(|| {
        ApiError::bad_request("BAD_TURN_REQUEST", "missing field: turn", request_id)
    })?;
    let turn = raw.as_i64().ok_or_else(|| {
        ApiError::bad_request("INVALID_TURN_INDEX", "turn must be an integer", request_id)
    })?;
    if turn < 1 {
        return Err(ApiError::bad_request(
            "INVALID_TURN_INDEX",
            "turn must be >= 1",
            request_id,
        ));
    }
    Ok(turn)
}

/// A new player input is accepted only for the turn right after the latest
/// snapshot.
async fn check_sequencing(store: &RunStore, turn: i64, request_id: &str) -> Result<(), ApiError> {
    let expected = store
        .next_turn()
        .await
        .map_err(|err| ApiError::from_store(err, request_id))?;
    if turn != expected {
        return Err(ApiError::conflict(
            "TURN_SEQUENCE_CONFLICT",
            format!("expected turn {expected}, received {turn}"),
            request_id,
        )
        .with_details(json!({ "expectedTurn": expected, "receivedTurn": turn })));
    }
    Ok(())
}

/// POST /turn
#[instrument(skip(state, body))]
async fn process_turn(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let run_id = required_str(&body, "runId", &request_id)?;
    let turn = required_turn(&body, &request_id)?;
    let player_input = required_str(&body, "playerInput", &request_id)?;
    let player_id = required_str(&body, "playerId", &request_id)?;

    let location = resolve_run(&state, &run_id, &request_id)?;
    let store = open_run(&state, &location, &run_id, &request_id).await?;

    let result = async {
        check_sequencing(&store, turn, &request_id).await?;
        let ctx = RunContext {
            request_id: request_id.clone(),
            run_id: run_id.clone(),
            game_project_id: location.game_project_id.clone(),
            turn,
            player_id,
            player_input,
        };
        let registry = state.registry_for(&location.game_project_id);
        let driver = PipelineDriver::new(&store, &state.module_client, &registry);
        let trace = driver
            .process_turn(&ctx)
            .await
            .map_err(|err| ApiError::from_pipeline(err, &request_id))?;
        serde_json::to_value(trace).map_err(|err| {
            ApiError::internal("TURN_PROCESSING_FAILED", err.to_string(), &request_id)
        })
    }
    .await;

    store.close().await;
    result.map(Json)
}

/// POST /turn/step/start
#[instrument(skip(state, body))]
async fn step_start(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let run_id = required_str(&body, "runId", &request_id)?;
    let turn = required_turn(&body, &request_id)?;
    let player_input = required_str(&body, "playerInput", &request_id)?;
    let player_id = required_str(&body, "playerId", &request_id)?;

    let location = resolve_run(&state, &run_id, &request_id)?;
    let store = open_run(&state, &location, &run_id, &request_id).await?;

    let result = async {
        // The live-execution check comes first: a paused step run blocks any
        // new execution regardless of the requested index.
        if let Some(active) = store
            .active_execution()
            .await
            .map_err(|err| ApiError::from_store(err, &request_id))?
        {
            return Err(ApiError::conflict(
                "STEP_EXECUTION_CONFLICT",
                format!("an execution is still running for turn {}", active.turn),
                &request_id,
            )
            .with_details(json!({ "activeTurn": active.turn })));
        }
        check_sequencing(&store, turn, &request_id).await?;

        let ctx = RunContext {
            request_id: request_id.clone(),
            run_id: run_id.clone(),
            game_project_id: location.game_project_id.clone(),
            turn,
            player_id,
            player_input,
        };
        let registry = state.registry_for(&location.game_project_id);
        let driver = PipelineDriver::new(&store, &state.module_client, &registry);
        let view = driver
            .start_step_execution(&ctx)
            .await
            .map_err(|err| ApiError::from_pipeline(err, &request_id))?;
        Ok(json!({
            "runId": run_id,
            "turn": turn,
            "execution": view.execution,
            "pipelineEvents": view.pipeline_events,
        }))
    }
    .await;

    store.close().await;
    result.map(Json)
}

/// POST /turn/step/next
#[instrument(skip(state, body))]
async fn step_next(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request_id = new_request_id();
    let run_id = required_str(&body, "runId", &request_id)?;
    let turn = required_turn(&body, &request_id)?;

    let location = resolve_run(&state, &run_id, &request_id)?;
    let store = open_run(&state, &location, &run_id, &request_id).await?;

    let result = async {
        let registry = state.registry_for(&location.game_project_id);
        let driver = PipelineDriver::new(&store, &state.module_client, &registry);
        let view = driver
            .advance_step_execution(turn)
            .await
            .map_err(|err| ApiError::from_pipeline(err, &request_id))?;
        Ok(json!({
            "runId": run_id,
            "turn": turn,
            "execution": view.execution,
            "pipelineEvents": view.pipeline_events,
            "result": view.result,
        }))
    }
    .await;

    store.close().await;
    result.map(Json)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/turn", post(process_turn))
        .route("/turn/step/start", post(step_start))
        .route("/turn/step/next", post(step_next))
}
