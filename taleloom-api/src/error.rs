//! API error envelope.
//!
//! All errors serialize as `{"error": {code, message, requestId, details?}}`
//! with an HTTP status matching the error class.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use taleloom::pipeline::PipelineError;
use taleloom::store::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub request_id: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        request_id: &str,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: request_id.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message, request_id)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message, request_id)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::CONFLICT, code, message, request_id)
    }

    pub fn internal(code: &'static str, message: impl Into<String>, request_id: &str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message, request_id)
    }

    /// Map core store errors onto the wire taxonomy.
    pub fn from_store(err: StoreError, request_id: &str) -> Self {
        match err {
            StoreError::RunNotFound { run_id } => Self::not_found(
                "RUN_NOT_FOUND",
                format!("run not found: {run_id}"),
                request_id,
            ),
            StoreError::ExecutionAlreadyExists { turn } => Self::conflict(
                "STEP_EXECUTION_CONFLICT",
                format!("an execution already exists for turn {turn}"),
                request_id,
            )
            .with_details(json!({ "activeTurn": turn })),
            StoreError::ActiveExecutionConflict { active_turn } => Self::conflict(
                "STEP_EXECUTION_CONFLICT",
                format!("an execution is still running for turn {active_turn}"),
                request_id,
            )
            .with_details(json!({ "activeTurn": active_turn })),
            StoreError::ExecutionNotFound { turn } => Self::not_found(
                "STEP_EXECUTION_NOT_FOUND",
                format!("no step execution for turn {turn}"),
                request_id,
            ),
            other => Self::internal("STORE_FAILURE", other.to_string(), request_id),
        }
    }

    /// Map pipeline errors onto the wire taxonomy.
    pub fn from_pipeline(err: PipelineError, request_id: &str) -> Self {
        match err {
            PipelineError::Store(store_err) => Self::from_store(store_err, request_id),
            PipelineError::Stage { stage, source } => Self::internal(
                "TURN_PROCESSING_FAILED",
                source.to_string(),
                request_id,
            )
            .with_details(json!({ "stage": stage })),
            other @ PipelineError::MissingCommit { .. } => {
                Self::internal("TURN_PROCESSING_FAILED", other.to_string(), request_id)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
            "requestId": self.request_id,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}
