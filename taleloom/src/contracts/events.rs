//! Persisted event records: the append-only event kinds and the per-stage
//! pipeline event rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of an append-only `events` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PlayerInput,
    ModuleTrace,
    CommittedDiff,
}

impl EventType {
    pub fn encode(self) -> &'static str {
        match self {
            EventType::PlayerInput => "player_input",
            EventType::ModuleTrace => "module_trace",
            EventType::CommittedDiff => "committed_diff",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "player_input" => Some(EventType::PlayerInput),
            "module_trace" => Some(EventType::ModuleTrace),
            "committed_diff" => Some(EventType::CommittedDiff),
            _ => None,
        }
    }
}

/// Outcome of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Ok,
    Error,
    Skipped,
}

/// One durable pipeline step record.
///
/// Step numbers are strictly increasing and contiguous from 1 within a
/// `(runId, turn)` pair; skipped stages still occupy a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    pub run_id: String,
    pub turn: i64,
    pub step_number: i64,
    pub stage: String,
    pub endpoint: String,
    pub status: PipelineStatus,
    #[serde(default)]
    pub request: Value,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}
