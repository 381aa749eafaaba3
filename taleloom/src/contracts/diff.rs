//! Proposed and committed world-state diffs.
//!
//! A diff is a list of scoped operations. Facts written with `world` scope
//! never leak into the player view unless an explicit `observation` or
//! `detection` operation in the same diff surfaces them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operation kind within a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    UpsertFact,
    RemoveFact,
    UpsertEntity,
    Observation,
    Detection,
}

/// Visibility scope of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpScope {
    #[serde(rename = "world")]
    World,
    #[serde(rename = "view:player")]
    ViewPlayer,
}

/// One scoped state operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DiffOperation {
    pub op: OpKind,
    pub scope: OpScope,
    #[serde(default)]
    pub payload: Value,
    pub reason: String,
}

/// A module's proposed diff, pre-arbitration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProposedDiff {
    pub module_name: String,
    pub operations: Vec<DiffOperation>,
}

/// The diff committed for a turn, post-arbitration (or synthesized on
/// refusal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedDiff {
    pub turn: i64,
    pub operations: Vec<DiffOperation>,
    pub summary: String,
}

impl DiffOperation {
    /// True for a player-scoped observation carrying visible text.
    pub fn is_player_observation(&self) -> bool {
        matches!(self.op, OpKind::Observation) && matches!(self.scope, OpScope::ViewPlayer)
    }
}
