//! Wire contracts shared by the pipeline driver, the module client, and the
//! per-run store.
//!
//! Every module service speaks the same envelope:
//!
//! ```json
//! {
//!   "meta":   { "moduleName": "…", "warnings": [] },
//!   "output": { …role-specific schema… },
//!   "debug":  { "llmConversation": { … } }
//! }
//! ```
//!
//! The `output` shapes are strict: unknown fields are rejected so that a
//! drifting module contract surfaces as a schema error instead of silently
//! coerced data. The `debug` block is opaque JSON and is surfaced verbatim.
//!
//! These structs are deliberately decoupled from any in-memory runtime
//! representation; they exist to serialize, validate, and round-trip.

pub mod diff;
pub mod events;
pub mod roles;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use diff::{CommittedDiff, DiffOperation, OpKind, OpScope, ProposedDiff};
pub use events::{EventType, PipelineEvent, PipelineStatus};
pub use roles::{
    ActionCandidate, ActionCandidates, ArbiterDecision, ArbiterVerdict, AssessmentStatus,
    ConsequenceTag, LoreEvidence, LoreRetrieval, LoremasterAssessment, LoremasterOutput,
    LoremasterPostOutput, NarrationOutput, PostStatus,
};

/// Per-turn invocation context forwarded to every module service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunContext {
    pub request_id: String,
    pub run_id: String,
    pub game_project_id: String,
    pub turn: i64,
    pub player_id: String,
    pub player_input: String,
}

/// The `meta` block of a module response. Validated as strictly as the
/// role `output`: an unexpected field is a schema error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ModuleMeta {
    pub module_name: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// The opaque `debug` block of a module response.
///
/// Modules own their own retries and fallbacks; whatever they report here
/// (including `usedFallback` markers inside the conversation trace) passes
/// through the router untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDebug {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_conversation: Option<Value>,
}

/// Full module response envelope for a role-specific `output` schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResponse<T> {
    pub meta: ModuleMeta,
    pub output: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<ModuleDebug>,
}

/// A seeded lore row, both as stored and as shipped to the retrieval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoreEntry {
    pub subject: String,
    pub data: String,
    pub source: String,
}

/// Deserialize an optional string treating `""` the same as an absent field.
///
/// The wire contract distinguishes absent from empty only at the parse
/// boundary; downstream code must never see an empty clarification question.
pub(crate) fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_context_uses_camel_case_keys() {
        let ctx = RunContext {
            request_id: "req-1".into(),
            run_id: "run-1".into(),
            game_project_id: "desert-crawler".into(),
            turn: 3,
            player_id: "entity.player.captain".into(),
            player_input: "Look around.".into(),
        };
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["requestId"], "req-1");
        assert_eq!(value["gameProjectId"], "desert-crawler");
        assert_eq!(value["playerInput"], "Look around.");
    }

    #[test]
    fn envelope_debug_block_is_optional_and_opaque() {
        let raw = json!({
            "meta": { "moduleName": "proser", "warnings": ["slow model"] },
            "output": { "narrationText": "Dust sweeps the deck." }
        });
        let resp: ModuleResponse<NarrationOutput> = serde_json::from_value(raw).unwrap();
        assert!(resp.debug.is_none());
        assert_eq!(resp.meta.warnings, vec!["slow model"]);

        let raw = json!({
            "meta": { "moduleName": "proser" },
            "output": { "narrationText": "x" },
            "debug": { "llmConversation": { "usedFallback": true } }
        });
        let resp: ModuleResponse<NarrationOutput> = serde_json::from_value(raw).unwrap();
        let conversation = resp.debug.unwrap().llm_conversation.unwrap();
        assert_eq!(conversation["usedFallback"], true);
    }

    #[test]
    fn unknown_meta_fields_are_rejected() {
        let raw = json!({
            "meta": { "moduleName": "proser", "warnings": [], "retries": 2 },
            "output": { "narrationText": "x" }
        });
        assert!(serde_json::from_value::<ModuleResponse<NarrationOutput>>(raw).is_err());
    }
}
