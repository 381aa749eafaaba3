//! The per-turn accumulator carried across pipeline stages, and the
//! complete turn trace persisted as the `module_trace` event payload.
//!
//! A [`Checkpoint`] serializes into the `turn_execution` row after every
//! stage so that step-mode execution (and post-error resumption) can reload
//! it and continue from the stored cursor. Serialization must round-trip
//! exactly: the driver compares nothing against in-memory state, the row is
//! the truth.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::contracts::{
    ActionCandidates, ArbiterDecision, CommittedDiff, LoreRetrieval, LoremasterOutput,
    LoremasterPostOutput, ModuleDebug, ModuleMeta, PipelineEvent, ProposedDiff,
};

/// Accumulated stage outputs for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<ActionCandidates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lore_retrieval: Option<LoreRetrieval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loremaster_pre: Option<LoremasterOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposedDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lore_post: Option<LoremasterPostOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<CommittedDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arbiter_decision: Option<ArbiterDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_text: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Conversation traces keyed by stage name, surfaced verbatim.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub llm_conversations: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal_reason: Option<String>,
}

impl Checkpoint {
    /// Fold a module's meta warnings and conversation trace into the
    /// accumulator.
    pub fn absorb_module(&mut self, stage: &str, meta: &ModuleMeta, debug: Option<&ModuleDebug>) {
        self.warnings.extend(meta.warnings.iter().cloned());
        if let Some(conversation) = debug.and_then(|d| d.llm_conversation.clone()) {
            self.llm_conversations.insert(stage.to_string(), conversation);
        }
    }

    pub fn is_refused(&self) -> bool {
        self.refusal_reason.is_some()
    }
}

/// Loremaster sub-traces grouped as persisted in the turn trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoremasterTrace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<LoreRetrieval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre: Option<LoremasterOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<LoremasterPostOutput>,
}

/// Refusal record inside a turn trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefusalTrace {
    pub reason: String,
}

/// The complete, durable record of one committed turn.
///
/// References every pipeline event recorded for the turn, so a reader can
/// reconstruct the full module conversation from this payload alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnTrace {
    pub turn: i64,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<ActionCandidates>,
    #[serde(default)]
    pub loremaster: LoremasterTrace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ProposedDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arbiter: Option<ArbiterDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<CommittedDiff>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<RefusalTrace>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_text: Option<String>,
    pub pipeline_events: Vec<PipelineEvent>,
    #[serde(default)]
    pub llm_conversations: Map<String, Value>,
}

impl TurnTrace {
    /// Assemble the trace from a finished checkpoint and the turn's full
    /// pipeline event list.
    pub fn from_checkpoint(
        turn: i64,
        request_id: &str,
        checkpoint: &Checkpoint,
        pipeline_events: Vec<PipelineEvent>,
    ) -> Self {
        TurnTrace {
            turn,
            request_id: request_id.to_string(),
            intent: checkpoint.intent.clone(),
            loremaster: LoremasterTrace {
                retrieval: checkpoint.lore_retrieval.clone(),
                pre: checkpoint.loremaster_pre.clone(),
                post: checkpoint.lore_post.clone(),
            },
            proposal: checkpoint.proposal.clone(),
            arbiter: checkpoint.arbiter_decision.clone(),
            committed: checkpoint.committed.clone(),
            refusal: checkpoint
                .refusal_reason
                .clone()
                .map(|reason| RefusalTrace { reason }),
            warnings: checkpoint.warnings.clone(),
            narration_text: checkpoint.narration_text.clone(),
            pipeline_events,
            llm_conversations: checkpoint.llm_conversations.clone(),
        }
    }
}
