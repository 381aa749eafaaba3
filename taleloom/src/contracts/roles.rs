//! Role-specific module output schemas.
//!
//! One struct per module role, matching the documented contract exactly.
//! All of these are `deny_unknown_fields`: a module that grows its output
//! shape must version the router contract, not lean on silent tolerance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::diff::ProposedDiff;
use super::empty_string_as_none;

/// Consequence tags a candidate action or assessment may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsequenceTag {
    NeedsClarification,
    NoTargetInScope,
    PartialSuccessOnly,
    HighRiskExposure,
    ResourceCostApplies,
    SocialBacklash,
    NoiseGenerated,
}

/// One interpreted action candidate from the intent extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionCandidate {
    pub actor_id: String,
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub consequence_tags: Vec<ConsequenceTag>,
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub clarification_question: Option<String>,
}

/// Output of `intent_extractor:/invoke`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ActionCandidates {
    pub raw_input: String,
    pub candidates: Vec<ActionCandidate>,
}

/// One piece of retrieved evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoreEvidence {
    pub source: String,
    pub excerpt: String,
    pub score: f64,
}

/// Output of `loremaster:/retrieve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoreRetrieval {
    pub query: String,
    #[serde(default)]
    pub evidence: Vec<LoreEvidence>,
    pub summary: String,
}

/// Plausibility verdict for a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Allowed,
    AllowedWithConsequences,
    NeedsClarification,
}

/// Per-candidate assessment from the pre-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoremasterAssessment {
    pub candidate_index: usize,
    pub status: AssessmentStatus,
    #[serde(default)]
    pub consequence_tags: Vec<ConsequenceTag>,
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub clarification_question: Option<String>,
    pub rationale: String,
}

/// Output of `loremaster:/pre`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoremasterOutput {
    pub assessments: Vec<LoremasterAssessment>,
    pub summary: String,
}

/// Consistency verdict from the post-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Consistent,
    NeedsAdjustment,
}

/// Output of `loremaster:/post`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoremasterPostOutput {
    pub status: PostStatus,
    pub rationale: String,
    #[serde(default)]
    pub must_include: Vec<String>,
    #[serde(default)]
    pub must_avoid: Vec<String>,
}

/// Arbiter verdict over the proposed diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterVerdict {
    Accept,
    RequestRerun,
    ChooseAlternative,
}

/// Output of `arbiter:/invoke`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ArbiterDecision {
    pub decision: ArbiterVerdict,
    pub selected_proposal: ProposedDiff,
    pub rationale: String,
    #[serde(default)]
    pub rerun_hints: Vec<String>,
    #[serde(default)]
    pub selection_metadata: Map<String, Value>,
}

/// Output of `proser:/invoke`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NarrationOutput {
    pub narration_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_clarification_question_parses_as_absent() {
        let raw = json!({
            "actorId": "entity.player.captain",
            "intent": "attack",
            "confidence": 0.8,
            "clarificationQuestion": ""
        });
        let candidate: ActionCandidate = serde_json::from_value(raw).unwrap();
        assert_eq!(candidate.clarification_question, None);

        let raw = json!({
            "actorId": "entity.player.captain",
            "intent": "attack",
            "confidence": 0.8,
            "clarificationQuestion": "Attack what?"
        });
        let candidate: ActionCandidate = serde_json::from_value(raw).unwrap();
        assert_eq!(candidate.clarification_question.as_deref(), Some("Attack what?"));
    }

    #[test]
    fn unknown_output_fields_are_rejected() {
        let raw = json!({
            "rawInput": "Look around.",
            "candidates": [],
            "surprise": true
        });
        assert!(serde_json::from_value::<ActionCandidates>(raw).is_err());
    }

    #[test]
    fn consequence_tags_round_trip_snake_case() {
        let tags = vec![
            ConsequenceTag::NoTargetInScope,
            ConsequenceTag::NeedsClarification,
        ];
        let value = serde_json::to_value(&tags).unwrap();
        assert_eq!(value, json!(["no_target_in_scope", "needs_clarification"]));
        let back: Vec<ConsequenceTag> = serde_json::from_value(value).unwrap();
        assert_eq!(back, tags);
    }

    #[test]
    fn arbiter_decision_defaults_optional_collections() {
        let raw = json!({
            "decision": "accept",
            "selectedProposal": { "moduleName": "default_simulator", "operations": [] },
            "rationale": "only proposal"
        });
        let decision: ArbiterDecision = serde_json::from_value(raw).unwrap();
        assert_eq!(decision.decision, ArbiterVerdict::Accept);
        assert!(decision.rerun_hints.is_empty());
        assert!(decision.selection_metadata.is_empty());
    }
}
