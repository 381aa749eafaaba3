//! Deterministic refusal decisions.
//!
//! Computed twice per turn: after intent extraction and again after the
//! loremaster pre-check. A set refusal reason gates the four simulation
//! stages and becomes the player-visible narration verbatim.

use crate::contracts::{ActionCandidates, ConsequenceTag, LoremasterOutput};

/// Refusal reason derived from intent candidates, if any.
///
/// `no_target_in_scope` outranks `needs_clarification`: an unresolvable
/// target is a harder failure than an ambiguous one.
pub fn from_intent(intent: &ActionCandidates) -> Option<String> {
    if let Some(candidate) = intent
        .candidates
        .iter()
        .find(|c| c.consequence_tags.contains(&ConsequenceTag::NoTargetInScope))
    {
        if candidate.intent == "attack" {
            return Some("Refused: no valid attack target is currently in scope.".to_string());
        }
        return Some(format!(
            "Refused: no valid target is in scope for {}.",
            humanize_intent(&candidate.intent)
        ));
    }

    if intent
        .candidates
        .iter()
        .any(|c| c.consequence_tags.contains(&ConsequenceTag::NeedsClarification))
    {
        return Some("Refused: action is ambiguous and cannot be safely resolved.".to_string());
    }

    None
}

/// Refusal reason derived from the pre-check, if any.
///
/// The first assessment bearing `no_target_in_scope` contributes its own
/// rationale; callers let it override an intent-derived reason only when it
/// is actually set.
pub fn from_pre_check(pre: &LoremasterOutput) -> Option<String> {
    pre.assessments
        .iter()
        .find(|a| a.consequence_tags.contains(&ConsequenceTag::NoTargetInScope))
        .map(|a| format!("Refused: {}", a.rationale))
}

fn humanize_intent(intent: &str) -> String {
    intent.replace('_', " ")
}
