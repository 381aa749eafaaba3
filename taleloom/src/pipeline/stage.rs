//! Stage identities and the fixed execution order.

use std::fmt;

use crate::modules::ModuleRole;

/// The eight pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    IntentExtractor,
    LoremasterRetrieve,
    LoremasterPre,
    DefaultSimulator,
    LoremasterPost,
    Arbiter,
    Proser,
    WorldStateUpdate,
}

/// Fixed stage order. The execution cursor indexes into this list.
pub const STAGES: [Stage; 8] = [
    Stage::IntentExtractor,
    Stage::LoremasterRetrieve,
    Stage::LoremasterPre,
    Stage::DefaultSimulator,
    Stage::LoremasterPost,
    Stage::Arbiter,
    Stage::Proser,
    Stage::WorldStateUpdate,
];

/// Stage label of the synthetic event recording the player's raw input.
/// Always step number 1, before any real stage runs.
pub const FRONTEND_INPUT_STAGE: &str = "frontend_input";

impl Stage {
    /// Persisted string form.
    pub fn encode(self) -> &'static str {
        match self {
            Stage::IntentExtractor => "intent_extractor",
            Stage::LoremasterRetrieve => "loremaster_retrieve",
            Stage::LoremasterPre => "loremaster_pre",
            Stage::DefaultSimulator => "default_simulator",
            Stage::LoremasterPost => "loremaster_post",
            Stage::Arbiter => "arbiter",
            Stage::Proser => "proser",
            Stage::WorldStateUpdate => "world_state_update",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        STAGES.into_iter().find(|stage| stage.encode() == s)
    }

    /// The stage at a given execution cursor.
    pub fn at_cursor(cursor: i64) -> Option<Self> {
        usize::try_from(cursor).ok().and_then(|i| STAGES.get(i).copied())
    }

    /// Whether a refusal skips this stage. The bookend stages always run.
    pub fn skipped_on_refusal(self) -> bool {
        matches!(
            self,
            Stage::DefaultSimulator | Stage::LoremasterPost | Stage::Arbiter | Stage::Proser
        )
    }

    /// Module role and endpoint path behind this stage, or `None` for the
    /// internal finalization stage.
    pub fn route(self) -> Option<(ModuleRole, &'static str)> {
        match self {
            Stage::IntentExtractor => Some((ModuleRole::IntentExtractor, "/invoke")),
            Stage::LoremasterRetrieve => Some((ModuleRole::Loremaster, "/retrieve")),
            Stage::LoremasterPre => Some((ModuleRole::Loremaster, "/pre")),
            Stage::DefaultSimulator => Some((ModuleRole::DefaultSimulator, "/invoke")),
            Stage::LoremasterPost => Some((ModuleRole::Loremaster, "/post")),
            Stage::Arbiter => Some((ModuleRole::Arbiter, "/invoke")),
            Stage::Proser => Some((ModuleRole::Proser, "/invoke")),
            Stage::WorldStateUpdate => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        let encoded: Vec<_> = STAGES.iter().map(|s| s.encode()).collect();
        assert_eq!(
            encoded,
            vec![
                "intent_extractor",
                "loremaster_retrieve",
                "loremaster_pre",
                "default_simulator",
                "loremaster_post",
                "arbiter",
                "proser",
                "world_state_update",
            ]
        );
    }

    #[test]
    fn encode_decode_round_trips() {
        for stage in STAGES {
            assert_eq!(Stage::decode(stage.encode()), Some(stage));
        }
        assert_eq!(Stage::decode(FRONTEND_INPUT_STAGE), None);
    }

    #[test]
    fn refusal_skips_exactly_the_simulation_stages() {
        let skipped: Vec<_> = STAGES
            .into_iter()
            .filter(|s| s.skipped_on_refusal())
            .collect();
        assert_eq!(
            skipped,
            vec![
                Stage::DefaultSimulator,
                Stage::LoremasterPost,
                Stage::Arbiter,
                Stage::Proser,
            ]
        );
    }

    #[test]
    fn only_world_state_update_is_internal() {
        for stage in STAGES {
            assert_eq!(stage.route().is_none(), stage == Stage::WorldStateUpdate);
        }
    }

    #[test]
    fn cursor_lookup_matches_order() {
        assert_eq!(Stage::at_cursor(0), Some(Stage::IntentExtractor));
        assert_eq!(Stage::at_cursor(7), Some(Stage::WorldStateUpdate));
        assert_eq!(Stage::at_cursor(8), None);
        assert_eq!(Stage::at_cursor(-1), None);
    }
}
