//! Module role identities.
//!
//! A role names a service the router talks to, not a pipeline stage: the
//! loremaster role backs three stages through three endpoints.

use std::fmt;

/// The five module service roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleRole {
    IntentExtractor,
    Loremaster,
    DefaultSimulator,
    Arbiter,
    Proser,
}

impl ModuleRole {
    pub const ALL: [ModuleRole; 5] = [
        ModuleRole::IntentExtractor,
        ModuleRole::Loremaster,
        ModuleRole::DefaultSimulator,
        ModuleRole::Arbiter,
        ModuleRole::Proser,
    ];

    /// Stable key used in manifests and logs.
    pub fn key(self) -> &'static str {
        match self {
            ModuleRole::IntentExtractor => "intent_extractor",
            ModuleRole::Loremaster => "loremaster",
            ModuleRole::DefaultSimulator => "default_simulator",
            ModuleRole::Arbiter => "arbiter",
            ModuleRole::Proser => "proser",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.key() == s)
    }

    /// Environment variable consulted when no manifest binding applies.
    pub fn env_var(self) -> &'static str {
        match self {
            ModuleRole::IntentExtractor => "MODULE_INTENT_URL",
            ModuleRole::Loremaster => "MODULE_LOREMASTER_URL",
            ModuleRole::DefaultSimulator => "MODULE_DEFAULT_SIMULATOR_URL",
            ModuleRole::Arbiter => "MODULE_ARBITER_URL",
            ModuleRole::Proser => "MODULE_PROSER_URL",
        }
    }

    /// Fixed localhost default, last in the resolution order.
    pub fn default_url(self) -> &'static str {
        match self {
            ModuleRole::IntentExtractor => "http://127.0.0.1:8101",
            ModuleRole::Loremaster => "http://127.0.0.1:8102",
            ModuleRole::DefaultSimulator => "http://127.0.0.1:8103",
            ModuleRole::Arbiter => "http://127.0.0.1:8104",
            ModuleRole::Proser => "http://127.0.0.1:8105",
        }
    }
}

impl fmt::Display for ModuleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip() {
        for role in ModuleRole::ALL {
            assert_eq!(ModuleRole::decode(role.key()), Some(role));
        }
        assert_eq!(ModuleRole::decode("frontend"), None);
    }

    #[test]
    fn defaults_are_distinct() {
        let mut urls: Vec<_> = ModuleRole::ALL.iter().map(|r| r.default_url()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), ModuleRole::ALL.len());
    }
}
