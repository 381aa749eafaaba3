//! Endpoint resolution for module roles.
//!
//! Resolution precedence, checked in order:
//!
//! 1. a manifest binding that is an absolute HTTP(S) URL,
//! 2. the role's `MODULE_<ROLE>_URL` environment variable,
//! 3. the role's fixed localhost default.
//!
//! The registry snapshots both inputs at construction, so `resolve` is pure
//! and deterministic for the lifetime of the value. Environment is read at
//! process start; nothing here consults `std::env` afterwards.

use rustc_hash::FxHashMap;
use serde_json::Value;

use super::role::ModuleRole;

/// Immutable `(role, binding) → endpoint URL` resolver.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    bindings: FxHashMap<ModuleRole, String>,
    env: FxHashMap<String, String>,
}

impl Registry {
    pub fn new(bindings: FxHashMap<ModuleRole, String>, env: FxHashMap<String, String>) -> Self {
        Self { bindings, env }
    }

    /// Snapshot the five role URL variables from the process environment.
    pub fn env_snapshot() -> FxHashMap<String, String> {
        let mut env = FxHashMap::default();
        for role in ModuleRole::ALL {
            if let Ok(value) = std::env::var(role.env_var()) {
                env.insert(role.env_var().to_string(), value);
            }
        }
        env
    }

    /// Extract role bindings from a game-project manifest.
    ///
    /// Bindings live under the manifest's `modules` key as
    /// `{"<role>": "<url>"}`. Unknown role keys are ignored; they belong to
    /// modules this router does not drive.
    pub fn bindings_from_manifest(manifest: &Value) -> FxHashMap<ModuleRole, String> {
        let mut bindings = FxHashMap::default();
        if let Some(modules) = manifest.get("modules").and_then(Value::as_object) {
            for (key, value) in modules {
                if let (Some(role), Some(url)) = (ModuleRole::decode(key), value.as_str()) {
                    bindings.insert(role, url.to_string());
                }
            }
        }
        bindings
    }

    /// Resolve the base URL for a role, without a trailing slash.
    pub fn resolve(&self, role: ModuleRole) -> String {
        if let Some(binding) = self.bindings.get(&role) {
            if is_absolute_http(binding) {
                return binding.trim_end_matches('/').to_string();
            }
        }
        if let Some(url) = self.env.get(role.env_var()) {
            if !url.is_empty() {
                return url.trim_end_matches('/').to_string();
            }
        }
        role.default_url().to_string()
    }
}

fn is_absolute_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env_with(role: ModuleRole, url: &str) -> FxHashMap<String, String> {
        let mut env = FxHashMap::default();
        env.insert(role.env_var().to_string(), url.to_string());
        env
    }

    #[test]
    fn absolute_manifest_binding_wins() {
        let manifest = json!({ "modules": { "arbiter": "http://arbiter.internal:9000/" } });
        let registry = Registry::new(
            Registry::bindings_from_manifest(&manifest),
            env_with(ModuleRole::Arbiter, "http://env-arbiter:9000"),
        );
        assert_eq!(
            registry.resolve(ModuleRole::Arbiter),
            "http://arbiter.internal:9000"
        );
    }

    #[test]
    fn relative_binding_falls_through_to_env() {
        let manifest = json!({ "modules": { "proser": "modules/proser" } });
        let registry = Registry::new(
            Registry::bindings_from_manifest(&manifest),
            env_with(ModuleRole::Proser, "http://env-proser:8200"),
        );
        assert_eq!(registry.resolve(ModuleRole::Proser), "http://env-proser:8200");
    }

    #[test]
    fn env_wins_over_default_when_no_binding() {
        let registry = Registry::new(
            FxHashMap::default(),
            env_with(ModuleRole::IntentExtractor, "http://intent:7000"),
        );
        assert_eq!(
            registry.resolve(ModuleRole::IntentExtractor),
            "http://intent:7000"
        );
    }

    #[test]
    fn empty_env_value_falls_through_to_default() {
        let registry = Registry::new(
            FxHashMap::default(),
            env_with(ModuleRole::Loremaster, ""),
        );
        assert_eq!(
            registry.resolve(ModuleRole::Loremaster),
            ModuleRole::Loremaster.default_url()
        );
    }

    #[test]
    fn default_applies_with_no_inputs_for_every_role() {
        let registry = Registry::default();
        for role in ModuleRole::ALL {
            assert_eq!(registry.resolve(role), role.default_url());
        }
    }

    #[test]
    fn unknown_manifest_module_keys_are_ignored() {
        let manifest = json!({ "modules": { "composer": "http://x:1", "arbiter": 42 } });
        assert!(Registry::bindings_from_manifest(&manifest).is_empty());
    }
}
