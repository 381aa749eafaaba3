//! Process configuration and shared request state.

use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use taleloom::modules::{ModuleClient, Registry};
use taleloom::project::GameProject;

/// Environment-driven configuration, read once at process start.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub game_projects_root: PathBuf,
    pub default_game_project: String,
    /// Snapshot of the `MODULE_<ROLE>_URL` variables for registry lookups.
    pub module_env: FxHashMap<String, String>,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(3000);
        let game_projects_root = std::env::var("GAME_PROJECTS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./game_projects"));
        let default_game_project =
            std::env::var("GAME_PROJECT_ID").unwrap_or_else(|_| "default".to_string());
        Self {
            host,
            port,
            game_projects_root,
            default_game_project,
            module_env: Registry::env_snapshot(),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub module_client: Arc<ModuleClient>,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config: Arc::new(config),
            module_client: Arc::new(ModuleClient::from_env()),
        }
    }

    /// Build a registry for one game project: manifest bindings layered over
    /// the process env snapshot.
    pub fn registry_for(&self, game_project_id: &str) -> Registry {
        let bindings = GameProject::locate(&self.config.game_projects_root, game_project_id)
            .map(|project| project.module_bindings())
            .unwrap_or_default();
        Registry::new(bindings, self.config.module_env.clone())
    }
}
