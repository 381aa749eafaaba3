//! The module client: a narrow typed RPC over HTTP POST.
//!
//! The client posts JSON, enforces a per-request timeout, reads the body,
//! and strictly validates the envelope against the role's schema. It never
//! retries; modules own their own retry and fallback behavior and report it
//! through their `debug` block.

use std::time::Duration;

use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::contracts::ModuleResponse;

use super::role::ModuleRole;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

const BODY_SNIPPET_LEN: usize = 256;

/// Errors from one module invocation. Each is fatal to the current stage.
#[derive(Debug, Error, Diagnostic)]
pub enum ModuleError {
    #[error("network error calling {role}: {message}")]
    #[diagnostic(
        code(taleloom::module::network),
        help("Check that the module service is running and the resolved URL is reachable.")
    )]
    Network { role: ModuleRole, message: String },

    #[error("{role} did not respond within {timeout_ms} ms")]
    #[diagnostic(
        code(taleloom::module::timeout),
        help("Raise MODULE_REQUEST_TIMEOUT_MS or investigate the module service.")
    )]
    Timeout { role: ModuleRole, timeout_ms: u64 },

    #[error("{role} returned HTTP {status}: {body_snippet}")]
    #[diagnostic(code(taleloom::module::http))]
    Http {
        role: ModuleRole,
        status: u16,
        body_snippet: String,
    },

    #[error("{role} response failed schema validation: {issue}")]
    #[diagnostic(
        code(taleloom::module::schema),
        help("The module's output no longer matches its contracted shape.")
    )]
    Schema { role: ModuleRole, issue: String },
}

/// Typed HTTP invoker shared across requests.
#[derive(Debug, Clone)]
pub struct ModuleClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl ModuleClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    /// Build a client with the timeout from `MODULE_REQUEST_TIMEOUT_MS`,
    /// falling back to the default on absence or unparsable values.
    pub fn from_env() -> Self {
        let timeout_ms = std::env::var("MODULE_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self::new(Duration::from_millis(timeout_ms))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `request` to `url` and parse the response envelope for `role`.
    #[instrument(skip(self, request), err)]
    pub async fn invoke<T>(
        &self,
        role: ModuleRole,
        url: &str,
        request: &Value,
    ) -> Result<ModuleResponse<T>, ModuleError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| self.transport_error(role, &err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(role, &err))?;

        if !status.is_success() {
            return Err(ModuleError::Http {
                role,
                status: status.as_u16(),
                body_snippet: snippet(&body),
            });
        }

        serde_json::from_str::<ModuleResponse<T>>(&body).map_err(|err| ModuleError::Schema {
            role,
            issue: err.to_string(),
        })
    }

    fn transport_error(&self, role: ModuleRole, err: &reqwest::Error) -> ModuleError {
        if err.is_timeout() {
            ModuleError::Timeout {
                role,
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ModuleError::Network {
                role,
                message: err.to_string(),
            }
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}
