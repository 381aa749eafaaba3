//! Shared fixtures: stub module services and canonical outputs.
//!
//! Each stub role is a tiny axum router bound to an ephemeral localhost
//! port; tests wire the resulting URLs into a [`Registry`] through the
//! same env-map precedence the production code uses.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use rustc_hash::FxHashMap;
use serde_json::{json, Value};

use taleloom::contracts::LoreEntry;
use taleloom::modules::{ModuleRole, Registry};

/// Standard module response envelope.
pub fn envelope(module_name: &str, output: Value) -> Value {
    json!({
        "meta": { "moduleName": module_name, "warnings": [] },
        "output": output,
        "debug": { "llmConversation": { "moduleName": module_name, "turns": 1 } }
    })
}

/// Canonical intent output: a clean inspect action.
pub fn intent_inspect() -> Value {
    json!({
        "rawInput": "Look around.",
        "candidates": [{
            "actorId": "entity.player.captain",
            "intent": "inspect_environment",
            "confidence": 0.92,
            "params": {},
            "consequenceTags": []
        }]
    })
}

/// Intent output that must trigger the attack refusal.
pub fn intent_attack_without_target() -> Value {
    json!({
        "rawInput": "Attack.",
        "candidates": [{
            "actorId": "entity.player.captain",
            "intent": "attack",
            "confidence": 0.88,
            "params": {},
            "consequenceTags": ["no_target_in_scope"]
        }]
    })
}

pub fn retrieval_output() -> Value {
    json!({
        "query": "desert crawler surroundings",
        "evidence": [{
            "source": "lore/world.md",
            "excerpt": "The crawler crosses the glass dunes at dawn.",
            "score": 0.81
        }],
        "summary": "The run takes place aboard a desert crawler."
    })
}

pub fn pre_check_allowed() -> Value {
    json!({
        "assessments": [{
            "candidateIndex": 0,
            "status": "allowed",
            "consequenceTags": [],
            "rationale": "Surveying the surroundings is always possible."
        }],
        "summary": "No objections."
    })
}

pub fn canonical_proposal() -> Value {
    json!({
        "moduleName": "default_simulator",
        "operations": [{
            "op": "observation",
            "scope": "view:player",
            "payload": { "text": "You scan the desert." },
            "reason": "player surveyed the environment"
        }]
    })
}

pub fn post_check_consistent() -> Value {
    json!({
        "status": "consistent",
        "rationale": "Observation matches established lore.",
        "mustInclude": [],
        "mustAvoid": []
    })
}

pub fn arbiter_accept() -> Value {
    json!({
        "decision": "accept",
        "selectedProposal": canonical_proposal(),
        "rationale": "Single plausible proposal.",
        "rerunHints": [],
        "selectionMetadata": {}
    })
}

pub fn narration_output() -> Value {
    json!({
        "narrationText": "Dust sweeps across the crawler deck as you survey the dunes."
    })
}

/// Seed lore used by store-backed tests.
pub fn seed_lore() -> Vec<LoreEntry> {
    vec![
        LoreEntry {
            subject: "world_context".into(),
            data: "A desert world crossed by giant crawlers.".into(),
            source: "lore/world.md".into(),
        },
        LoreEntry {
            subject: "sandcrawler".into(),
            data: "A mobile fortress on treads.".into(),
            source: "lore/default_lore_entries.csv".into(),
        },
    ]
}

/// How the simulator stub behaves.
#[derive(Clone)]
pub enum SimulatorBehavior {
    Ok,
    /// Sleep long enough to outlast a short client timeout.
    Hang,
    /// Respond 500 on the first call, then succeed.
    FailOnce(Arc<AtomicUsize>),
}

/// Stub module fleet configuration.
#[derive(Clone)]
pub struct StubConfig {
    pub intent_output: Value,
    pub simulator: SimulatorBehavior,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            intent_output: intent_inspect(),
            simulator: SimulatorBehavior::Ok,
        }
    }
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{addr}")
}

/// Spin up all five module stubs and return a registry resolving to them.
pub async fn spawn_modules(config: StubConfig) -> Registry {
    let intent_output = config.intent_output.clone();
    let intent = Router::new().route(
        "/invoke",
        post(move || {
            let output = intent_output.clone();
            async move { Json(envelope("intent_extractor", output)) }
        }),
    );

    let loremaster = Router::new()
        .route(
            "/retrieve",
            post(|| async { Json(envelope("loremaster", retrieval_output())) }),
        )
        .route(
            "/pre",
            post(|| async { Json(envelope("loremaster", pre_check_allowed())) }),
        )
        .route(
            "/post",
            post(|| async { Json(envelope("loremaster", post_check_consistent())) }),
        );

    let simulator_behavior = config.simulator.clone();
    let simulator = Router::new().route(
        "/invoke",
        post(move || {
            let behavior = simulator_behavior.clone();
            async move {
                match behavior {
                    SimulatorBehavior::Ok => {
                        Json(envelope("default_simulator", canonical_proposal())).into_response()
                    }
                    SimulatorBehavior::Hang => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Json(envelope("default_simulator", canonical_proposal())).into_response()
                    }
                    SimulatorBehavior::FailOnce(calls) => {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            (
                                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                                "simulator crashed",
                            )
                                .into_response()
                        } else {
                            Json(envelope("default_simulator", canonical_proposal()))
                                .into_response()
                        }
                    }
                }
            }
        }),
    );

    let arbiter = Router::new().route(
        "/invoke",
        post(|| async { Json(envelope("arbiter", arbiter_accept())) }),
    );

    let proser = Router::new().route(
        "/invoke",
        post(|| async { Json(envelope("proser", narration_output())) }),
    );

    let mut env = FxHashMap::default();
    env.insert(
        ModuleRole::IntentExtractor.env_var().to_string(),
        serve(intent).await,
    );
    env.insert(
        ModuleRole::Loremaster.env_var().to_string(),
        serve(loremaster).await,
    );
    env.insert(
        ModuleRole::DefaultSimulator.env_var().to_string(),
        serve(simulator).await,
    );
    env.insert(ModuleRole::Arbiter.env_var().to_string(), serve(arbiter).await);
    env.insert(ModuleRole::Proser.env_var().to_string(), serve(proser).await);

    Registry::new(FxHashMap::default(), env)
}
