//! Shared fixtures for API tests: a temp game project on disk, a stub
//! module fleet bound to ephemeral ports, and oneshot request helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use taleloom::modules::ModuleClient;
use taleloom_api::{ApiConfig, AppState};

pub const PROJECT: &str = "desert-crawler";
pub const PLAYER: &str = "entity.player.captain";

pub fn envelope(module_name: &str, output: Value) -> Value {
    json!({
        "meta": { "moduleName": module_name, "warnings": [] },
        "output": output,
        "debug": { "llmConversation": { "moduleName": module_name, "turns": 1 } }
    })
}

pub fn intent_inspect() -> Value {
    json!({
        "rawInput": "Look around.",
        "candidates": [{
            "actorId": PLAYER,
            "intent": "inspect_environment",
            "confidence": 0.92,
            "params": {},
            "consequenceTags": []
        }]
    })
}

pub fn intent_attack_without_target() -> Value {
    json!({
        "rawInput": "Attack.",
        "candidates": [{
            "actorId": PLAYER,
            "intent": "attack",
            "confidence": 0.88,
            "params": {},
            "consequenceTags": ["no_target_in_scope"]
        }]
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

/// How the stub fleet behaves.
#[derive(Clone)]
pub struct StubConfig {
    pub intent_output: Value,
    pub simulator_hangs: bool,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            intent_output: intent_inspect(),
            simulator_hangs: false,
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

/// Start the five module stubs; returns manifest `modules` bindings.
pub async fn spawn_module_fleet(config: StubConfig) -> Value {
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
            post(|| async {
                Json(envelope(
                    "loremaster",
                    json!({
                        "query": "desert crawler surroundings",
                        "evidence": [],
                        "summary": "The run takes place aboard a desert crawler."
                    }),
                ))
            }),
        )
        .route(
            "/pre",
            post(|| async {
                Json(envelope(
                    "loremaster",
                    json!({
                        "assessments": [{
                            "candidateIndex": 0,
                            "status": "allowed",
                            "consequenceTags": [],
                            "rationale": "Surveying is always possible."
                        }],
                        "summary": "No objections."
                    }),
                ))
            }),
        )
        .route(
            "/post",
            post(|| async {
                Json(envelope(
                    "loremaster",
                    json!({
                        "status": "consistent",
                        "rationale": "Observation matches lore.",
                        "mustInclude": [],
                        "mustAvoid": []
                    }),
                ))
            }),
        );

    let hangs = config.simulator_hangs;
    let simulator = Router::new().route(
        "/invoke",
        post(move || async move {
            if hangs {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Json(envelope("default_simulator", canonical_proposal())).into_response()
        }),
    );

    let arbiter = Router::new().route(
        "/invoke",
        post(|| async {
            Json(envelope(
                "arbiter",
                json!({
                    "decision": "accept",
                    "selectedProposal": canonical_proposal(),
                    "rationale": "Single plausible proposal.",
                    "rerunHints": [],
                    "selectionMetadata": {}
                }),
            ))
        }),
    );

    let proser = Router::new().route(
        "/invoke",
        post(|| async {
            Json(envelope(
                "proser",
                json!({
                    "narrationText": "Dust sweeps across the crawler deck as you survey the dunes."
                }),
            ))
        }),
    );

    json!({
        "intent_extractor": serve(intent).await,
        "loremaster": serve(loremaster).await,
        "default_simulator": serve(simulator).await,
        "arbiter": serve(arbiter).await,
        "proser": serve(proser).await,
    })
}

/// Write a game project directory: manifest with module bindings plus the
/// lore seed files.
pub fn write_game_project(root: &TempDir, module_bindings: &Value) {
    let dir = root.path().join(PROJECT);
    std::fs::create_dir_all(dir.join("lore")).unwrap();
    let manifest = json!({
        "id": PROJECT,
        "title": "Desert Crawler",
        "modules": module_bindings,
    });
    std::fs::write(
        dir.join("manifest.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("lore/world.md"),
        "A desert world crossed by giant crawlers.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("lore/default_lore_entries.csv"),
        "subject,data\nsandcrawler,A mobile fortress on treads.\n",
    )
    .unwrap();
}

/// App state over a temp root, with a configurable module client timeout.
pub fn app_state(root: &TempDir, timeout: Duration) -> AppState {
    AppState {
        config: Arc::new(ApiConfig {
            host: "127.0.0.1".into(),
            port: 0,
            game_projects_root: root.path().to_path_buf(),
            default_game_project: PROJECT.into(),
            module_env: FxHashMap::default(),
        }),
        module_client: Arc::new(ModuleClient::new(timeout)),
    }
}

/// Full test harness: project on disk + stub fleet + router.
pub async fn harness(config: StubConfig, timeout: Duration) -> (TempDir, Router) {
    let root = TempDir::new().unwrap();
    let bindings = spawn_module_fleet(config).await;
    write_game_project(&root, &bindings);
    let app = taleloom_api::app(app_state(&root, timeout));
    (root, app)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

/// Start a run through the API and return its id.
pub async fn start_run(app: &Router) -> String {
    let (status, body) = post_json(app, "/run/start", json!({})).await;
    assert_eq!(status, StatusCode::OK, "run start failed: {body}");
    body["runId"].as_str().unwrap().to_string()
}

/// Submit a full turn and return the trace body.
pub async fn submit_turn(app: &Router, run_id: &str, turn: i64, input: &str) -> (StatusCode, Value) {
    post_json(
        app,
        "/turn",
        json!({
            "runId": run_id,
            "turn": turn,
            "playerInput": input,
            "playerId": PLAYER,
        }),
    )
    .await
}
