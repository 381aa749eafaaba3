/*!
Per-run durable state.

One store per run, backed by a single-file SQLite database at
`<gameProjectsRoot>/<gameProjectId>/saved/<runId>/world_state.db`, opened in
WAL mode for crash safety. The folder is authoritative: run discovery is a
directory scan, and deleting the folder deletes the run.

## Behavior

- Schema is ensured idempotently on every connect; re-initializing an
  already-initialized folder is a no-op.
- `events`, `snapshots`, and `pipeline_events` are append-only. The only
  mutable rows are `turn_execution.(cursor, completed, result, updated_at)`.
- Pipeline event step numbers must arrive contiguous from 1 per
  `(runId, turn)`; the insert enforces it inside a transaction.
- Timestamps are RFC3339 strings; JSON payloads are TEXT columns.

## Failure semantics

Any I/O or schema-parse failure surfaces as [`StoreError`]. The pipeline
treats store errors as fatal for the turn and never partially commits.
*/

pub mod projection;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::instrument;

use crate::checkpoint::Checkpoint;
use crate::contracts::{EventType, LoreEntry, PipelineEvent};

pub use projection::{ChatMessage, ChatRole, DebugEntry, SessionStateView};

/// Directory under a game project that holds its runs.
pub const SAVED_DIR: &str = "saved";
/// Database file name inside a run directory.
pub const DB_FILE: &str = "world_state.db";

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    #[diagnostic(
        code(taleloom::store::sqlx),
        help("Ensure the run database file is accessible and not locked by another writer.")
    )]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {source}")]
    #[diagnostic(
        code(taleloom::store::serde),
        help("A persisted payload no longer matches its expected shape.")
    )]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    #[diagnostic(code(taleloom::store::io))]
    Io(#[from] std::io::Error),

    #[error("run not found: {run_id}")]
    #[diagnostic(code(taleloom::store::run_not_found))]
    RunNotFound { run_id: String },

    #[error("turn execution already exists for turn {turn}")]
    #[diagnostic(code(taleloom::store::execution_exists))]
    ExecutionAlreadyExists { turn: i64 },

    #[error("an execution is still running for turn {active_turn}")]
    #[diagnostic(
        code(taleloom::store::active_execution),
        help("Finish or resume the running turn before starting another.")
    )]
    ActiveExecutionConflict { active_turn: i64 },

    #[error("no turn execution recorded for turn {turn}")]
    #[diagnostic(code(taleloom::store::execution_not_found))]
    ExecutionNotFound { turn: i64 },

    #[error("cursor may not move backwards for turn {turn}: {current} -> {requested}")]
    #[diagnostic(code(taleloom::store::cursor_regression))]
    CursorRegression {
        turn: i64,
        current: i64,
        requested: i64,
    },

    #[error("pipeline step out of order for turn {turn}: expected {expected}, got {got}")]
    #[diagnostic(code(taleloom::store::step_gap))]
    StepNumberGap { turn: i64, expected: i64, got: i64 },

    #[error("corrupt persisted value in {what}")]
    #[diagnostic(code(taleloom::store::decode))]
    Decode { what: String },
}

/// Execution mode of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Normal,
    Step,
}

impl ExecutionMode {
    pub fn encode(self) -> &'static str {
        match self {
            ExecutionMode::Normal => "normal",
            ExecutionMode::Step => "step",
        }
    }

    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(ExecutionMode::Normal),
            "step" => Some(ExecutionMode::Step),
            _ => None,
        }
    }
}

/// Stored result of a completed turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration_text: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// The running or completed state of one turn's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnExecution {
    pub run_id: String,
    pub turn: i64,
    pub mode: ExecutionMode,
    pub cursor: i64,
    pub completed: bool,
    pub player_input: String,
    pub player_id: String,
    pub request_id: String,
    pub game_project_id: String,
    pub checkpoint: Checkpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TurnResult>,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for creating a fresh execution row.
#[derive(Debug, Clone)]
pub struct NewTurnExecution<'a> {
    pub turn: i64,
    pub mode: ExecutionMode,
    pub player_input: &'a str,
    pub player_id: &'a str,
    pub request_id: &'a str,
}

/// One append-only `events` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    pub id: i64,
    pub turn: i64,
    pub event_type: EventType,
    pub payload: Value,
    pub created_at: String,
}

/// Listing entry for a saved run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub session_id: String,
    pub created_at: String,
}

/// A located run: owning game project plus database path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLocation {
    pub game_project_id: String,
    pub db_path: PathBuf,
}

/// Write-serialized handle over one run's database.
pub struct RunStore {
    pool: SqlitePool,
    run_id: String,
    game_project_id: String,
    db_path: PathBuf,
}

impl std::fmt::Debug for RunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStore")
            .field("run_id", &self.run_id)
            .field("game_project_id", &self.game_project_id)
            .finish()
    }
}

/// Directory that holds one run's files.
pub fn run_dir(root: &Path, game_project_id: &str, run_id: &str) -> PathBuf {
    root.join(game_project_id).join(SAVED_DIR).join(run_id)
}

/// Database path for one run.
pub fn db_path(root: &Path, game_project_id: &str, run_id: &str) -> PathBuf {
    run_dir(root, game_project_id, run_id).join(DB_FILE)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl RunStore {
    /// Create the run folder, initialize the schema, and write the seed
    /// state: a turn-0 snapshot plus the game project's lore rows.
    /// Idempotent on already-initialized folders.
    #[instrument(skip(root, lore), err)]
    pub async fn initialize(
        root: &Path,
        game_project_id: &str,
        run_id: &str,
        lore: &[LoreEntry],
    ) -> Result<RunStore, StoreError> {
        let dir = run_dir(root, game_project_id, run_id);
        std::fs::create_dir_all(&dir)?;
        let store = Self::connect(
            db_path(root, game_project_id, run_id),
            game_project_id,
            run_id,
        )
        .await?;
        store.ensure_seed(lore).await?;
        Ok(store)
    }

    /// Open an existing run. The database file must already exist.
    #[instrument(skip(root), err)]
    pub async fn open(
        root: &Path,
        game_project_id: &str,
        run_id: &str,
    ) -> Result<RunStore, StoreError> {
        let path = db_path(root, game_project_id, run_id);
        if !path.is_file() {
            return Err(StoreError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        Self::connect(path, game_project_id, run_id).await
    }

    async fn connect(
        path: PathBuf,
        game_project_id: &str,
        run_id: &str,
    ) -> Result<RunStore, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        // One writer at a time; the API serializes access per run.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = RunStore {
            pool,
            run_id: run_id.to_string(),
            game_project_id: game_project_id.to_string(),
            db_path: path,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn game_project_id(&self) -> &str {
        &self.game_project_id
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Close the underlying pool. Callers close on every exit path.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                turn INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                turn INTEGER NOT NULL,
                world_state TEXT NOT NULL,
                view_state TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS lore (
                subject TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                source TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS turn_execution (
                run_id TEXT NOT NULL,
                turn INTEGER NOT NULL,
                mode TEXT NOT NULL,
                cursor INTEGER NOT NULL,
                completed INTEGER NOT NULL,
                player_input TEXT NOT NULL,
                player_id TEXT NOT NULL,
                request_id TEXT NOT NULL,
                game_project_id TEXT NOT NULL,
                checkpoint TEXT NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (run_id, turn)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS pipeline_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                turn INTEGER NOT NULL,
                step_number INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn ensure_seed(&self, lore: &[LoreEntry]) -> Result<(), StoreError> {
        let snapshots: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;
        if snapshots == 0 {
            let world_state = json!({
                "gameProjectId": self.game_project_id,
                "entities": [],
                "facts": [],
                "anchors": [],
            });
            let view_state = json!({ "player": { "observations": [] } });
            self.append_snapshot(0, &world_state, &view_state).await?;
        }
        for (key, value) in [
            ("run_id", self.run_id.as_str()),
            ("game_project_id", self.game_project_id.as_str()),
        ] {
            sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)")
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
        }
        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('created_at', ?1)")
            .bind(now_rfc3339())
            .execute(&self.pool)
            .await?;
        self.seed_lore(lore).await
    }

    /// Enumerate saved runs for a game project, newest database first.
    pub fn list_sessions(
        root: &Path,
        game_project_id: &str,
    ) -> Result<Vec<SessionEntry>, StoreError> {
        let saved = root.join(game_project_id).join(SAVED_DIR);
        if !saved.is_dir() {
            return Ok(Vec::new());
        }
        let mut found: Vec<(SystemTime, SessionEntry)> = Vec::new();
        for entry in std::fs::read_dir(&saved)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let db = entry.path().join(DB_FILE);
            let Ok(meta) = std::fs::metadata(&db) else {
                continue;
            };
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((
                created,
                SessionEntry {
                    session_id: entry.file_name().to_string_lossy().into_owned(),
                    created_at: DateTime::<Utc>::from(created).to_rfc3339(),
                },
            ));
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, e)| e).collect())
    }

    /// Scan game project directories for a run's database.
    pub fn resolve_run_location(
        root: &Path,
        run_id: &str,
    ) -> Result<Option<RunLocation>, StoreError> {
        if !root.is_dir() {
            return Ok(None);
        }
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let candidate = entry.path().join(SAVED_DIR).join(run_id).join(DB_FILE);
            if candidate.is_file() {
                return Ok(Some(RunLocation {
                    game_project_id: entry.file_name().to_string_lossy().into_owned(),
                    db_path: candidate,
                }));
            }
        }
        Ok(None)
    }

    /* ---------- events ---------- */

    #[instrument(skip(self, payload), err)]
    pub async fn append_event(
        &self,
        turn: i64,
        event_type: EventType,
        payload: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events (turn, event_type, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(turn)
        .bind(event_type.encode())
        .bind(serde_json::to_string(payload)?)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_events(&self, turn: i64, event_type: EventType) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE turn = ?1 AND event_type = ?2",
        )
        .bind(turn)
        .bind(event_type.encode())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// All events, totally ordered by `(turn, id)`.
    pub async fn events_in_order(&self) -> Result<Vec<EventRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, turn, event_type, payload, created_at FROM events ORDER BY turn ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    /* ---------- snapshots ---------- */

    #[instrument(skip(self, world_state, view_state), err)]
    pub async fn append_snapshot(
        &self,
        turn: i64,
        world_state: &Value,
        view_state: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO snapshots (turn, world_state, view_state, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(turn)
        .bind(serde_json::to_string(world_state)?)
        .bind(serde_json::to_string(view_state)?)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_snapshot_turn(&self) -> Result<Option<i64>, StoreError> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(turn) FROM snapshots")
            .fetch_one(&self.pool)
            .await?;
        Ok(latest)
    }

    /// The only turn index a new player input may use.
    pub async fn next_turn(&self) -> Result<i64, StoreError> {
        Ok(self.latest_snapshot_turn().await?.map_or(1, |t| t + 1))
    }

    /* ---------- pipeline events ---------- */

    /// Append a pipeline event, enforcing contiguous step numbering within
    /// the turn.
    #[instrument(skip(self, event), fields(turn = event.turn, step = event.step_number), err)]
    pub async fn append_pipeline_event(&self, event: &PipelineEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let prior: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pipeline_events WHERE run_id = ?1 AND turn = ?2",
        )
        .bind(&event.run_id)
        .bind(event.turn)
        .fetch_one(&mut *tx)
        .await?;
        if event.step_number != prior + 1 {
            return Err(StoreError::StepNumberGap {
                turn: event.turn,
                expected: prior + 1,
                got: event.step_number,
            });
        }
        sqlx::query(
            "INSERT INTO pipeline_events (run_id, turn, step_number, payload, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&event.run_id)
        .bind(event.turn)
        .bind(event.step_number)
        .bind(serde_json::to_string(event)?)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn pipeline_event_count(&self, turn: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pipeline_events WHERE run_id = ?1 AND turn = ?2",
        )
        .bind(&self.run_id)
        .bind(turn)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn list_pipeline_events(&self, turn: i64) -> Result<Vec<PipelineEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT payload FROM pipeline_events WHERE run_id = ?1 AND turn = ?2 ORDER BY step_number ASC",
        )
        .bind(&self.run_id)
        .bind(turn)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let payload: String = row.get("payload");
                serde_json::from_str(&payload).map_err(StoreError::from)
            })
            .collect()
    }

    /* ---------- turn executions ---------- */

    /// Insert a fresh execution row.
    ///
    /// Fails with [`StoreError::ExecutionAlreadyExists`] when the turn
    /// already has a row, and with [`StoreError::ActiveExecutionConflict`]
    /// when a different turn is still running.
    #[instrument(skip(self, new), fields(turn = new.turn), err)]
    pub async fn create_turn_execution(
        &self,
        new: &NewTurnExecution<'_>,
    ) -> Result<TurnExecution, StoreError> {
        let mut tx = self.pool.begin().await?;
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT turn FROM turn_execution WHERE run_id = ?1 AND turn = ?2")
                .bind(&self.run_id)
                .bind(new.turn)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(StoreError::ExecutionAlreadyExists { turn: new.turn });
        }
        let active: Option<i64> =
            sqlx::query_scalar("SELECT turn FROM turn_execution WHERE run_id = ?1 AND completed = 0")
                .bind(&self.run_id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(active_turn) = active {
            return Err(StoreError::ActiveExecutionConflict { active_turn });
        }

        let checkpoint = Checkpoint::default();
        let now = now_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO turn_execution (
                run_id, turn, mode, cursor, completed,
                player_input, player_id, request_id, game_project_id,
                checkpoint, result, created_at, updated_at
            ) VALUES (?1, ?2, ?3, 0, 0, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?9)
            "#,
        )
        .bind(&self.run_id)
        .bind(new.turn)
        .bind(new.mode.encode())
        .bind(new.player_input)
        .bind(new.player_id)
        .bind(new.request_id)
        .bind(&self.game_project_id)
        .bind(serde_json::to_string(&checkpoint)?)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(TurnExecution {
            run_id: self.run_id.clone(),
            turn: new.turn,
            mode: new.mode,
            cursor: 0,
            completed: false,
            player_input: new.player_input.to_string(),
            player_id: new.player_id.to_string(),
            request_id: new.request_id.to_string(),
            game_project_id: self.game_project_id.clone(),
            checkpoint,
            result: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn get_turn_execution(&self, turn: i64) -> Result<Option<TurnExecution>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM turn_execution WHERE run_id = ?1 AND turn = ?2",
        )
        .bind(&self.run_id)
        .bind(turn)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_execution).transpose()
    }

    /// The single non-completed execution for this run, if any.
    pub async fn active_execution(&self) -> Result<Option<TurnExecution>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM turn_execution WHERE run_id = ?1 AND completed = 0",
        )
        .bind(&self.run_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_execution).transpose()
    }

    /// Monotonic progress update. On `completed = true` the row becomes
    /// terminal and carries the stored result.
    #[instrument(skip(self, checkpoint, result), err)]
    pub async fn update_turn_execution_progress(
        &self,
        turn: i64,
        cursor: i64,
        checkpoint: &Checkpoint,
        completed: bool,
        result: Option<&TurnResult>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let current: Option<i64> =
            sqlx::query_scalar("SELECT cursor FROM turn_execution WHERE run_id = ?1 AND turn = ?2")
                .bind(&self.run_id)
                .bind(turn)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or(StoreError::ExecutionNotFound { turn })?;
        if cursor < current {
            return Err(StoreError::CursorRegression {
                turn,
                current,
                requested: cursor,
            });
        }
        let result_json = result.map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            UPDATE turn_execution
            SET cursor = ?3, checkpoint = ?4, completed = ?5, result = ?6, updated_at = ?7
            WHERE run_id = ?1 AND turn = ?2
            "#,
        )
        .bind(&self.run_id)
        .bind(turn)
        .bind(cursor)
        .bind(serde_json::to_string(checkpoint)?)
        .bind(completed as i64)
        .bind(result_json)
        .bind(now_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn read_turn_execution_checkpoint(
        &self,
        turn: i64,
    ) -> Result<Checkpoint, StoreError> {
        let execution = self
            .get_turn_execution(turn)
            .await?
            .ok_or(StoreError::ExecutionNotFound { turn })?;
        Ok(execution.checkpoint)
    }

    /* ---------- lore ---------- */

    /// Seed lore rows, keyed by subject. Existing subjects are untouched.
    pub async fn seed_lore(&self, entries: &[LoreEntry]) -> Result<(), StoreError> {
        for entry in entries {
            sqlx::query(
                "INSERT OR IGNORE INTO lore (subject, data, source, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&entry.subject)
            .bind(&entry.data)
            .bind(&entry.source)
            .bind(now_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn lore_entries(&self) -> Result<Vec<LoreEntry>, StoreError> {
        let rows = sqlx::query("SELECT subject, data, source FROM lore ORDER BY subject ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| LoreEntry {
                subject: row.get("subject"),
                data: row.get("data"),
                source: row.get("source"),
            })
            .collect())
    }

    /* ---------- projection ---------- */

    /// Reconstitute the player transcript and debug trace from persisted
    /// events. Pure over stored rows; repeated reads yield identical views.
    pub async fn read_session_state(&self) -> Result<SessionStateView, StoreError> {
        let events = self.events_in_order().await?;
        let next_turn = self.next_turn().await?;
        Ok(projection::project_session_state(&events, next_turn))
    }
}

fn row_to_event(row: &SqliteRow) -> Result<EventRow, StoreError> {
    let event_type: String = row.get("event_type");
    let payload: String = row.get("payload");
    Ok(EventRow {
        id: row.get("id"),
        turn: row.get("turn"),
        event_type: EventType::decode(&event_type).ok_or_else(|| StoreError::Decode {
            what: format!("events.event_type '{event_type}'"),
        })?,
        payload: serde_json::from_str(&payload)?,
        created_at: row.get("created_at"),
    })
}

fn row_to_execution(row: &SqliteRow) -> Result<TurnExecution, StoreError> {
    let mode: String = row.get("mode");
    let checkpoint: String = row.get("checkpoint");
    let result: Option<String> = row.get("result");
    let completed: i64 = row.get("completed");
    Ok(TurnExecution {
        run_id: row.get("run_id"),
        turn: row.get("turn"),
        mode: ExecutionMode::decode(&mode).ok_or_else(|| StoreError::Decode {
            what: format!("turn_execution.mode '{mode}'"),
        })?,
        cursor: row.get("cursor"),
        completed: completed != 0,
        player_input: row.get("player_input"),
        player_id: row.get("player_id"),
        request_id: row.get("request_id"),
        game_project_id: row.get("game_project_id"),
        checkpoint: serde_json::from_str(&checkpoint)?,
        result: result.as_deref().map(serde_json::from_str).transpose()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
