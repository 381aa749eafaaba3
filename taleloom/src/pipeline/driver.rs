//! The pipeline driver: sequences the fixed stage list, carries the
//! checkpoint across stages, applies the refusal gate, records pipeline
//! events, and commits the turn.
//!
//! ## Execution model
//!
//! 1. An execution row is created (or resumed) for `(runId, turn)`; the
//!    player input event and the synthetic `frontend_input` pipeline event
//!    are recorded exactly once per turn.
//! 2. Stages run strictly in order. Each module stage appends one pipeline
//!    event (`ok`, `error`, or `skipped`) and merges its output, warnings,
//!    and conversation trace into the checkpoint.
//! 3. After intent extraction and again after the pre-check the refusal
//!    predicate runs; once a refusal reason is set, the four simulation
//!    stages are skipped (still producing `skipped` events).
//! 4. `world_state_update` always runs: it appends its own pipeline event,
//!    writes the `module_trace` and `committed_diff` events, appends the
//!    turn snapshot, and flips the execution row to completed.
//!
//! A module failure leaves the execution row `Running` at the failing
//! stage's cursor; a retry with the same turn resumes there and appends new
//! pipeline events (step numbers never rewind).

use chrono::Utc;
use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::instrument;

use crate::checkpoint::{Checkpoint, TurnTrace};
use crate::contracts::{
    ActionCandidates, ArbiterDecision, CommittedDiff, DiffOperation, EventType, LoreRetrieval,
    LoremasterOutput, LoremasterPostOutput, NarrationOutput, OpKind, OpScope, PipelineEvent,
    PipelineStatus, ProposedDiff, RunContext,
};
use crate::modules::{ModuleClient, ModuleError, ModuleRole, Registry};
use crate::store::{
    ExecutionMode, NewTurnExecution, RunStore, StoreError, TurnExecution, TurnResult,
};

use super::refusal;
use super::stage::{Stage, FRONTEND_INPUT_STAGE};

/// Summary attached to every arbiter-accepted commit.
pub const COMMIT_SUMMARY: &str = "Action resolved with router-managed module pipeline.";
/// Summary attached to a synthesized refusal commit.
pub const REFUSAL_SUMMARY: &str = "Action refused before simulation.";

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(code(taleloom::pipeline::store))]
    Store(#[from] StoreError),

    #[error("stage {stage} failed: {source}")]
    #[diagnostic(
        code(taleloom::pipeline::stage),
        help("The failing stage's pipeline event is durable; retry the turn to resume from it.")
    )]
    Stage {
        stage: &'static str,
        #[source]
        source: ModuleError,
    },

    #[error("turn {turn} reached finalization without a committed diff")]
    #[diagnostic(code(taleloom::pipeline::missing_commit))]
    MissingCommit { turn: i64 },
}

impl PipelineError {
    /// Stage identifier for error reporting, when the failure is stage-bound.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// The commit function: an accepted proposal becomes the turn's diff.
pub fn commit(turn: i64, proposal: &ProposedDiff) -> CommittedDiff {
    CommittedDiff {
        turn,
        operations: proposal.operations.clone(),
        summary: COMMIT_SUMMARY.to_string(),
    }
}

/// Synthesize the refusal diff: a single player-scoped observation carrying
/// the refusal sentence.
fn refusal_commit(turn: i64, reason: &str) -> CommittedDiff {
    CommittedDiff {
        turn,
        operations: vec![DiffOperation {
            op: OpKind::Observation,
            scope: OpScope::ViewPlayer,
            payload: json!({ "text": reason }),
            reason: "refusal".to_string(),
        }],
        summary: REFUSAL_SUMMARY.to_string(),
    }
}

/// Execution view returned by the step-mode endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub execution: TurnExecution,
    pub pipeline_events: Vec<PipelineEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TurnResult>,
}

/// Drives one run's turns against an open store.
pub struct PipelineDriver<'a> {
    store: &'a RunStore,
    client: &'a ModuleClient,
    registry: &'a Registry,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(store: &'a RunStore, client: &'a ModuleClient, registry: &'a Registry) -> Self {
        Self {
            store,
            client,
            registry,
        }
    }

    /// Run the whole pipeline for one turn in a single call.
    ///
    /// Resumes a non-completed execution for the same turn from its stored
    /// cursor; returns the stored trace if the turn already completed.
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id, turn = ctx.turn), err)]
    pub async fn process_turn(&self, ctx: &RunContext) -> Result<TurnTrace, PipelineError> {
        let execution = match self.store.get_turn_execution(ctx.turn).await? {
            Some(existing) => existing,
            None => self.create_execution(ctx, ExecutionMode::Normal).await?,
        };

        let mut checkpoint = execution.checkpoint.clone();
        let mut cursor = execution.cursor;
        while let Some(stage) = Stage::at_cursor(cursor) {
            if stage == Stage::WorldStateUpdate {
                let (trace, result) = self.finalize_turn(ctx, &mut checkpoint).await?;
                self.store
                    .update_turn_execution_progress(
                        ctx.turn,
                        cursor + 1,
                        &checkpoint,
                        true,
                        Some(&result),
                    )
                    .await?;
                return Ok(trace);
            }
            match self.execute_module_stage(ctx, stage, &mut checkpoint).await {
                Ok(()) => {
                    cursor += 1;
                    self.store
                        .update_turn_execution_progress(ctx.turn, cursor, &checkpoint, false, None)
                        .await?;
                }
                Err(err) => {
                    self.store
                        .update_turn_execution_progress(ctx.turn, cursor, &checkpoint, false, None)
                        .await?;
                    return Err(err);
                }
            }
        }

        // Already completed; the persisted trace is the answer.
        self.load_stored_trace(ctx.turn).await
    }

    /// Begin a paused step-mode execution. Fails if the turn already has an
    /// execution row or another turn is still running.
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id, turn = ctx.turn), err)]
    pub async fn start_step_execution(&self, ctx: &RunContext) -> Result<StepView, PipelineError> {
        let execution = self.create_execution(ctx, ExecutionMode::Step).await?;
        let pipeline_events = self.store.list_pipeline_events(ctx.turn).await?;
        Ok(StepView {
            execution,
            pipeline_events,
            result: None,
        })
    }

    /// Execute exactly one stage at the stored cursor.
    ///
    /// After completion, further advances return the stored result without
    /// re-executing anything.
    #[instrument(skip(self), err)]
    pub async fn advance_step_execution(&self, turn: i64) -> Result<StepView, PipelineError> {
        let execution = self
            .store
            .get_turn_execution(turn)
            .await?
            .ok_or(StoreError::ExecutionNotFound { turn })?;
        if execution.completed {
            return self.step_view(execution).await;
        }

        let ctx = RunContext {
            request_id: execution.request_id.clone(),
            run_id: execution.run_id.clone(),
            game_project_id: execution.game_project_id.clone(),
            turn,
            player_id: execution.player_id.clone(),
            player_input: execution.player_input.clone(),
        };
        let mut checkpoint = execution.checkpoint.clone();
        let cursor = execution.cursor;
        let stage = Stage::at_cursor(cursor).ok_or_else(|| StoreError::Decode {
            what: format!("turn_execution.cursor {cursor}"),
        })?;

        if stage == Stage::WorldStateUpdate {
            let (_, result) = self.finalize_turn(&ctx, &mut checkpoint).await?;
            self.store
                .update_turn_execution_progress(turn, cursor + 1, &checkpoint, true, Some(&result))
                .await?;
        } else {
            match self.execute_module_stage(&ctx, stage, &mut checkpoint).await {
                Ok(()) => {
                    self.store
                        .update_turn_execution_progress(turn, cursor + 1, &checkpoint, false, None)
                        .await?;
                }
                Err(err) => {
                    self.store
                        .update_turn_execution_progress(turn, cursor, &checkpoint, false, None)
                        .await?;
                    return Err(err);
                }
            }
        }

        let execution = self
            .store
            .get_turn_execution(turn)
            .await?
            .ok_or(StoreError::ExecutionNotFound { turn })?;
        self.step_view(execution).await
    }

    async fn step_view(&self, execution: TurnExecution) -> Result<StepView, PipelineError> {
        let pipeline_events = self.store.list_pipeline_events(execution.turn).await?;
        let result = execution.result.clone();
        Ok(StepView {
            execution,
            pipeline_events,
            result,
        })
    }

    /// Create the execution row plus the once-per-turn intake records.
    async fn create_execution(
        &self,
        ctx: &RunContext,
        mode: ExecutionMode,
    ) -> Result<TurnExecution, PipelineError> {
        let execution = self
            .store
            .create_turn_execution(&NewTurnExecution {
                turn: ctx.turn,
                mode,
                player_input: &ctx.player_input,
                player_id: &ctx.player_id,
                request_id: &ctx.request_id,
            })
            .await?;

        if self
            .store
            .count_events(ctx.turn, EventType::PlayerInput)
            .await?
            == 0
        {
            self.store
                .append_event(
                    ctx.turn,
                    EventType::PlayerInput,
                    &json!({ "text": ctx.player_input, "playerId": ctx.player_id }),
                )
                .await?;
        }

        let now = Utc::now().to_rfc3339();
        self.store
            .append_pipeline_event(&PipelineEvent {
                run_id: ctx.run_id.clone(),
                turn: ctx.turn,
                step_number: 1,
                stage: FRONTEND_INPUT_STAGE.to_string(),
                endpoint: "frontend".to_string(),
                status: PipelineStatus::Ok,
                request: json!({ "playerInput": ctx.player_input, "playerId": ctx.player_id }),
                response: Value::Null,
                warnings: vec![],
                error: None,
                started_at: now.clone(),
                finished_at: now,
            })
            .await?;

        Ok(execution)
    }

    /// Execute one module-backed stage, honoring the refusal gate.
    async fn execute_module_stage(
        &self,
        ctx: &RunContext,
        stage: Stage,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), PipelineError> {
        let Some((role, path)) = stage.route() else {
            return Ok(());
        };
        let endpoint = format!("{}{}", self.registry.resolve(role), path);

        if checkpoint.is_refused() && stage.skipped_on_refusal() {
            return self.record_skipped(ctx, stage, &endpoint, checkpoint).await;
        }

        let request = self.stage_request(ctx, stage, checkpoint).await?;
        let started_at = Utc::now().to_rfc3339();

        match stage {
            Stage::IntentExtractor => {
                let output: ActionCandidates = self
                    .call(ctx, stage, role, &endpoint, &request, &started_at, checkpoint)
                    .await?;
                checkpoint.refusal_reason = refusal::from_intent(&output);
                checkpoint.intent = Some(output);
            }
            Stage::LoremasterRetrieve => {
                let output: LoreRetrieval = self
                    .call(ctx, stage, role, &endpoint, &request, &started_at, checkpoint)
                    .await?;
                checkpoint.lore_retrieval = Some(output);
            }
            Stage::LoremasterPre => {
                let output: LoremasterOutput = self
                    .call(ctx, stage, role, &endpoint, &request, &started_at, checkpoint)
                    .await?;
                // The pre-check overrides an intent-derived reason only when
                // it sets one itself.
                if let Some(reason) = refusal::from_pre_check(&output) {
                    checkpoint.refusal_reason = Some(reason);
                }
                checkpoint.loremaster_pre = Some(output);
            }
            Stage::DefaultSimulator => {
                let output: ProposedDiff = self
                    .call(ctx, stage, role, &endpoint, &request, &started_at, checkpoint)
                    .await?;
                checkpoint.proposal = Some(output);
            }
            Stage::LoremasterPost => {
                let output: LoremasterPostOutput = self
                    .call(ctx, stage, role, &endpoint, &request, &started_at, checkpoint)
                    .await?;
                checkpoint.lore_post = Some(output);
            }
            Stage::Arbiter => {
                let decision: ArbiterDecision = self
                    .call(ctx, stage, role, &endpoint, &request, &started_at, checkpoint)
                    .await?;
                checkpoint.proposal = Some(decision.selected_proposal.clone());
                checkpoint.committed = Some(commit(ctx.turn, &decision.selected_proposal));
                checkpoint.arbiter_decision = Some(decision);
            }
            Stage::Proser => {
                let output: NarrationOutput = self
                    .call(ctx, stage, role, &endpoint, &request, &started_at, checkpoint)
                    .await?;
                checkpoint.narration_text = Some(output.narration_text);
            }
            Stage::WorldStateUpdate => {}
        }
        Ok(())
    }

    /// Invoke one module endpoint, append the pipeline event either way,
    /// and fold meta/debug into the checkpoint on success.
    #[allow(clippy::too_many_arguments)]
    async fn call<T>(
        &self,
        ctx: &RunContext,
        stage: Stage,
        role: ModuleRole,
        endpoint: &str,
        request: &Value,
        started_at: &str,
        checkpoint: &mut Checkpoint,
    ) -> Result<T, PipelineError>
    where
        T: DeserializeOwned + Serialize,
    {
        let step_number = self.store.pipeline_event_count(ctx.turn).await? + 1;
        match self.client.invoke::<T>(role, endpoint, request).await {
            Ok(response) => {
                let response_json =
                    serde_json::to_value(&response).map_err(StoreError::from)?;
                self.store
                    .append_pipeline_event(&PipelineEvent {
                        run_id: ctx.run_id.clone(),
                        turn: ctx.turn,
                        step_number,
                        stage: stage.encode().to_string(),
                        endpoint: endpoint.to_string(),
                        status: PipelineStatus::Ok,
                        request: request.clone(),
                        response: response_json,
                        warnings: response.meta.warnings.clone(),
                        error: None,
                        started_at: started_at.to_string(),
                        finished_at: Utc::now().to_rfc3339(),
                    })
                    .await?;
                checkpoint.absorb_module(stage.encode(), &response.meta, response.debug.as_ref());
                Ok(response.output)
            }
            Err(err) => {
                self.store
                    .append_pipeline_event(&PipelineEvent {
                        run_id: ctx.run_id.clone(),
                        turn: ctx.turn,
                        step_number,
                        stage: stage.encode().to_string(),
                        endpoint: endpoint.to_string(),
                        status: PipelineStatus::Error,
                        request: request.clone(),
                        response: Value::Null,
                        warnings: vec![],
                        error: Some(err.to_string()),
                        started_at: started_at.to_string(),
                        finished_at: Utc::now().to_rfc3339(),
                    })
                    .await?;
                Err(PipelineError::Stage {
                    stage: stage.encode(),
                    source: err,
                })
            }
        }
    }

    /// Record a `skipped` pipeline event for a refusal-gated stage.
    async fn record_skipped(
        &self,
        ctx: &RunContext,
        stage: Stage,
        endpoint: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), PipelineError> {
        let step_number = self.store.pipeline_event_count(ctx.turn).await? + 1;
        let now = Utc::now().to_rfc3339();
        let reason = checkpoint.refusal_reason.clone().unwrap_or_default();
        self.store
            .append_pipeline_event(&PipelineEvent {
                run_id: ctx.run_id.clone(),
                turn: ctx.turn,
                step_number,
                stage: stage.encode().to_string(),
                endpoint: endpoint.to_string(),
                status: PipelineStatus::Skipped,
                request: Value::Null,
                response: json!({ "reason": reason }),
                warnings: vec![],
                error: None,
                started_at: now.clone(),
                finished_at: now,
            })
            .await?;
        Ok(())
    }

    /// Build the role-specific request body for a stage.
    async fn stage_request(
        &self,
        ctx: &RunContext,
        stage: Stage,
        checkpoint: &Checkpoint,
    ) -> Result<Value, PipelineError> {
        let request = match stage {
            Stage::IntentExtractor => json!({ "context": ctx }),
            Stage::LoremasterRetrieve => json!({
                "context": ctx,
                "intent": checkpoint.intent,
                "lore": self.store.lore_entries().await?,
            }),
            Stage::LoremasterPre => json!({
                "context": ctx,
                "intent": checkpoint.intent,
                "lore": checkpoint.lore_retrieval,
            }),
            Stage::DefaultSimulator => json!({
                "context": ctx,
                "intent": checkpoint.intent,
                "lore": checkpoint.lore_retrieval,
                "loremasterPre": checkpoint.loremaster_pre,
            }),
            Stage::LoremasterPost => json!({
                "context": ctx,
                "intent": checkpoint.intent,
                "lore": checkpoint.lore_retrieval,
                "proposal": checkpoint.proposal,
            }),
            Stage::Arbiter => json!({
                "context": ctx,
                "intent": checkpoint.intent,
                "lore": checkpoint.lore_retrieval,
                "loremasterPre": checkpoint.loremaster_pre,
                "proposal": checkpoint.proposal,
                "lorePost": checkpoint.lore_post,
            }),
            Stage::Proser => json!({
                "context": ctx,
                "committed": checkpoint.committed,
                "lore": checkpoint.lore_retrieval,
                "lorePost": checkpoint.lore_post,
            }),
            Stage::WorldStateUpdate => Value::Null,
        };
        Ok(request)
    }

    /// Finalize the turn: refusal synthesis if gated, then the atomic write
    /// sequence (module_trace, committed_diff, snapshot).
    async fn finalize_turn(
        &self,
        ctx: &RunContext,
        checkpoint: &mut Checkpoint,
    ) -> Result<(TurnTrace, TurnResult), PipelineError> {
        let started_at = Utc::now().to_rfc3339();

        if let Some(reason) = checkpoint.refusal_reason.clone() {
            checkpoint.committed = Some(refusal_commit(ctx.turn, &reason));
            checkpoint.narration_text = Some(reason);
        }
        let committed = checkpoint
            .committed
            .clone()
            .ok_or(PipelineError::MissingCommit { turn: ctx.turn })?;

        let step_number = self.store.pipeline_event_count(ctx.turn).await? + 1;
        self.store
            .append_pipeline_event(&PipelineEvent {
                run_id: ctx.run_id.clone(),
                turn: ctx.turn,
                step_number,
                stage: Stage::WorldStateUpdate.encode().to_string(),
                endpoint: "internal".to_string(),
                status: PipelineStatus::Ok,
                request: Value::Null,
                response: json!({ "summary": committed.summary }),
                warnings: vec![],
                error: None,
                started_at,
                finished_at: Utc::now().to_rfc3339(),
            })
            .await?;

        let pipeline_events = self.store.list_pipeline_events(ctx.turn).await?;
        let trace =
            TurnTrace::from_checkpoint(ctx.turn, &ctx.request_id, checkpoint, pipeline_events);

        self.store
            .append_event(
                ctx.turn,
                EventType::ModuleTrace,
                &serde_json::to_value(&trace).map_err(StoreError::from)?,
            )
            .await?;
        self.store
            .append_event(
                ctx.turn,
                EventType::CommittedDiff,
                &serde_json::to_value(&committed).map_err(StoreError::from)?,
            )
            .await?;
        self.store
            .append_snapshot(
                ctx.turn,
                &json!({ "lastSummary": committed.summary }),
                &json!({ "lastObservation": committed.operations }),
            )
            .await?;

        let result = TurnResult {
            narration_text: checkpoint.narration_text.clone(),
            warnings: checkpoint.warnings.clone(),
        };
        Ok((trace, result))
    }

    async fn load_stored_trace(&self, turn: i64) -> Result<TurnTrace, PipelineError> {
        let events = self.store.events_in_order().await?;
        for row in events.iter().rev() {
            if row.turn == turn && row.event_type == EventType::ModuleTrace {
                let trace: TurnTrace =
                    serde_json::from_value(row.payload.clone()).map_err(StoreError::from)?;
                return Ok(trace);
            }
        }
        Err(StoreError::Decode {
            what: format!("module_trace for turn {turn}"),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_carries_the_fixed_summary_and_operations() {
        let proposal = ProposedDiff {
            module_name: "default_simulator".into(),
            operations: vec![DiffOperation {
                op: OpKind::Observation,
                scope: OpScope::ViewPlayer,
                payload: json!({ "text": "You scan the desert." }),
                reason: "look".into(),
            }],
        };
        let committed = commit(3, &proposal);
        assert_eq!(committed.turn, 3);
        assert_eq!(committed.summary, COMMIT_SUMMARY);
        assert_eq!(committed.operations, proposal.operations);
    }

    #[test]
    fn refusal_commit_is_a_single_player_observation() {
        let reason = "Refused: no valid attack target is currently in scope.";
        let committed = refusal_commit(2, reason);
        assert_eq!(committed.operations.len(), 1);
        let op = &committed.operations[0];
        assert!(op.is_player_observation());
        assert_eq!(op.payload["text"], reason);
        assert_eq!(committed.summary, REFUSAL_SUMMARY);
    }
}
