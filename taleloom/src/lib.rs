//! ```text
//! Api ─► TurnSequencingCheck ─► RunStore::open ─► PipelineDriver::run
//!                                │                │
//!                                │                ├─► Registry ─► ModuleClient
//!                                │                │               │
//!                                │                │               └─► Checkpoint update
//!                                │                │
//!                                │                └─► PipelineEvent + TurnTrace
//!                                │
//!                                └─► StateProjection (chat transcript / debug trace)
//! ```
//!
//! Taleloom is the turn-orchestrating core of an interactive narrative engine.
//! For each player input it drives a fixed eight-stage module pipeline,
//! enforces the schema contract at every hop, applies deterministic
//! refusal/skip decisions, and persists an event-sourced trace into a per-run
//! SQLite store so every player-visible narration is reproducible from
//! durable state.

pub mod checkpoint;
pub mod contracts;
pub mod modules;
pub mod pipeline;
pub mod project;
pub mod store;
