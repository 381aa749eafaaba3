//! The fixed-stage pipeline: stage identities, the refusal predicate, and
//! the driver that sequences stages, carries the checkpoint, and commits
//! turns.
//!
//! The pipeline is intentionally a linear list with a single boolean gate
//! (refusal), not a graph engine. Keeping the stage list finite and fixed is
//! what makes the ordering and trace invariants easy to state and check.

pub mod driver;
pub mod refusal;
pub mod stage;

pub use driver::{PipelineDriver, PipelineError, StepView};
pub use stage::{Stage, FRONTEND_INPUT_STAGE, STAGES};
