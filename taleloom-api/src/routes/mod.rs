//! Route modules, one per resource group.

pub mod game_project;
pub mod health;
pub mod run;
pub mod turn;

use uuid::Uuid;

/// Fresh request identifier, echoed in error envelopes and turn traces.
pub fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}
