//! Pure projection from persisted events to the player transcript and the
//! per-turn debug trace.
//!
//! This module performs no I/O; it folds already-ordered event rows. The
//! projection is a pure function of the rows, so reading it any number of
//! times yields the same result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contracts::EventType;

use super::EventRow;

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    Player,
    Engine,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub turn: i64,
    pub role: ChatRole,
    pub text: String,
}

/// One debug entry: the full turn trace as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugEntry {
    pub timestamp: String,
    pub turn: i64,
    pub trace: Value,
}

/// Reconstituted session view for UI clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStateView {
    pub messages: Vec<ChatMessage>,
    pub debug_entries: Vec<DebugEntry>,
    pub next_turn: i64,
}

/// Fold events (already ordered by `(turn, id)`) into a session view.
pub fn project_session_state(events: &[EventRow], next_turn: i64) -> SessionStateView {
    let mut messages = Vec::new();
    let mut debug_entries = Vec::new();

    for row in events {
        match row.event_type {
            EventType::PlayerInput => {
                if let Some(text) = row.payload.get("text").and_then(Value::as_str) {
                    messages.push(ChatMessage {
                        turn: row.turn,
                        role: ChatRole::Player,
                        text: text.to_string(),
                    });
                }
            }
            EventType::ModuleTrace => {
                if let Some(text) = row.payload.get("narrationText").and_then(Value::as_str) {
                    messages.push(ChatMessage {
                        turn: row.turn,
                        role: ChatRole::Engine,
                        text: text.to_string(),
                    });
                }
                debug_entries.push(DebugEntry {
                    timestamp: row.created_at.clone(),
                    turn: row.turn,
                    trace: row.payload.clone(),
                });
            }
            EventType::CommittedDiff => {}
        }
    }

    SessionStateView {
        messages,
        debug_entries,
        next_turn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: i64, turn: i64, event_type: EventType, payload: Value) -> EventRow {
        EventRow {
            id,
            turn,
            event_type,
            payload,
            created_at: format!("2026-01-01T00:00:{id:02}Z"),
        }
    }

    #[test]
    fn folds_player_and_engine_messages_in_turn_order() {
        let events = vec![
            event(1, 1, EventType::PlayerInput, json!({ "text": "Look around." })),
            event(
                2,
                1,
                EventType::ModuleTrace,
                json!({ "narrationText": "Dust sweeps the deck.", "turn": 1 }),
            ),
            event(3, 1, EventType::CommittedDiff, json!({ "turn": 1 })),
            event(4, 2, EventType::PlayerInput, json!({ "text": "Head north." })),
        ];

        let view = project_session_state(&events, 2);
        assert_eq!(view.next_turn, 2);
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.messages[0].role, ChatRole::Player);
        assert_eq!(view.messages[1].role, ChatRole::Engine);
        assert_eq!(view.messages[1].text, "Dust sweeps the deck.");
        assert_eq!(view.messages[2].turn, 2);

        assert_eq!(view.debug_entries.len(), 1);
        assert_eq!(view.debug_entries[0].turn, 1);
        assert_eq!(view.debug_entries[0].trace["narrationText"], "Dust sweeps the deck.");
    }

    #[test]
    fn projection_is_idempotent() {
        let events = vec![
            event(1, 1, EventType::PlayerInput, json!({ "text": "Hi." })),
            event(2, 1, EventType::ModuleTrace, json!({ "narrationText": "Hello." })),
        ];
        let first = project_session_state(&events, 2);
        let second = project_session_state(&events, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_store_defaults_to_turn_one() {
        let view = project_session_state(&[], 1);
        assert!(view.messages.is_empty());
        assert!(view.debug_entries.is_empty());
        assert_eq!(view.next_turn, 1);
    }
}
