//! Wire protocol frames for the bidirectional text channel.
//!
//! All frames are JSON with a `type` discriminant. Domain events
//! broadcast after persistence use their own encoding from
//! [`crate::event`]; this module covers everything else: the snapshot
//! and presence frames the server pushes, the acknowledgement frames it
//! unicasts, and the autocomplete request clients send.

use serde::{Deserialize, Serialize};

use crate::event::{Category, Todo};
use crate::suggest::Suggestion;

/// Server-to-client frames (other than broadcast domain events).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full snapshot of the projection; always the first frame a newly
    /// connected client receives.
    StateRollup {
        todos: Vec<Todo>,
        categories: Vec<Category>,
        list_title: String,
    },
    /// Presence update, broadcast on every register/unregister.
    ClientCount { count: usize },
    /// Acknowledgement, unicast to the command's submitter.
    CommandResponse {
        command_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Ranked suggestions, unicast to the requester.
    AutocompleteResponse {
        suggestions: Vec<Suggestion>,
        request_id: String,
    },
}

impl ServerMessage {
    /// A positive acknowledgement for the given command.
    pub fn ack(command_id: impl Into<String>) -> ServerMessage {
        ServerMessage::CommandResponse {
            command_id: command_id.into(),
            success: true,
            error: None,
        }
    }

    /// A negative acknowledgement carrying the rejection text.
    pub fn nack(command_id: impl Into<String>, error: impl Into<String>) -> ServerMessage {
        ServerMessage::CommandResponse {
            command_id: command_id.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// A client's request for autocomplete suggestions.
///
/// Answered privately on the requesting session; never broadcast.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub request_id: String,
}

/// Read just the `type` discriminant of an inbound frame.
///
/// Returns `None` when the frame is not a JSON object with a string
/// `type` field; the caller then treats it as a malformed command.
pub fn frame_kind(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
}
