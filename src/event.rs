//! Event encoding, decoding, and shared types for the append-only log.
//!
//! This module provides the domain event sum type and the pure line-level
//! codec that the store, projection, and session modules all depend on. No
//! I/O occurs here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A to-do item as projected from events.
///
/// `completed_at` and `category_id` serialize as explicit `null` when
/// absent; connected clients rely on the keys being present in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Opaque client-chosen identifier, unique and immutable.
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Higher values sort higher in the list.
    pub sort_order: i64,
    pub starred: bool,
    pub category_id: Option<String>,
}

/// A category as projected from events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub sort_order: i64,
}

/// An immutable domain fact recorded in the event log.
///
/// The closed set of event variants, internally tagged by the `type`
/// discriminant. Each variant carries exactly the payload it needs; none
/// are widened with unused optional fields. The JSON encoding of a variant
/// is one log record (and one broadcast frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Event {
    TodoCreated {
        id: String,
        name: String,
        created_at: DateTime<Utc>,
        sort_order: i64,
        category_id: Option<String>,
    },
    TodoCompleted {
        id: String,
        completed_at: DateTime<Utc>,
    },
    TodoUncompleted {
        id: String,
    },
    TodoStarred {
        id: String,
        sort_order: i64,
    },
    TodoUnstarred {
        id: String,
    },
    TodoReordered {
        id: String,
        sort_order: i64,
    },
    TodoRenamed {
        id: String,
        name: String,
    },
    /// `category_id: None` means uncategorize.
    TodoCategorized {
        id: String,
        category_id: Option<String>,
    },
    CategoryCreated {
        id: String,
        name: String,
        created_at: DateTime<Utc>,
        sort_order: i64,
    },
    CategoryRenamed {
        id: String,
        name: String,
    },
    CategoryDeleted {
        id: String,
    },
    CategoryReordered {
        id: String,
        sort_order: i64,
    },
    ListTitleChanged {
        title: String,
    },
}

/// Every `type` discriminant the codec accepts.
///
/// Replay fails on anything outside this list, so schema evolution must
/// reserve new names rather than retire old ones.
const EVENT_KINDS: &[&str] = &[
    "TodoCreated",
    "TodoCompleted",
    "TodoUncompleted",
    "TodoStarred",
    "TodoUnstarred",
    "TodoReordered",
    "TodoRenamed",
    "TodoCategorized",
    "CategoryCreated",
    "CategoryRenamed",
    "CategoryDeleted",
    "CategoryReordered",
    "ListTitleChanged",
];

/// Error produced when decoding a log record or broadcast frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The `type` discriminant names no known event variant.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    /// The record is not valid JSON, lacks a `type` field, or its fields
    /// do not match the variant's schema (e.g. a non-integer `sortOrder`).
    #[error("malformed event record: {0}")]
    Malformed(String),
}

impl Event {
    /// The `type` discriminant string for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TodoCreated { .. } => "TodoCreated",
            Event::TodoCompleted { .. } => "TodoCompleted",
            Event::TodoUncompleted { .. } => "TodoUncompleted",
            Event::TodoStarred { .. } => "TodoStarred",
            Event::TodoUnstarred { .. } => "TodoUnstarred",
            Event::TodoReordered { .. } => "TodoReordered",
            Event::TodoRenamed { .. } => "TodoRenamed",
            Event::TodoCategorized { .. } => "TodoCategorized",
            Event::CategoryCreated { .. } => "CategoryCreated",
            Event::CategoryRenamed { .. } => "CategoryRenamed",
            Event::CategoryDeleted { .. } => "CategoryDeleted",
            Event::CategoryReordered { .. } => "CategoryReordered",
            Event::ListTitleChanged { .. } => "ListTitleChanged",
        }
    }

    /// Parse a single log record (or inbound frame) into an event.
    ///
    /// Reads the `type` discriminant first so that an unrecognized kind is
    /// reported distinctly from a structurally broken record.
    ///
    /// # Errors
    ///
    /// * [`CodecError::UnknownKind`] -- the `type` field names no variant.
    /// * [`CodecError::Malformed`] -- invalid JSON, missing `type`, or
    ///   payload fields that do not match the variant's schema.
    pub fn parse(line: &str) -> Result<Event, CodecError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| CodecError::Malformed(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| CodecError::Malformed("missing 'type' field".to_string()))?;
        if !EVENT_KINDS.contains(&kind) {
            return Err(CodecError::UnknownKind(kind.to_string()));
        }
        serde_json::from_value(value).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    /// Encode this event as a single-line JSON record, `type` included.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if serialization fails.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
