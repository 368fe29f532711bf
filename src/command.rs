//! Client commands and their translation into domain events.
//!
//! Commands are intents; events are facts. [`translate`] is a pure
//! decision function: it validates a command against the current
//! projection and produces exactly one event, or a [`CommandError`] whose
//! display text becomes the negative acknowledgement sent back to the
//! submitter. No I/O happens here; timestamps come from the caller's
//! clock at acceptance.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::event::Event;
use crate::projection::Projection;

/// Gap left between auto-assigned sort orders so clients can reorder
/// between existing items without renumbering.
const SORT_ORDER_STEP: i64 = 1000;

/// A client intent, internally tagged by the `type` discriminant.
///
/// Every command carries a client-chosen `commandId` used to correlate
/// the acknowledgement. `sortOrder` fields arrive as JSON numbers that
/// may be fractional; they are integer-truncated during translation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Command {
    CreateTodo {
        #[serde(default)]
        command_id: String,
        id: String,
        name: String,
        #[serde(default)]
        sort_order: f64,
        #[serde(default)]
        category_id: Option<String>,
    },
    CompleteTodo {
        #[serde(default)]
        command_id: String,
        id: String,
    },
    UncompleteTodo {
        #[serde(default)]
        command_id: String,
        id: String,
    },
    StarTodo {
        #[serde(default)]
        command_id: String,
        id: String,
    },
    UnstarTodo {
        #[serde(default)]
        command_id: String,
        id: String,
    },
    ReorderTodo {
        #[serde(default)]
        command_id: String,
        id: String,
        sort_order: f64,
    },
    RenameTodo {
        #[serde(default)]
        command_id: String,
        id: String,
        name: String,
    },
    CategorizeTodo {
        #[serde(default)]
        command_id: String,
        id: String,
        #[serde(default)]
        category_id: Option<String>,
    },
    CreateCategory {
        #[serde(default)]
        command_id: String,
        id: String,
        name: String,
        #[serde(default)]
        sort_order: f64,
    },
    RenameCategory {
        #[serde(default)]
        command_id: String,
        id: String,
        name: String,
    },
    DeleteCategory {
        #[serde(default)]
        command_id: String,
        id: String,
    },
    ReorderCategory {
        #[serde(default)]
        command_id: String,
        id: String,
        sort_order: f64,
    },
    SetListTitle {
        #[serde(default)]
        command_id: String,
        title: String,
    },
}

impl Command {
    /// The client-chosen correlation id for the acknowledgement.
    pub fn command_id(&self) -> &str {
        match self {
            Command::CreateTodo { command_id, .. }
            | Command::CompleteTodo { command_id, .. }
            | Command::UncompleteTodo { command_id, .. }
            | Command::StarTodo { command_id, .. }
            | Command::UnstarTodo { command_id, .. }
            | Command::ReorderTodo { command_id, .. }
            | Command::RenameTodo { command_id, .. }
            | Command::CategorizeTodo { command_id, .. }
            | Command::CreateCategory { command_id, .. }
            | Command::RenameCategory { command_id, .. }
            | Command::DeleteCategory { command_id, .. }
            | Command::ReorderCategory { command_id, .. }
            | Command::SetListTitle { command_id, .. } => command_id,
        }
    }

    /// The `type` discriminant string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateTodo { .. } => "CreateTodo",
            Command::CompleteTodo { .. } => "CompleteTodo",
            Command::UncompleteTodo { .. } => "UncompleteTodo",
            Command::StarTodo { .. } => "StarTodo",
            Command::UnstarTodo { .. } => "UnstarTodo",
            Command::ReorderTodo { .. } => "ReorderTodo",
            Command::RenameTodo { .. } => "RenameTodo",
            Command::CategorizeTodo { .. } => "CategorizeTodo",
            Command::CreateCategory { .. } => "CreateCategory",
            Command::RenameCategory { .. } => "RenameCategory",
            Command::DeleteCategory { .. } => "DeleteCategory",
            Command::ReorderCategory { .. } => "ReorderCategory",
            Command::SetListTitle { .. } => "SetListTitle",
        }
    }
}

/// Command rejected by validation; the display text is sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("missing todo id")]
    MissingTodoId,

    #[error("missing category id")]
    MissingCategoryId,

    #[error("todo not found")]
    TodoNotFound,

    #[error("category not found")]
    CategoryNotFound,

    /// The category a todo is being filed under does not exist.
    #[error("category does not exist")]
    CategoryDoesNotExist,

    /// An active category already uses this exact-case name.
    #[error("category with name '{0}' already exists")]
    DuplicateCategoryName(String),

    #[error("cannot delete non-empty category")]
    CategoryNotEmpty,
}

/// Validate a command against current state and produce its event.
///
/// # Arguments
///
/// * `state` - The projection at acceptance time; read-only.
/// * `command` - The client intent to validate.
/// * `now` - Server-side acceptance instant, stamped on created/completed
///   events.
///
/// # Errors
///
/// Returns [`CommandError`] when the command violates a state invariant;
/// nothing is persisted in that case.
pub fn translate(
    state: &Projection,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<Event, CommandError> {
    match command {
        Command::CreateTodo {
            id,
            name,
            sort_order,
            category_id,
            ..
        } => {
            if id.is_empty() {
                return Err(CommandError::MissingTodoId);
            }
            Ok(Event::TodoCreated {
                id: id.clone(),
                name: name.clone(),
                created_at: now,
                sort_order: assign_sort_order(*sort_order, state.highest_todo_sort_order()),
                category_id: category_id.clone(),
            })
        }

        Command::CompleteTodo { id, .. } => Ok(Event::TodoCompleted {
            id: id.clone(),
            completed_at: now,
        }),

        Command::UncompleteTodo { id, .. } => Ok(Event::TodoUncompleted { id: id.clone() }),

        Command::StarTodo { id, .. } => Ok(Event::TodoStarred {
            id: id.clone(),
            sort_order: state.highest_todo_sort_order() + SORT_ORDER_STEP,
        }),

        Command::UnstarTodo { id, .. } => Ok(Event::TodoUnstarred { id: id.clone() }),

        Command::ReorderTodo { id, sort_order, .. } => Ok(Event::TodoReordered {
            id: id.clone(),
            sort_order: *sort_order as i64,
        }),

        Command::RenameTodo { id, name, .. } => Ok(Event::TodoRenamed {
            id: id.clone(),
            name: name.clone(),
        }),

        Command::CategorizeTodo {
            id, category_id, ..
        } => {
            if let Some(category_id) = category_id {
                if state.get_category(category_id).is_none() {
                    return Err(CommandError::CategoryDoesNotExist);
                }
            }
            if state.get_todo(id).is_none() {
                return Err(CommandError::TodoNotFound);
            }
            Ok(Event::TodoCategorized {
                id: id.clone(),
                category_id: category_id.clone(),
            })
        }

        Command::CreateCategory {
            id,
            name,
            sort_order,
            ..
        } => {
            if id.is_empty() {
                return Err(CommandError::MissingCategoryId);
            }
            if state.category_name_exists(name) {
                return Err(CommandError::DuplicateCategoryName(name.clone()));
            }
            // A deleted category with the exact same name resurrects its
            // old id, so references in old events stay meaningful.
            let id = state
                .find_deleted_category_by_name(name)
                .unwrap_or_else(|| id.clone());
            Ok(Event::CategoryCreated {
                id,
                name: name.clone(),
                created_at: now,
                sort_order: assign_sort_order(*sort_order, state.highest_category_sort_order()),
            })
        }

        Command::RenameCategory { id, name, .. } => {
            let Some(current) = state.get_category(id) else {
                return Err(CommandError::CategoryNotFound);
            };
            // Renaming a category to its own name is an accepted no-op.
            if state.category_name_exists(name) && current.name != *name {
                return Err(CommandError::DuplicateCategoryName(name.clone()));
            }
            Ok(Event::CategoryRenamed {
                id: id.clone(),
                name: name.clone(),
            })
        }

        Command::DeleteCategory { id, .. } => {
            if state.category_has_todos(id) {
                return Err(CommandError::CategoryNotEmpty);
            }
            if state.get_category(id).is_none() {
                return Err(CommandError::CategoryNotFound);
            }
            Ok(Event::CategoryDeleted { id: id.clone() })
        }

        Command::ReorderCategory { id, sort_order, .. } => {
            if state.get_category(id).is_none() {
                return Err(CommandError::CategoryNotFound);
            }
            Ok(Event::CategoryReordered {
                id: id.clone(),
                sort_order: *sort_order as i64,
            })
        }

        Command::SetListTitle { title, .. } => Ok(Event::ListTitleChanged {
            title: title.clone(),
        }),
    }
}

/// Client-provided sort order if nonzero, else one step above the highest.
fn assign_sort_order(requested: f64, highest: i64) -> i64 {
    if requested != 0.0 {
        requested as i64
    } else {
        highest + SORT_ORDER_STEP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn state_with(events: &[Event]) -> Projection {
        let mut state = Projection::default();
        state.apply_all(events);
        state
    }

    fn create_todo(id: &str, name: &str) -> Command {
        Command::CreateTodo {
            command_id: "cmd-1".into(),
            id: id.into(),
            name: name.into(),
            sort_order: 0.0,
            category_id: None,
        }
    }

    #[test]
    fn parse_create_todo_frame() {
        let frame = r#"{"type":"CreateTodo","commandId":"k1","id":"a","name":"Milk"}"#;
        let command: Command = serde_json::from_str(frame).expect("parse should succeed");
        assert_eq!(command.command_id(), "k1");
        assert_eq!(command.kind(), "CreateTodo");
    }

    #[test]
    fn parse_unknown_command_type_fails() {
        let frame = r#"{"type":"ExplodeTodo","commandId":"k1","id":"a"}"#;
        assert!(serde_json::from_str::<Command>(frame).is_err());
    }

    #[test]
    fn parse_tolerates_missing_command_id() {
        let frame = r#"{"type":"CompleteTodo","id":"a"}"#;
        let command: Command = serde_json::from_str(frame).expect("parse should succeed");
        assert_eq!(command.command_id(), "");
    }

    #[test]
    fn create_todo_auto_assigns_above_highest() {
        let state = state_with(&[Event::TodoCreated {
            id: "a".into(),
            name: "Milk".into(),
            created_at: now(),
            sort_order: 1000,
            category_id: None,
        }]);

        let event = translate(&state, &create_todo("b", "Bread"), now()).unwrap();
        assert!(
            matches!(event, Event::TodoCreated { sort_order: 2000, .. }),
            "expected highest + 1000, got {event:?}"
        );
    }

    #[test]
    fn create_todo_respects_explicit_sort_order() {
        let state = Projection::default();
        let command = Command::CreateTodo {
            command_id: "cmd-1".into(),
            id: "a".into(),
            name: "Milk".into(),
            sort_order: 750.9,
            category_id: None,
        };
        let event = translate(&state, &command, now()).unwrap();
        assert!(
            matches!(event, Event::TodoCreated { sort_order: 750, .. }),
            "fractional sort orders truncate, got {event:?}"
        );
    }

    #[test]
    fn create_todo_with_empty_id_is_rejected() {
        let state = Projection::default();
        let err = translate(&state, &create_todo("", "Milk"), now()).unwrap_err();
        assert_eq!(err, CommandError::MissingTodoId);
    }

    #[test]
    fn star_promotes_above_current_highest() {
        let state = state_with(&[
            Event::TodoCreated {
                id: "a".into(),
                name: "Milk".into(),
                created_at: now(),
                sort_order: 1000,
                category_id: None,
            },
            Event::TodoCreated {
                id: "b".into(),
                name: "Bread".into(),
                created_at: now(),
                sort_order: 3000,
                category_id: None,
            },
        ]);

        let command = Command::StarTodo {
            command_id: "cmd-1".into(),
            id: "a".into(),
        };
        let event = translate(&state, &command, now()).unwrap();
        match event {
            Event::TodoStarred { sort_order, .. } => {
                assert!(sort_order > 3000, "star must promote above the highest");
            }
            other => panic!("expected TodoStarred, got {other:?}"),
        }
    }

    #[test]
    fn categorize_requires_existing_todo_and_category() {
        let state = state_with(&[Event::CategoryCreated {
            id: "c1".into(),
            name: "Work".into(),
            created_at: now(),
            sort_order: 1000,
        }]);

        let missing_todo = Command::CategorizeTodo {
            command_id: "cmd-1".into(),
            id: "ghost".into(),
            category_id: Some("c1".into()),
        };
        assert_eq!(
            translate(&state, &missing_todo, now()).unwrap_err(),
            CommandError::TodoNotFound
        );

        let missing_category = Command::CategorizeTodo {
            command_id: "cmd-2".into(),
            id: "ghost".into(),
            category_id: Some("nope".into()),
        };
        assert_eq!(
            translate(&state, &missing_category, now()).unwrap_err(),
            CommandError::CategoryDoesNotExist
        );
    }

    #[test]
    fn uncategorize_with_null_is_accepted() {
        let state = state_with(&[Event::TodoCreated {
            id: "a".into(),
            name: "Milk".into(),
            created_at: now(),
            sort_order: 1000,
            category_id: None,
        }]);
        let command = Command::CategorizeTodo {
            command_id: "cmd-1".into(),
            id: "a".into(),
            category_id: None,
        };
        let event = translate(&state, &command, now()).unwrap();
        assert!(matches!(event, Event::TodoCategorized { category_id: None, .. }));
    }

    #[test]
    fn duplicate_active_category_name_is_rejected() {
        let state = state_with(&[Event::CategoryCreated {
            id: "c1".into(),
            name: "Work".into(),
            created_at: now(),
            sort_order: 1000,
        }]);
        let command = Command::CreateCategory {
            command_id: "cmd-1".into(),
            id: "c2".into(),
            name: "Work".into(),
            sort_order: 0.0,
        };
        let err = translate(&state, &command, now()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn case_differing_category_names_are_permitted() {
        let state = state_with(&[Event::CategoryCreated {
            id: "c1".into(),
            name: "Work".into(),
            created_at: now(),
            sort_order: 1000,
        }]);
        let command = Command::CreateCategory {
            command_id: "cmd-1".into(),
            id: "c2".into(),
            name: "WORK".into(),
            sort_order: 0.0,
        };
        assert!(translate(&state, &command, now()).is_ok());
    }

    #[test]
    fn deleted_category_id_is_resurrected_on_exact_name() {
        let state = state_with(&[
            Event::CategoryCreated {
                id: "c1".into(),
                name: "Work".into(),
                created_at: now(),
                sort_order: 1000,
            },
            Event::CategoryDeleted { id: "c1".into() },
        ]);
        let command = Command::CreateCategory {
            command_id: "cmd-1".into(),
            id: "c9".into(),
            name: "Work".into(),
            sort_order: 0.0,
        };
        let event = translate(&state, &command, now()).unwrap();
        assert!(
            matches!(event, Event::CategoryCreated { ref id, .. } if id == "c1"),
            "expected resurrected id c1, got {event:?}"
        );
    }

    #[test]
    fn rename_category_to_own_name_is_a_noop_rename() {
        let state = state_with(&[Event::CategoryCreated {
            id: "c1".into(),
            name: "Work".into(),
            created_at: now(),
            sort_order: 1000,
        }]);
        let command = Command::RenameCategory {
            command_id: "cmd-1".into(),
            id: "c1".into(),
            name: "Work".into(),
        };
        assert!(translate(&state, &command, now()).is_ok());
    }

    #[test]
    fn rename_category_onto_another_is_rejected() {
        let state = state_with(&[
            Event::CategoryCreated {
                id: "c1".into(),
                name: "Work".into(),
                created_at: now(),
                sort_order: 1000,
            },
            Event::CategoryCreated {
                id: "c2".into(),
                name: "Home".into(),
                created_at: now(),
                sort_order: 2000,
            },
        ]);
        let command = Command::RenameCategory {
            command_id: "cmd-1".into(),
            id: "c2".into(),
            name: "Work".into(),
        };
        assert_eq!(
            translate(&state, &command, now()).unwrap_err(),
            CommandError::DuplicateCategoryName("Work".into())
        );
    }

    #[test]
    fn delete_category_with_todos_is_rejected() {
        let state = state_with(&[
            Event::CategoryCreated {
                id: "c1".into(),
                name: "Work".into(),
                created_at: now(),
                sort_order: 1000,
            },
            Event::TodoCreated {
                id: "a".into(),
                name: "Report".into(),
                created_at: now(),
                sort_order: 1000,
                category_id: Some("c1".into()),
            },
        ]);
        let command = Command::DeleteCategory {
            command_id: "cmd-1".into(),
            id: "c1".into(),
        };
        assert_eq!(
            translate(&state, &command, now()).unwrap_err(),
            CommandError::CategoryNotEmpty
        );
    }

    #[test]
    fn delete_missing_category_is_rejected() {
        let state = Projection::default();
        let command = Command::DeleteCategory {
            command_id: "cmd-1".into(),
            id: "ghost".into(),
        };
        assert_eq!(
            translate(&state, &command, now()).unwrap_err(),
            CommandError::CategoryNotFound
        );
    }

    #[test]
    fn reorder_category_truncates_fractional_sort_order() {
        let state = state_with(&[Event::CategoryCreated {
            id: "c1".into(),
            name: "Work".into(),
            created_at: now(),
            sort_order: 1000,
        }]);
        let command = Command::ReorderCategory {
            command_id: "cmd-1".into(),
            id: "c1".into(),
            sort_order: 1500.7,
        };
        let event = translate(&state, &command, now()).unwrap();
        assert!(matches!(event, Event::CategoryReordered { sort_order: 1500, .. }));
    }

    #[test]
    fn timestamps_come_from_the_injected_clock() {
        let state = Projection::default();
        let accepted_at = Utc.with_ymd_and_hms(2030, 6, 15, 12, 30, 0).unwrap();
        let event = translate(&state, &create_todo("a", "Milk"), accepted_at).unwrap();
        assert!(matches!(event, Event::TodoCreated { created_at, .. } if created_at == accepted_at));
    }
}
