//! In-memory projection of the event log into queryable current state.
//!
//! The projection exclusively owns the entity tables. It is written only
//! via [`Projection::apply`] and read through snapshot methods that return
//! defensive copies, so no caller can observe or cause a partial mutation.
//!
//! # Contract
//!
//! - `apply` must be deterministic: replaying the same event sequence
//!   always reproduces the same state, including the derived indices.
//! - Events referring to unknown entity ids are silently ignored; they
//!   were valid when written and must never fail a replay.

use std::collections::HashMap;

use crate::event::{Category, Event, Todo};

/// One-shot copy of the projection sent to a newly connected client.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Todos sorted by `sort_order` descending.
    pub todos: Vec<Todo>,
    /// Categories sorted by `sort_order` descending.
    pub categories: Vec<Category>,
    pub list_title: String,
}

/// Current state of the list, folded from the event log.
///
/// Besides the entity tables this tracks the derived indices the
/// autocomplete ranker and command validator need: how often each name has
/// ever been used, its most recent casing, the category it was last filed
/// under, and the names of deleted categories (for id resurrection).
#[derive(Debug, Clone)]
pub struct Projection {
    todos: HashMap<String, Todo>,
    categories: HashMap<String, Category>,
    /// Deleted category id -> exact-case name at deletion.
    deleted_categories: HashMap<String, String>,
    list_title: String,
    /// Case-folded name -> occurrences across all creates and renames.
    name_frequency: HashMap<String, u64>,
    /// Case-folded name -> most recently seen original casing.
    name_canonical: HashMap<String, String>,
    /// Case-folded name -> category id of the most recent assignment.
    /// `Some(None)` records an explicit uncategorize.
    name_last_category: HashMap<String, Option<String>>,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            todos: HashMap::new(),
            categories: HashMap::new(),
            deleted_categories: HashMap::new(),
            list_title: "My Todo List".to_string(),
            name_frequency: HashMap::new(),
            name_canonical: HashMap::new(),
            name_last_category: HashMap::new(),
        }
    }
}

impl Projection {
    /// Apply a single event, mutating the tables and derived indices.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::TodoCreated {
                id,
                name,
                created_at,
                sort_order,
                category_id,
            } => {
                self.todos.insert(
                    id.clone(),
                    Todo {
                        id: id.clone(),
                        name: name.clone(),
                        created_at: *created_at,
                        completed_at: None,
                        sort_order: *sort_order,
                        starred: false,
                        category_id: category_id.clone(),
                    },
                );
                self.track_name_frequency(name);
                self.track_last_category(name, category_id.as_deref());
            }

            Event::TodoCompleted { id, completed_at } => {
                if let Some(todo) = self.todos.get_mut(id) {
                    todo.completed_at = Some(*completed_at);
                }
            }

            Event::TodoUncompleted { id } => {
                if let Some(todo) = self.todos.get_mut(id) {
                    todo.completed_at = None;
                }
            }

            Event::TodoStarred { id, sort_order } => {
                if let Some(todo) = self.todos.get_mut(id) {
                    todo.starred = true;
                    todo.sort_order = *sort_order;
                }
            }

            Event::TodoUnstarred { id } => {
                // Unstar deliberately leaves sort_order where starring put it.
                if let Some(todo) = self.todos.get_mut(id) {
                    todo.starred = false;
                }
            }

            Event::TodoReordered { id, sort_order } => {
                if let Some(todo) = self.todos.get_mut(id) {
                    todo.sort_order = *sort_order;
                }
            }

            Event::TodoRenamed { id, name } => {
                let category_id = match self.todos.get_mut(id) {
                    Some(todo) => {
                        todo.name = name.clone();
                        Some(todo.category_id.clone())
                    }
                    None => None,
                };
                if let Some(category_id) = category_id {
                    self.track_name_frequency(name);
                    self.track_last_category(name, category_id.as_deref());
                }
            }

            Event::TodoCategorized { id, category_id } => {
                let name = match self.todos.get_mut(id) {
                    Some(todo) => {
                        todo.category_id = category_id.clone();
                        Some(todo.name.clone())
                    }
                    None => None,
                };
                if let Some(name) = name {
                    self.track_last_category(&name, category_id.as_deref());
                }
            }

            Event::CategoryCreated {
                id,
                name,
                created_at,
                sort_order,
            } => {
                self.categories.insert(
                    id.clone(),
                    Category {
                        id: id.clone(),
                        name: name.clone(),
                        created_at: *created_at,
                        sort_order: *sort_order,
                    },
                );
                // The id is live again; forget its deleted incarnation.
                self.deleted_categories.remove(id);
            }

            Event::CategoryRenamed { id, name } => {
                if let Some(category) = self.categories.get_mut(id) {
                    category.name = name.clone();
                }
            }

            Event::CategoryDeleted { id } => {
                if let Some(category) = self.categories.remove(id) {
                    self.deleted_categories.insert(id.clone(), category.name);
                }
            }

            Event::CategoryReordered { id, sort_order } => {
                if let Some(category) = self.categories.get_mut(id) {
                    category.sort_order = *sort_order;
                }
            }

            Event::ListTitleChanged { title } => {
                self.list_title = title.clone();
            }
        }
    }

    /// Apply a sequence of events in order.
    pub fn apply_all(&mut self, events: &[Event]) {
        for event in events {
            self.apply(event);
        }
    }

    fn track_name_frequency(&mut self, name: &str) {
        let key = name.to_lowercase();
        *self.name_frequency.entry(key.clone()).or_insert(0) += 1;
        self.name_canonical.insert(key, name.to_string());
    }

    fn track_last_category(&mut self, name: &str, category_id: Option<&str>) {
        self.name_last_category
            .insert(name.to_lowercase(), category_id.map(str::to_owned));
    }

    /// All todos, cloned and sorted by `sort_order` descending.
    ///
    /// The sort is stable; equal sort orders keep their iteration order.
    pub fn todos(&self) -> Vec<Todo> {
        let mut todos: Vec<Todo> = self.todos.values().cloned().collect();
        todos.sort_by(|a, b| b.sort_order.cmp(&a.sort_order));
        todos
    }

    /// All categories, cloned and sorted by `sort_order` descending.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.categories.values().cloned().collect();
        categories.sort_by(|a, b| b.sort_order.cmp(&a.sort_order));
        categories
    }

    /// A single todo by id, as a defensive copy.
    pub fn get_todo(&self, id: &str) -> Option<Todo> {
        self.todos.get(id).cloned()
    }

    /// A single category by id, as a defensive copy.
    pub fn get_category(&self, id: &str) -> Option<Category> {
        self.categories.get(id).cloned()
    }

    pub fn list_title(&self) -> &str {
        &self.list_title
    }

    /// Build the full rollup sent to a newly connected client.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            todos: self.todos(),
            categories: self.categories(),
            list_title: self.list_title.clone(),
        }
    }

    /// The highest `sort_order` among all todos, floored at zero.
    pub fn highest_todo_sort_order(&self) -> i64 {
        self.todos.values().map(|t| t.sort_order).max().unwrap_or(0).max(0)
    }

    /// The highest `sort_order` among all categories, floored at zero.
    pub fn highest_category_sort_order(&self) -> i64 {
        self.categories
            .values()
            .map(|c| c.sort_order)
            .max()
            .unwrap_or(0)
            .max(0)
    }

    /// Whether any todo (active or completed) references the category.
    pub fn category_has_todos(&self, category_id: &str) -> bool {
        self.todos
            .values()
            .any(|t| t.category_id.as_deref() == Some(category_id))
    }

    /// Whether an active category with this exact-case name exists.
    pub fn category_name_exists(&self, name: &str) -> bool {
        self.categories.values().any(|c| c.name == name)
    }

    /// The id of a deleted category whose name matches exactly, if any.
    pub fn find_deleted_category_by_name(&self, name: &str) -> Option<String> {
        self.deleted_categories
            .iter()
            .find(|(_, deleted_name)| deleted_name.as_str() == name)
            .map(|(id, _)| id.clone())
    }

    /// Every name ever used, in its most recent casing, with its count.
    pub fn name_frequency(&self) -> HashMap<String, u64> {
        self.name_frequency
            .iter()
            .map(|(key, count)| {
                let canonical = self
                    .name_canonical
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| key.clone());
                (canonical, *count)
            })
            .collect()
    }

    /// Names of all todos that are not completed.
    pub fn active_todo_names(&self) -> Vec<String> {
        self.todos
            .values()
            .filter(|t| t.completed_at.is_none())
            .map(|t| t.name.clone())
            .collect()
    }

    /// The category most recently assigned to any todo with this name.
    ///
    /// Returns `None` both when the name was never categorized and when
    /// the most recent assignment was an explicit uncategorize.
    pub fn last_category_for_name(&self, name: &str) -> Option<String> {
        self.name_last_category
            .get(&name.to_lowercase())
            .cloned()
            .flatten()
    }
}
