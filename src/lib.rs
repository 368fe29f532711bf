//! Collaborative to-do list backend built on an append-only event log.
//!
//! Every user action is a durable domain event; the live state is a
//! deterministic replay of the log, and all connected WebSocket clients
//! observe the same event stream in real time. Restarts rebuild state by
//! replaying `events.jsonl` -- no external database required.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Event`] | Domain fact: tagged sum type, one JSON line per record |
//! | [`EventLog`] | Durable log: single writer thread, fsync per record |
//! | [`Projection`] | In-memory reduction of the log plus derived indices |
//! | [`Command`] | Client intent: validated, then translated to one event |
//! | [`EngineHandle`] | Async handle to the task owning projection + log |
//! | [`HubHandle`] | Fan-out: registry of clients, broadcast with eviction |
//!
//! # Pipeline
//!
//! A session receives a command frame, the engine validates it against
//! current state, appends the resulting event (waiting for the
//! durability sync), applies it to the projection, and returns it. The
//! session acknowledges the submitter first, then hands the event to the
//! hub, which enqueues it to every connected client.

mod command;
pub mod config;
mod engine;
mod event;
mod hub;
mod projection;
mod protocol;
pub mod server;
mod session;
mod store;
mod suggest;

pub use command::{translate, Command, CommandError};
pub use engine::{spawn_engine, system_clock, Clock, EngineError, EngineHandle};
pub use event::{Category, CodecError, Event, Todo};
pub use hub::{spawn_hub, HubHandle, CLIENT_QUEUE_CAPACITY};
pub use projection::{Projection, Snapshot};
pub use protocol::{AutocompleteRequest, ServerMessage};
pub use store::{EventLog, ReadError};
pub use suggest::{contains_emoji, levenshtein, suggest, Suggestion};
