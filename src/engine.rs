//! Engine task that owns the projection and drives the command pipeline.
//!
//! The engine is the single task allowed to touch the [`Projection`]. It
//! processes messages sequentially from an mpsc channel and replies over
//! oneshot channels, so snapshot reads never observe a partial apply and
//! two commands can never validate against the same state concurrently.
//!
//! For each accepted command the pipeline is: translate against current
//! state, append to the log (await the durability sync), then apply to
//! the projection. A failed append leaves the projection untouched.
//!
//! Public API: [`EngineHandle`] (cloneable async facade) and
//! [`spawn_engine`] (replays the log and starts the task).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::command::{translate, Command, CommandError};
use crate::event::Event;
use crate::projection::{Projection, Snapshot};
use crate::store::{EventLog, ReadError};
use crate::suggest::{suggest, Suggestion};

/// Source of server-side timestamps, injected so tests can pin time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The wall clock; what the server binary uses.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Error returned when executing a command through the engine fails.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Command rejected by validation; nothing was written.
    #[error(transparent)]
    Rejected(#[from] CommandError),

    /// The append or its durability sync failed; the projection was not
    /// mutated and nothing is broadcast.
    #[error("failed to persist event")]
    Persist(#[source] std::io::Error),

    /// The engine task has exited.
    #[error("engine is no longer running")]
    Gone,
}

/// Messages sent from [`EngineHandle`] to the engine task.
enum EngineMessage {
    /// Validate, persist, and apply one command.
    Execute {
        command: Command,
        reply: oneshot::Sender<Result<Event, EngineError>>,
    },
    /// Read a consistent full snapshot.
    Snapshot { reply: oneshot::Sender<Snapshot> },
    /// Rank autocomplete suggestions against current state.
    Suggest {
        query: String,
        reply: oneshot::Sender<Vec<Suggestion>>,
    },
}

/// Async handle to the running engine task.
///
/// Lightweight and cloneable; every session holds one.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Execute a command: validate, persist, apply.
    ///
    /// # Returns
    ///
    /// The persisted event on success, ready for broadcast.
    ///
    /// # Errors
    ///
    /// * [`EngineError::Rejected`] -- validation failed; no event written.
    /// * [`EngineError::Persist`] -- the append failed; state unchanged.
    /// * [`EngineError::Gone`] -- the engine task has exited.
    pub async fn execute(&self, command: Command) -> Result<Event, EngineError> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(EngineMessage::Execute { command, reply })
            .await
            .map_err(|_| EngineError::Gone)?;
        result.await.map_err(|_| EngineError::Gone)?
    }

    /// Read a consistent snapshot of the projection.
    ///
    /// # Errors
    ///
    /// [`EngineError::Gone`] if the engine task has exited.
    pub async fn snapshot(&self) -> Result<Snapshot, EngineError> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(EngineMessage::Snapshot { reply })
            .await
            .map_err(|_| EngineError::Gone)?;
        result.await.map_err(|_| EngineError::Gone)
    }

    /// Rank autocomplete suggestions for `query`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Gone`] if the engine task has exited.
    pub async fn suggest(&self, query: String) -> Result<Vec<Suggestion>, EngineError> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(EngineMessage::Suggest { query, reply })
            .await
            .map_err(|_| EngineError::Gone)?;
        result.await.map_err(|_| EngineError::Gone)
    }
}

/// Replay the log into a fresh projection and start the engine task.
///
/// Replay happens before the task starts: a log that fails to decode
/// refuses to produce an engine at all, which is what makes replay
/// failure fatal to the process.
///
/// # Arguments
///
/// * `log` - The opened event log; the engine becomes its only appender.
/// * `clock` - Source of acceptance timestamps.
///
/// # Errors
///
/// Returns [`ReadError`] if the log cannot be read or any record fails
/// to decode (including unknown event kinds).
pub fn spawn_engine(log: EventLog, clock: Clock) -> Result<EngineHandle, ReadError> {
    let events = log.read_all()?;
    let mut projection = Projection::default();
    projection.apply_all(&events);
    tracing::info!(event_count = events.len(), "replayed event log");

    let (sender, receiver) = mpsc::channel::<EngineMessage>(64);
    tokio::spawn(run_engine(log, projection, clock, receiver));

    Ok(EngineHandle { sender })
}

/// The engine loop: sole owner of the projection.
///
/// Exits when every [`EngineHandle`] is dropped.
async fn run_engine(
    log: EventLog,
    mut projection: Projection,
    clock: Clock,
    mut receiver: mpsc::Receiver<EngineMessage>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            EngineMessage::Execute { command, reply } => {
                let result = execute_command(&log, &mut projection, &clock, command).await;
                // A dropped receiver means the session is gone; the event
                // is already durable and applied either way.
                let _ = reply.send(result);
            }
            EngineMessage::Snapshot { reply } => {
                let _ = reply.send(projection.snapshot());
            }
            EngineMessage::Suggest { query, reply } => {
                let _ = reply.send(suggest(&projection, &query));
            }
        }
    }
    tracing::debug!("engine task stopped");
}

/// Translate, persist, apply. The projection mutates only after the
/// append's durability sync succeeds.
async fn execute_command(
    log: &EventLog,
    projection: &mut Projection,
    clock: &Clock,
    command: Command,
) -> Result<Event, EngineError> {
    let event = translate(projection, &command, clock())?;

    log.append(event.clone())
        .await
        .map_err(EngineError::Persist)?;

    projection.apply(&event);
    tracing::info!(kind = event.kind(), "event persisted");
    Ok(event)
}
