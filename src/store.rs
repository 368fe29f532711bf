//! Durable append-only event log backed by a newline-delimited JSON file.
//!
//! All writes are serialized through a single writer thread that
//! exclusively owns the append handle. Callers submit `{event, reply}`
//! over an mpsc channel and await the result; the reply is sent only
//! after the record is written and synced, so a successful `append` means
//! the event is durable. Reads open an independent handle per call --
//! writes are append-only and synced, so readers never observe a torn
//! record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use crate::event::{CodecError, Event};

/// Messages processed by the writer thread.
enum WriteRequest {
    /// Append one event; reply after write + sync.
    Append {
        event: Event,
        reply: oneshot::Sender<io::Result<()>>,
    },
    /// Flush and stop the writer; the file handle closes on thread exit.
    Shutdown { reply: oneshot::Sender<io::Result<()>> },
}

/// Error produced when reading the full log back.
///
/// Any failure is a replay failure: the log is canonical, and silently
/// skipping bad records would corrupt the derived state.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// Disk I/O failure while opening or reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record failed to decode (malformed JSON or unknown kind).
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Handle to the append-only event log.
///
/// Cheap to clone; all clones share the single writer thread. The writer
/// exits when every handle is dropped or [`close`](EventLog::close) is
/// called.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    sender: mpsc::Sender<WriteRequest>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteRequest::Append { event, .. } => {
                f.debug_struct("Append").field("kind", &event.kind()).finish()
            }
            WriteRequest::Shutdown { .. } => f.debug_struct("Shutdown").finish(),
        }
    }
}

impl EventLog {
    /// Open (creating if necessary) the log file and start the writer.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the newline-delimited log file, typically
    ///   `<data_dir>/events.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the file cannot be opened for appending.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<EventLog> {
        let path = path.into();
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        let (sender, receiver) = mpsc::channel::<WriteRequest>(32);

        std::thread::spawn(move || {
            writer_loop(file, receiver);
        });

        Ok(EventLog { path, sender })
    }

    /// Append one event, waiting until it is written and synced.
    ///
    /// Safe to call from any task; writes are serialized by the writer
    /// thread in submission order.
    ///
    /// # Errors
    ///
    /// * `io::Error` from the underlying write or sync.
    /// * `io::ErrorKind::BrokenPipe` if the writer has already stopped.
    pub async fn append(&self, event: Event) -> io::Result<()> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(WriteRequest::Append { event, reply })
            .await
            .map_err(|_| writer_gone())?;
        result.await.map_err(|_| writer_gone())?
    }

    /// Read the entire log in file order.
    ///
    /// Opens an independent read handle so reads never contend with the
    /// writer. Empty lines are skipped; any undecodable record fails the
    /// whole read.
    ///
    /// # Errors
    ///
    /// * [`ReadError::Io`] for filesystem failures.
    /// * [`ReadError::Codec`] for malformed records or unknown kinds.
    pub fn read_all(&self) -> Result<Vec<Event>, ReadError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            events.push(Event::parse(&line)?);
        }
        Ok(events)
    }

    /// Stop the writer and close the write handle.
    ///
    /// Appends submitted after close fail with `BrokenPipe`.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the final sync fails.
    pub async fn close(&self) -> io::Result<()> {
        let (reply, result) = oneshot::channel();
        self.sender
            .send(WriteRequest::Shutdown { reply })
            .await
            .map_err(|_| writer_gone())?;
        result.await.map_err(|_| writer_gone())?
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the writer thread is still running.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "event log writer is no longer running")
}

/// Runs on the dedicated writer thread; sole owner of the write handle.
///
/// Exits when the channel closes (all handles dropped) or on `Shutdown`.
fn writer_loop(mut file: File, mut receiver: mpsc::Receiver<WriteRequest>) {
    while let Some(request) = receiver.blocking_recv() {
        match request {
            WriteRequest::Append { event, reply } => {
                let result = write_record(&mut file, &event);
                if let Err(ref e) = result {
                    tracing::error!(error = %e, kind = event.kind(), "failed to persist event");
                }
                // A dropped receiver means the caller gave up; the event
                // is already durable either way.
                let _ = reply.send(result);
            }
            WriteRequest::Shutdown { reply } => {
                let _ = reply.send(file.sync_all());
                break;
            }
        }
    }
    // `file` drops here, closing the write handle.
}

/// Encode, write, and sync one record. Writer thread only.
fn write_record(file: &mut File, event: &Event) -> io::Result<()> {
    let line = event
        .encode()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
}
