//! Command-line and environment configuration for the server binary.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Collaborative to-do list event-sourcing server.
#[derive(Parser, Debug)]
#[command(name = "listfold")]
#[command(about = "Collaborative to-do list backed by an append-only event log")]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory holding the event log
    #[arg(long, env = "DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Optional shared secret prefixing the WebSocket path
    #[arg(long, env = "SHARED_SECRET")]
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable line format.
    Text,
    /// One JSON object per line.
    Json,
}

impl Config {
    /// Location of the event log file under the data directory.
    pub fn event_log_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    /// The `host:port` pair to bind the listener on.
    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
