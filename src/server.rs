//! TCP accept loop that spawns one session per connection.

use tokio::net::TcpListener;

use crate::engine::EngineHandle;
use crate::hub::HubHandle;
use crate::session::handle_connection;

/// The request path on which the WebSocket upgrade is accepted.
///
/// A configured shared secret becomes an opaque prefix on the path; the
/// endpoint is unguessable without it but carries no further auth.
pub fn websocket_path(shared_secret: Option<&str>) -> String {
    match shared_secret {
        Some(secret) if !secret.is_empty() => format!("/{secret}/ws"),
        _ => "/ws".to_string(),
    }
}

/// Accept connections forever, spawning a session for each.
///
/// The engine and hub handles are cloned per connection; an accept
/// failure is logged and the loop continues.
pub async fn run(listener: TcpListener, engine: EngineHandle, hub: HubHandle, ws_path: String) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::debug!(%addr, "accepted connection");
                let engine = engine.clone();
                let hub = hub.clone();
                let ws_path = ws_path.clone();
                tokio::spawn(async move {
                    handle_connection(stream, engine, hub, ws_path).await;
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to accept connection");
            }
        }
    }
}
