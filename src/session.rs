//! Per-connection session: WebSocket upgrade, pumps, and dispatch.
//!
//! One connection = one session. On accept the session snapshots the
//! projection and pushes the `StateRollup` onto its own queue before
//! registering with the hub, guaranteeing the rollup is the first frame
//! the client receives. A spawned write pump drains the queue to the
//! socket; the read loop runs on the accepting task and classifies each
//! inbound frame as an autocomplete request (answered privately) or a
//! command (validated, persisted, acknowledged, then broadcast).

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use uuid::Uuid;

use crate::command::Command;
use crate::engine::{EngineError, EngineHandle};
use crate::hub::{HubHandle, CLIENT_QUEUE_CAPACITY};
use crate::protocol::{frame_kind, AutocompleteRequest, ServerMessage};

/// Handle a single client connection from upgrade to teardown.
///
/// `ws_path` is the only request path on which the upgrade is accepted;
/// anything else is answered 404 without revealing the endpoint.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    engine: EngineHandle,
    hub: HubHandle,
    ws_path: String,
) {
    let peer = stream.peer_addr().ok();

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if request.uri().path() == ws_path {
            Ok(response)
        } else {
            tracing::warn!(path = request.uri().path(), "rejected upgrade on wrong path");
            let mut not_found = ErrorResponse::new(None);
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(peer = ?peer, error = %e, "websocket handshake failed");
            return;
        }
    };

    let client_id = Uuid::new_v4();
    let (queue, queue_rx) = mpsc::channel::<String>(CLIENT_QUEUE_CAPACITY);
    let (closer, closed) = oneshot::channel();

    // Snapshot before registering so the rollup is the first frame out,
    // ahead of any presence or event broadcast.
    let snapshot = match engine.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "failed to snapshot state for new client");
            return;
        }
    };
    let rollup = ServerMessage::StateRollup {
        todos: snapshot.todos,
        categories: snapshot.categories,
        list_title: snapshot.list_title,
    };
    match serde_json::to_string(&rollup) {
        Ok(frame) => {
            let _ = queue.send(frame).await;
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize state rollup"),
    }

    let (sink, mut inbound) = ws.split();
    tokio::spawn(write_pump(sink, queue_rx, closed, client_id));
    hub.register(client_id, queue.clone(), closer).await;

    let session = Session {
        engine,
        hub: hub.clone(),
        queue,
        client_id,
    };

    while let Some(message) = inbound.next().await {
        match message {
            Ok(Message::Text(text)) => session.handle_frame(&text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "websocket read error");
                break;
            }
        }
    }

    hub.unregister(client_id).await;
    tracing::debug!(client_id = %client_id, peer = ?peer, "session closed");
}

/// Read-side state for one connection.
struct Session {
    engine: EngineHandle,
    hub: HubHandle,
    /// The client's own outbound queue; unicast replies go here directly.
    queue: mpsc::Sender<String>,
    client_id: Uuid,
}

impl Session {
    /// Classify and dispatch one inbound text frame.
    async fn handle_frame(&self, text: &str) {
        if frame_kind(text).as_deref() == Some("AutocompleteRequest") {
            self.handle_autocomplete(text).await;
            return;
        }

        let command: Command = match serde_json::from_str(text) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    client_id = %self.client_id,
                    error = %e,
                    frame = text,
                    "invalid command received"
                );
                return;
            }
        };
        let command_id = command.command_id().to_owned();
        tracing::info!(
            client_id = %self.client_id,
            kind = command.kind(),
            command_id = %command_id,
            "command received"
        );

        match self.engine.execute(command).await {
            Ok(event) => {
                // The submitter's acknowledgement goes onto its queue
                // before the event reaches the hub, so the ack is always
                // observed first.
                self.send(ServerMessage::ack(&command_id)).await;
                match event.encode() {
                    Ok(frame) => self.hub.broadcast(frame).await,
                    Err(e) => {
                        tracing::error!(error = %e, kind = event.kind(), "failed to encode event")
                    }
                }
            }
            Err(EngineError::Rejected(rejection)) => {
                tracing::warn!(
                    client_id = %self.client_id,
                    command_id = %command_id,
                    error = %rejection,
                    "command rejected"
                );
                self.send(ServerMessage::nack(&command_id, rejection.to_string()))
                    .await;
            }
            Err(failure) => {
                tracing::error!(
                    client_id = %self.client_id,
                    command_id = %command_id,
                    error = %failure,
                    "command failed"
                );
                self.send(ServerMessage::nack(&command_id, failure.to_string()))
                    .await;
            }
        }
    }

    /// Answer an autocomplete request on this session only.
    async fn handle_autocomplete(&self, text: &str) {
        let request: AutocompleteRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "failed to parse autocomplete request");
                return;
            }
        };

        let suggestions = match self.engine.suggest(request.query).await {
            Ok(suggestions) => suggestions,
            Err(e) => {
                tracing::error!(error = %e, "autocomplete lookup failed");
                return;
            }
        };

        let response = ServerMessage::AutocompleteResponse {
            suggestions,
            request_id: request.request_id,
        };
        match serde_json::to_string(&response) {
            // A full queue drops the reply rather than stalling the read
            // loop; the client can retype.
            Ok(frame) => {
                if self.queue.try_send(frame).is_err() {
                    tracing::warn!(
                        client_id = %self.client_id,
                        "client send buffer full, dropping autocomplete response"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize autocomplete response"),
        }
    }

    /// Enqueue a unicast frame to this client, in order.
    async fn send(&self, message: ServerMessage) {
        match serde_json::to_string(&message) {
            Ok(frame) => {
                let _ = self.queue.send(frame).await;
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize frame"),
        }
    }
}

/// Drains the client queue to the socket; one task per connection.
///
/// Exits when the queue closes, the hub resolves the close signal
/// (eviction or unregister), or a write fails.
async fn write_pump(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut queue: mpsc::Receiver<String>,
    mut closed: oneshot::Receiver<()>,
    client_id: Uuid,
) {
    loop {
        tokio::select! {
            frame = queue.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        tracing::warn!(client_id = %client_id, error = %e, "websocket write error");
                        break;
                    }
                }
                None => break,
            },
            _ = &mut closed => break,
        }
    }
    let _ = sink.close().await;
}
