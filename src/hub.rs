//! Connection registry and broadcast fan-out.
//!
//! A single long-lived task owns the set of connected clients and three
//! inbound channels: register, unregister, and broadcast. Sessions
//! register a bounded outbound queue and an eviction signal; the hub
//! enqueues broadcast frames with `try_send` and drops any client whose
//! queue is full, so one slow consumer can never stall the fan-out. On
//! every membership change the hub rebroadcasts the client count.
//!
//! The hub never writes to the log or the projection; it only moves
//! already-serialized frames.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Capacity of each client's outbound frame queue. A client that falls
/// this many frames behind is evicted.
pub const CLIENT_QUEUE_CAPACITY: usize = 256;

/// A registered client: its frame queue plus the eviction signal.
///
/// Dropping the entry drops `_closer`, which resolves the session's
/// write pump and closes the socket.
struct ClientEntry {
    sender: mpsc::Sender<String>,
    _closer: oneshot::Sender<()>,
}

/// What a session hands the hub when it joins.
struct Registration {
    id: Uuid,
    sender: mpsc::Sender<String>,
    closer: oneshot::Sender<()>,
}

/// Cloneable handle for talking to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    register: mpsc::Sender<Registration>,
    unregister: mpsc::Sender<Uuid>,
    broadcast: mpsc::Sender<String>,
}

impl HubHandle {
    /// Register a client's outbound queue and eviction signal.
    ///
    /// Triggers a `ClientCount` broadcast to every client, the new one
    /// included.
    pub async fn register(&self, id: Uuid, sender: mpsc::Sender<String>, closer: oneshot::Sender<()>) {
        let _ = self.register.send(Registration { id, sender, closer }).await;
    }

    /// Remove a client. A no-op if the hub already evicted it.
    pub async fn unregister(&self, id: Uuid) {
        let _ = self.unregister.send(id).await;
    }

    /// Enqueue a pre-serialized frame to every connected client.
    pub async fn broadcast(&self, frame: String) {
        let _ = self.broadcast.send(frame).await;
    }
}

/// Start the hub task and return its handle.
pub fn spawn_hub() -> HubHandle {
    let (register_tx, register_rx) = mpsc::channel::<Registration>(16);
    let (unregister_tx, unregister_rx) = mpsc::channel::<Uuid>(16);
    let (broadcast_tx, broadcast_rx) = mpsc::channel::<String>(256);

    tokio::spawn(run_hub(register_rx, unregister_rx, broadcast_rx));

    HubHandle {
        register: register_tx,
        unregister: unregister_tx,
        broadcast: broadcast_tx,
    }
}

/// The hub loop: sole owner of the client map.
///
/// Exits when the handles are dropped. The three channels close together
/// because every [`HubHandle`] clone holds all three senders.
async fn run_hub(
    mut register_rx: mpsc::Receiver<Registration>,
    mut unregister_rx: mpsc::Receiver<Uuid>,
    mut broadcast_rx: mpsc::Receiver<String>,
) {
    let mut clients: HashMap<Uuid, ClientEntry> = HashMap::new();

    loop {
        tokio::select! {
            registration = register_rx.recv() => {
                let Some(Registration { id, sender, closer }) = registration else {
                    break;
                };
                clients.insert(id, ClientEntry { sender, _closer: closer });
                tracing::info!(client_id = %id, total_clients = clients.len(), "client connected");
                broadcast_client_count(&mut clients);
            }

            id = unregister_rx.recv() => {
                let Some(id) = id else { break };
                if clients.remove(&id).is_some() {
                    tracing::info!(
                        client_id = %id,
                        total_clients = clients.len(),
                        "client disconnected"
                    );
                    broadcast_client_count(&mut clients);
                }
            }

            frame = broadcast_rx.recv() => {
                let Some(frame) = frame else { break };
                fan_out(&mut clients, &frame);
            }
        }
    }
    tracing::debug!("hub task stopped");
}

/// Enqueue `frame` to every client, evicting any whose queue is full.
///
/// Never awaits a client; a full queue means the consumer is too slow
/// and its entry is dropped, which closes its connection.
fn fan_out(clients: &mut HashMap<Uuid, ClientEntry>, frame: &str) {
    clients.retain(|id, entry| match entry.sender.try_send(frame.to_owned()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(client_id = %id, "client send buffer full, evicting");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}

fn broadcast_client_count(clients: &mut HashMap<Uuid, ClientEntry>) {
    let message = ServerMessage::ClientCount {
        count: clients.len(),
    };
    match serde_json::to_string(&message) {
        Ok(frame) => fan_out(clients, &frame),
        Err(e) => tracing::error!(error = %e, "failed to serialize client count"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn recv_frame(rx: &mut mpsc::Receiver<String>) -> serde_json::Value {
        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame should arrive")
            .expect("queue should stay open");
        serde_json::from_str(&frame).expect("frame should be json")
    }

    /// Register a fresh client and return its id and frame queue.
    ///
    /// The close signal is dropped; these tests observe eviction through
    /// the frame queue instead.
    async fn register_client(hub: &HubHandle) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let (closer, _closed) = oneshot::channel();
        hub.register(id, tx, closer).await;
        (id, rx)
    }

    #[tokio::test]
    async fn register_broadcasts_client_count() {
        let hub = spawn_hub();
        let (_id, mut rx) = register_client(&hub).await;

        let value = recv_frame(&mut rx).await;
        assert_eq!(value["type"], "ClientCount");
        assert_eq!(value["count"], 1);
    }

    #[tokio::test]
    async fn unregister_updates_remaining_clients() {
        let hub = spawn_hub();
        let (id_a, mut rx_a) = register_client(&hub).await;
        let (_id_b, _rx_b) = register_client(&hub).await;

        // a sees count 1 then count 2.
        assert_eq!(recv_frame(&mut rx_a).await["count"], 1);
        assert_eq!(recv_frame(&mut rx_a).await["count"], 2);

        hub.unregister(id_a).await;
        drop(rx_a);

        // Unregister and register travel on separate channels, so c's
        // first count may still include a. Wait for it to settle at 2.
        let (_id_c, mut rx_c) = register_client(&hub).await;
        loop {
            if recv_frame(&mut rx_c).await["count"] == 2 {
                break;
            }
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client() {
        let hub = spawn_hub();
        let (_id_a, mut rx_a) = register_client(&hub).await;
        let (_id_b, mut rx_b) = register_client(&hub).await;
        // A client's first ClientCount frame proves its registration was
        // processed, so the broadcast below cannot overtake it.
        recv_frame(&mut rx_a).await;
        recv_frame(&mut rx_b).await;

        hub.broadcast("{\"type\":\"Test\"}".to_string()).await;

        // Skip the presence frames each client received on registration.
        loop {
            let value = recv_frame(&mut rx_a).await;
            if value["type"] == "Test" {
                break;
            }
        }
        loop {
            let value = recv_frame(&mut rx_b).await;
            if value["type"] == "Test" {
                break;
            }
        }
    }

    #[tokio::test]
    async fn broadcasts_arrive_in_order() {
        let hub = spawn_hub();
        let (_id, mut rx) = register_client(&hub).await;
        recv_frame(&mut rx).await; // ClientCount

        for i in 0..10 {
            hub.broadcast(format!("{{\"type\":\"Test\",\"seq\":{i}}}")).await;
        }
        for i in 0..10 {
            let value = recv_frame(&mut rx).await;
            assert_eq!(value["seq"], i);
        }
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_not_awaited() {
        let hub = spawn_hub();

        // A client with a tiny queue that nothing drains.
        let slow_id = Uuid::new_v4();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (slow_closer, slow_closed) = oneshot::channel();
        hub.register(slow_id, slow_tx, slow_closer).await;

        let (_id, mut rx) = register_client(&hub).await;
        // Registrations are processed in order, so the healthy client's
        // first count frame means both clients are in the map.
        recv_frame(&mut rx).await;

        // Fill the slow client's queue and then some.
        for i in 0..5 {
            hub.broadcast(format!("{{\"type\":\"Test\",\"seq\":{i}}}")).await;
        }

        // The healthy client still receives everything.
        let mut seen = 0;
        while seen < 5 {
            let value = recv_frame(&mut rx).await;
            if value["type"] == "Test" {
                seen += 1;
            }
        }

        // Eviction dropped the slow client's entry, resolving its closer.
        timeout(Duration::from_secs(1), slow_closed)
            .await
            .expect("eviction should resolve the close signal")
            .expect_err("closer is dropped, not sent");
    }
}
