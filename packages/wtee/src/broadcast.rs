//! Fan-out of encoded line batches to connected clients.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::reassembler::Line;
use crate::registry::{ClientId, ClientRegistry};

/// An ordered batch of lines encoded as a JSON array of strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload(Arc<str>);

impl Payload {
    pub fn encode(lines: &[Line]) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::to_string(lines)?.into()))
    }

    pub fn decode(&self) -> Result<Vec<Line>, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// Sends a payload to every client in the registry.
///
/// Implementations must not block: a client that cannot accept the payload
/// right now is skipped and counted as dropped.
pub trait BroadcastChannel {
    fn send(&mut self, clients: &ClientRegistry, payload: &Payload) -> Delivery;
}

/// Per-client bounded queues drained by each client's connection task.
#[derive(Debug, Default)]
pub struct Outboxes {
    senders: HashMap<ClientId, mpsc::Sender<Payload>>,
}

impl Outboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, client: ClientId, outbox: mpsc::Sender<Payload>) {
        self.senders.insert(client, outbox);
    }

    pub fn detach(&mut self, client: ClientId) -> bool {
        self.senders.remove(&client).is_some()
    }
}

impl BroadcastChannel for Outboxes {
    fn send(&mut self, clients: &ClientRegistry, payload: &Payload) -> Delivery {
        let mut delivery = Delivery::default();

        for client in clients.iter() {
            let Some(outbox) = self.senders.get(&client) else {
                warn!(%client, "registered client has no outbox");
                delivery.dropped += 1;
                continue;
            };

            match outbox.try_send(payload.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%client, "client is not keeping up, dropping batch");
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%client, "client outbox closed before disconnect");
                    delivery.dropped += 1;
                }
            }
        }

        delivery
    }
}
