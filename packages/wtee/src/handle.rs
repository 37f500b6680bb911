use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::actor::{BridgeMessage, BridgeStatus};
use crate::broadcast::Payload;
use crate::error::BridgeError;
use crate::metrics::BridgeMetrics;
use crate::registry::ClientId;

/// A registered client and the queue its payloads arrive on.
#[derive(Debug)]
pub struct ClientConnection {
    pub client: ClientId,
    pub inbox: mpsc::Receiver<Payload>,
}

/// Cheap, cloneable access to the bridge actor.
#[derive(Clone)]
pub struct BridgeHandle {
    sender: mpsc::Sender<BridgeMessage>,
    metrics: Arc<BridgeMetrics>,
    outbox_capacity: usize,
}

impl BridgeHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<BridgeMessage>,
        metrics: Arc<BridgeMetrics>,
        outbox_capacity: usize,
    ) -> Self {
        Self {
            sender,
            metrics,
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    pub async fn connect(&self) -> Result<ClientConnection, BridgeError> {
        let client = ClientId::new();
        let (outbox, inbox) = mpsc::channel(self.outbox_capacity);

        self.sender
            .send(BridgeMessage::Connect { client, outbox })
            .await
            .map_err(|_| BridgeError::ActorGone)?;

        Ok(ClientConnection { client, inbox })
    }

    pub async fn disconnect(&self, client: ClientId) -> Result<(), BridgeError> {
        self.sender
            .send(BridgeMessage::Disconnect { client })
            .await
            .map_err(|_| BridgeError::ActorGone)
    }

    pub async fn status(&self) -> Result<BridgeStatus, BridgeError> {
        let (respond_to, response) = oneshot::channel();

        self.sender
            .send(BridgeMessage::GetStatus { respond_to })
            .await
            .map_err(|_| BridgeError::ActorGone)?;

        response.await.map_err(|_| BridgeError::ActorGone)
    }

    pub fn metrics(&self) -> &Arc<BridgeMetrics> {
        &self.metrics
    }
}
