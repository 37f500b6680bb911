use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bridge::{StdinBridge, StreamState};
use crate::broadcast::{Outboxes, Payload};
use crate::encoding::InputEncoding;
use crate::error::BridgeError;
use crate::handle::BridgeHandle;
use crate::input::InputSource;
use crate::lifecycle::ConnectionLifecycle;
use crate::metrics::BridgeMetrics;
use crate::registry::ClientId;

pub const DEFAULT_READ_BUFFER: usize = 4096;
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Messages that can be sent to the bridge actor
pub enum BridgeMessage {
    Connect {
        client: ClientId,
        outbox: mpsc::Sender<Payload>,
    },
    Disconnect {
        client: ClientId,
    },
    GetStatus {
        respond_to: oneshot::Sender<BridgeStatus>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct BridgeStatus {
    pub stream: StreamState,
    pub clients: usize,
    pub subscribed: bool,
    pub encoding: InputEncoding,
}

#[derive(Clone, Copy, Debug)]
pub struct BridgeConfig {
    pub encoding: InputEncoding,
    pub read_buffer: usize,
    pub outbox_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            encoding: InputEncoding::default(),
            read_buffer: DEFAULT_READ_BUFFER,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

enum Event {
    Message(BridgeMessage),
    Chunk(Result<usize, BridgeError>),
    Shutdown,
}

/// The bridge actor. Owns the input, the output and the client set, and is
/// the only task that touches them.
pub struct BridgeActor<S, W> {
    lifecycle: ConnectionLifecycle<S, W, Outboxes>,
    receiver: mpsc::Receiver<BridgeMessage>,
    read_buffer: usize,
}

impl<S, W> BridgeActor<S, W>
where
    S: InputSource + 'static,
    W: Write + Send + 'static,
{
    pub fn spawn(
        source: S,
        output: W,
        config: BridgeConfig,
        metrics: Arc<BridgeMetrics>,
    ) -> (BridgeHandle, JoinHandle<Result<(), BridgeError>>) {
        let (sender, receiver) = mpsc::channel(32);

        let bridge = StdinBridge::new(source, output, config.encoding);
        let actor = Self {
            lifecycle: ConnectionLifecycle::new(bridge, Outboxes::new(), metrics.clone()),
            receiver,
            read_buffer: config.read_buffer.max(1),
        };

        let task = tokio::spawn(actor.run());
        let handle = BridgeHandle::new(sender, metrics, config.outbox_capacity);
        (handle, task)
    }

    async fn run(mut self) -> Result<(), BridgeError> {
        info!(
            encoding = %self.lifecycle.bridge().encoding(),
            read_buffer = self.read_buffer,
            "bridge actor started"
        );
        let mut buf = vec![0u8; self.read_buffer];

        loop {
            let reading = self.lifecycle.bridge().is_enabled();
            let event = tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(msg) => Event::Message(msg),
                    None => Event::Shutdown,
                },
                read = self.lifecycle.bridge_mut().next_chunk(&mut buf), if reading => {
                    Event::Chunk(read)
                }
            };

            match event {
                Event::Message(msg) => self.handle_message(msg)?,
                Event::Chunk(Ok(n)) => {
                    self.lifecycle.on_chunk(&buf[..n])?;
                }
                Event::Chunk(Err(e)) => {
                    error!("input read failed: {}", e);
                    return Err(e);
                }
                Event::Shutdown => break,
            }
        }

        info!("bridge actor shutting down");
        Ok(())
    }

    fn handle_message(&mut self, msg: BridgeMessage) -> Result<(), BridgeError> {
        match msg {
            BridgeMessage::Connect { client, outbox } => {
                self.lifecycle.channel_mut().attach(client, outbox);
                self.lifecycle.on_connect(client)
            }
            BridgeMessage::Disconnect { client } => {
                let result = self.lifecycle.on_disconnect(client);
                if !self.lifecycle.channel_mut().detach(client) {
                    debug!(%client, "disconnect for client without outbox");
                }
                result
            }
            BridgeMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
                Ok(())
            }
        }
    }

    fn status(&self) -> BridgeStatus {
        let bridge = self.lifecycle.bridge();
        BridgeStatus {
            stream: bridge.state(),
            clients: self.lifecycle.registry().len(),
            subscribed: bridge.is_enabled(),
            encoding: bridge.encoding(),
        }
    }
}
