//! Ties the client registry to the bridge's input subscription.

use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bridge::{ChunkOutcome, StdinBridge};
use crate::broadcast::BroadcastChannel;
use crate::error::BridgeError;
use crate::input::InputSource;
use crate::metrics::BridgeMetrics;
use crate::registry::{ClientId, ClientRegistry};

/// Owns every piece of mutable bridge state so connect, disconnect and input
/// events are applied one at a time.
pub struct ConnectionLifecycle<S, W, C> {
    bridge: StdinBridge<S, W>,
    registry: ClientRegistry,
    channel: C,
    metrics: Arc<BridgeMetrics>,
}

impl<S, W, C> ConnectionLifecycle<S, W, C>
where
    S: InputSource,
    W: Write,
    C: BroadcastChannel,
{
    pub fn new(bridge: StdinBridge<S, W>, channel: C, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            bridge,
            registry: ClientRegistry::new(),
            channel,
            metrics,
        }
    }

    pub fn on_connect(&mut self, client: ClientId) -> Result<(), BridgeError> {
        if self.registry.contains(client) {
            debug!(%client, "client already connected");
            return Ok(());
        }

        let transition = self.registry.add(client);
        self.metrics.connection_opened();
        info!(%client, clients = self.registry.len(), "client connected");

        if let Some(transition) = transition {
            self.bridge.on_transition(transition)?;
        }
        Ok(())
    }

    pub fn on_disconnect(&mut self, client: ClientId) -> Result<(), BridgeError> {
        if !self.registry.contains(client) {
            return Ok(());
        }

        let transition = self.registry.remove(client);
        self.metrics.connection_closed();
        info!(%client, clients = self.registry.len(), "client disconnected");

        if let Some(transition) = transition {
            self.bridge.on_transition(transition)?;
        }
        Ok(())
    }

    pub fn on_chunk(&mut self, chunk: &[u8]) -> Result<ChunkOutcome, BridgeError> {
        let outcome = self
            .bridge
            .on_chunk(chunk, &self.registry, &mut self.channel)?;
        self.metrics.record_chunk(&outcome);
        Ok(outcome)
    }

    pub fn bridge(&self) -> &StdinBridge<S, W> {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut StdinBridge<S, W> {
        &mut self.bridge
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::InputEncoding;
    use crate::test_helpers::{RecordingChannel, SharedBuffer, SpySource};

    fn lifecycle() -> (
        ConnectionLifecycle<SpySource, SharedBuffer, RecordingChannel>,
        SharedBuffer,
    ) {
        let output = SharedBuffer::default();
        let bridge = StdinBridge::new(SpySource::default(), output.clone(), InputEncoding::Utf8);
        let lifecycle = ConnectionLifecycle::new(
            bridge,
            RecordingChannel::default(),
            Arc::new(BridgeMetrics::new()),
        );
        (lifecycle, output)
    }

    #[test]
    fn subscription_follows_client_presence() {
        let (mut lifecycle, _output) = lifecycle();
        let a = ClientId::new();
        let b = ClientId::new();

        lifecycle.on_connect(a).unwrap();
        assert!(lifecycle.bridge().is_enabled());
        lifecycle.on_connect(b).unwrap();
        assert_eq!(lifecycle.bridge().source().subscribes, 1);

        lifecycle.on_disconnect(a).unwrap();
        assert!(lifecycle.bridge().is_enabled());
        lifecycle.on_disconnect(b).unwrap();
        assert!(!lifecycle.bridge().is_enabled());
        assert_eq!(lifecycle.bridge().source().unsubscribes, 1);
    }

    #[test]
    fn unknown_disconnect_changes_nothing() {
        let (mut lifecycle, _output) = lifecycle();
        let a = ClientId::new();
        lifecycle.on_connect(a).unwrap();

        lifecycle.on_disconnect(ClientId::new()).unwrap();
        assert!(lifecycle.bridge().is_enabled());
        assert_eq!(lifecycle.registry().len(), 1);
        assert_eq!(lifecycle.metrics.snapshot().connections.active, 1);
    }

    #[test]
    fn duplicate_connect_is_counted_once() {
        let (mut lifecycle, _output) = lifecycle();
        let a = ClientId::new();

        lifecycle.on_connect(a).unwrap();
        lifecycle.on_connect(a).unwrap();
        assert_eq!(lifecycle.registry().len(), 1);
        assert_eq!(lifecycle.metrics.snapshot().connections.active, 1);

        lifecycle.on_disconnect(a).unwrap();
        let snapshot = lifecycle.metrics.snapshot();
        assert_eq!(snapshot.connections.active, 0);
        assert_eq!(snapshot.connections.total, 1);
        assert!(!lifecycle.bridge().is_enabled());
    }

    #[test]
    fn reconnect_after_end_of_input_keeps_source_released() {
        let (mut lifecycle, output) = lifecycle();
        let a = ClientId::new();

        lifecycle.on_connect(a).unwrap();
        lifecycle.on_chunk(b"bye\n").unwrap();
        lifecycle.on_chunk(b"").unwrap();
        lifecycle.on_disconnect(a).unwrap();

        lifecycle.on_connect(ClientId::new()).unwrap();
        assert_eq!(lifecycle.bridge().source().subscribes, 1);
        assert_eq!(lifecycle.bridge().source().unsubscribes, 1);
        assert_eq!(output.contents(), b"bye\n");
        assert_eq!(lifecycle.channel_mut().batches, vec![vec!["bye\n"]]);
    }

    #[test]
    fn chunks_are_counted() {
        let (mut lifecycle, _output) = lifecycle();
        lifecycle.on_connect(ClientId::new()).unwrap();
        lifecycle.on_chunk(b"one\ntwo\n").unwrap();

        let snapshot = lifecycle.metrics.snapshot();
        assert_eq!(snapshot.input.bytes_read, 8);
        assert_eq!(snapshot.input.lines_broadcast, 2);
        assert_eq!(snapshot.messages.sent, 1);
    }
}
