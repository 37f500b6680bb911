//! The stdin bridge: tee every chunk to the output, broadcast completed lines.

use serde::Serialize;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::broadcast::{BroadcastChannel, Delivery, Payload};
use crate::encoding::InputEncoding;
use crate::error::BridgeError;
use crate::input::InputSource;
use crate::reassembler::LineReassembler;
use crate::registry::{ClientRegistry, Transition};

/// Whether the input can still produce data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Active,
    Closed,
}

const OUTPUT_RETRY: Duration = Duration::from_millis(5);

/// What handling one chunk did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub bytes: usize,
    pub lines: usize,
    pub delivery: Delivery,
    pub closed: bool,
}

pub struct StdinBridge<S, W> {
    source: S,
    output: W,
    reassembler: LineReassembler,
    state: StreamState,
    enabled: bool,
}

impl<S: InputSource, W: Write> StdinBridge<S, W> {
    pub fn new(source: S, output: W, encoding: InputEncoding) -> Self {
        Self {
            source,
            output,
            reassembler: LineReassembler::new(encoding),
            state: StreamState::Active,
            enabled: false,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn encoding(&self) -> InputEncoding {
        self.reassembler.encoding()
    }

    pub fn pending_tail(&self) -> &str {
        self.reassembler.pending_tail()
    }

    /// Subscribe to input readiness. Must not be called while subscribed.
    pub fn enable(&mut self) -> Result<(), BridgeError> {
        debug_assert!(!self.enabled, "input subscription enabled twice");
        if self.enabled {
            warn!("input subscription already enabled");
            return Ok(());
        }

        self.source.subscribe().map_err(BridgeError::Subscribe)?;
        self.enabled = true;
        debug!("input subscription enabled");
        Ok(())
    }

    /// Drop the readiness subscription. Must only be called while subscribed.
    pub fn disable(&mut self) {
        debug_assert!(self.enabled, "input subscription disabled while not enabled");
        if !self.enabled {
            warn!("input subscription already disabled");
            return;
        }

        self.source.unsubscribe();
        self.enabled = false;
        debug!("input subscription disabled");
    }

    /// React to the client set gaining its first or losing its last member.
    pub fn on_transition(&mut self, transition: Transition) -> Result<(), BridgeError> {
        match transition {
            Transition::BecameNonEmpty => match self.state {
                StreamState::Active if !self.enabled => self.enable()?,
                StreamState::Active => {}
                StreamState::Closed => {
                    debug!("client connected after end of input, not resubscribing");
                }
            },
            Transition::BecameEmpty => {
                if self.enabled {
                    self.disable();
                }
            }
        }
        Ok(())
    }

    /// Wait for the next chunk from the input. Only meaningful while enabled.
    pub async fn next_chunk(&mut self, buf: &mut [u8]) -> Result<usize, BridgeError> {
        self.source.read_chunk(buf).await.map_err(BridgeError::Read)
    }

    /// Handle the result of one read: tee, reassemble, broadcast, and close
    /// the stream when the chunk is empty.
    pub fn on_chunk<C: BroadcastChannel>(
        &mut self,
        chunk: &[u8],
        clients: &ClientRegistry,
        channel: &mut C,
    ) -> Result<ChunkOutcome, BridgeError> {
        if self.state == StreamState::Closed {
            trace!("ignoring input notification after close");
            return Ok(ChunkOutcome {
                closed: true,
                ..Default::default()
            });
        }

        write_through(&mut self.output, chunk).map_err(BridgeError::Write)?;

        let lines = self.reassembler.feed(chunk);
        let mut outcome = ChunkOutcome {
            bytes: chunk.len(),
            lines: lines.len(),
            ..Default::default()
        };

        if !lines.is_empty() && !clients.is_empty() {
            let payload = Payload::encode(&lines)?;
            outcome.delivery = channel.send(clients, &payload);
            trace!(
                lines = lines.len(),
                delivered = outcome.delivery.delivered,
                "broadcast batch"
            );
        }

        if chunk.is_empty() {
            self.close();
            outcome.closed = true;
        }

        Ok(outcome)
    }

    fn close(&mut self) {
        self.state = StreamState::Closed;
        self.source.unsubscribe();
        self.enabled = false;
        info!("end of input, released input subscription");
    }
}

/// Write and flush the whole chunk, waiting while the output is full.
///
/// Stdout may share its open file description with stdin and so inherit
/// `O_NONBLOCK`; a terminal paused with XOFF then reports `WouldBlock`.
fn write_through<W: Write>(output: &mut W, mut chunk: &[u8]) -> io::Result<()> {
    while !chunk.is_empty() {
        match output.write(chunk) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => chunk = &chunk[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(OUTPUT_RETRY),
            Err(e) => return Err(e),
        }
    }

    loop {
        match output.flush() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(OUTPUT_RETRY),
            Err(e) => return Err(e),
        }
    }
}
