//! Fakes shared by the unit tests.

use std::future::Future;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::broadcast::{BroadcastChannel, Delivery, Payload};
use crate::input::InputSource;
use crate::reassembler::Line;
use crate::registry::ClientRegistry;

/// Input source that counts subscription calls and never produces data.
#[derive(Debug, Default)]
pub struct SpySource {
    pub subscribes: usize,
    pub unsubscribes: usize,
    pub fail_subscribe: bool,
    subscribed: bool,
}

impl InputSource for SpySource {
    fn subscribe(&mut self) -> io::Result<()> {
        if self.fail_subscribe {
            return Err(io::Error::other("refused"));
        }
        self.subscribes += 1;
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.unsubscribes += 1;
        self.subscribed = false;
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn read_chunk(&mut self, _buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        std::future::pending()
    }
}

/// Broadcast channel that records every batch it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    pub batches: Vec<Vec<Line>>,
}

impl BroadcastChannel for RecordingChannel {
    fn send(&mut self, clients: &ClientRegistry, payload: &Payload) -> Delivery {
        let lines = payload.decode().expect("payload is valid JSON");
        self.batches.push(lines);
        Delivery {
            delivered: clients.len(),
            dropped: 0,
        }
    }
}

/// Writer whose contents stay readable after it is moved into the bridge.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails like a closed pipe.
#[derive(Debug)]
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that reports `WouldBlock` a few times, like a paused terminal, and
/// then accepts at most a few bytes per call.
#[derive(Debug)]
pub struct StallingWriter {
    stalls: usize,
    inner: SharedBuffer,
}

impl StallingWriter {
    pub fn new(stalls: usize, inner: SharedBuffer) -> Self {
        Self { stalls, inner }
    }
}

impl Write for StallingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stalls > 0 {
            self.stalls -= 1;
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = buf.len().min(4);
        self.inner.write(&buf[..n])
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Input source whose reads fail as if the device went away.
#[derive(Debug, Default)]
pub struct FailingSource {
    subscribed: bool,
}

impl InputSource for FailingSource {
    fn subscribe(&mut self) -> io::Result<()> {
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn read_chunk(&mut self, _buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        std::future::ready(Err(io::Error::other("input device went away")))
    }
}
