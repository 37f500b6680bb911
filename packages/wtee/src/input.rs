//! Byte sources the bridge can read from.

use std::future::Future;
use std::io;
use tokio::sync::mpsc;

/// A non-blocking byte source with an explicit readiness subscription.
///
/// While subscribed, `read_chunk` waits until the source is readable and then
/// performs exactly one read. `Ok(0)` means end of input; "no data yet" is
/// never surfaced and is waited out instead.
pub trait InputSource: Send {
    fn subscribe(&mut self) -> io::Result<()>;

    /// Must be safe to call whether or not the source is subscribed.
    fn unsubscribe(&mut self);

    fn is_subscribed(&self) -> bool;

    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

/// An input fed from an in-process channel.
///
/// Each message is one chunk; dropping the sender (or sending an empty
/// chunk) ends the input.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
    leftover: Vec<u8>,
    subscribed: bool,
}

impl ChannelSource {
    pub fn new() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let source = Self {
            receiver,
            leftover: Vec::new(),
            subscribed: false,
        };
        (sender, source)
    }
}

impl InputSource for ChannelSource {
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

    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            if self.leftover.is_empty() {
                match self.receiver.recv().await {
                    Some(chunk) => self.leftover = chunk,
                    None => return Ok(0),
                }
            }

            let n = self.leftover.len().min(buf.len());
            buf[..n].copy_from_slice(&self.leftover[..n]);
            self.leftover.drain(..n);
            Ok(n)
        }
    }
}
