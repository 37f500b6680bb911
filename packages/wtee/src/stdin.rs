//! Non-blocking standard input driven by the tokio reactor.

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use std::future::Future;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::{debug, warn};

use crate::input::InputSource;

/// Puts a descriptor in non-blocking mode and restores its original flags
/// on drop.
///
/// The flags live on the open file description, which stdin may share with
/// other processes in the pipeline, so the change must not outlive us.
#[derive(Debug)]
pub struct NonBlockingGuard {
    fd: RawFd,
    original: OFlag,
}

impl NonBlockingGuard {
    pub fn acquire(fd: RawFd) -> io::Result<Self> {
        let bits = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
        let original = OFlag::from_bits_truncate(bits);
        fcntl(fd, FcntlArg::F_SETFL(original | OFlag::O_NONBLOCK)).map_err(io::Error::from)?;
        debug!(fd, "switched descriptor to non-blocking mode");
        Ok(Self { fd, original })
    }
}

impl Drop for NonBlockingGuard {
    fn drop(&mut self) {
        match fcntl(self.fd, FcntlArg::F_SETFL(self.original)) {
            Ok(_) => debug!(fd = self.fd, "restored descriptor flags"),
            Err(e) => warn!(fd = self.fd, "failed to restore descriptor flags: {}", e),
        }
    }
}

#[derive(Debug)]
struct Fd(RawFd);

impl AsRawFd for Fd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    nix::unistd::read(fd, buf).map_err(io::Error::from)
}

/// Standard input as an [`InputSource`].
///
/// Subscribing registers the descriptor with the reactor; unsubscribing
/// deregisters it. Regular files cannot be registered with epoll, so those
/// are read directly since their reads never block.
#[derive(Debug)]
pub struct StdinSource {
    fd: RawFd,
    registration: Option<AsyncFd<Fd>>,
    direct: bool,
    _guard: NonBlockingGuard,
}

impl StdinSource {
    pub fn new() -> io::Result<Self> {
        Self::from_fd(io::stdin().as_raw_fd())
    }

    /// Read from an arbitrary descriptor, which must stay open for the
    /// lifetime of the source.
    pub fn from_fd(fd: RawFd) -> io::Result<Self> {
        let guard = NonBlockingGuard::acquire(fd)?;
        Ok(Self {
            fd,
            registration: None,
            direct: false,
            _guard: guard,
        })
    }
}

impl InputSource for StdinSource {
    fn subscribe(&mut self) -> io::Result<()> {
        match AsyncFd::with_interest(Fd(self.fd), Interest::READABLE) {
            Ok(registration) => {
                self.registration = Some(registration);
            }
            Err(e) if e.raw_os_error() == Some(nix::libc::EPERM) => {
                debug!("stdin does not support polling, reading it directly");
                self.direct = true;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.registration = None;
        self.direct = false;
    }

    fn is_subscribed(&self) -> bool {
        self.registration.is_some() || self.direct
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            if let Some(registration) = &self.registration {
                loop {
                    let mut ready = registration.readable().await?;
                    match ready.try_io(|inner| read_fd(inner.get_ref().0, buf)) {
                        Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Ok(result) => return result,
                        Err(_would_block) => continue,
                    }
                }
            }

            if self.direct {
                loop {
                    tokio::task::yield_now().await;
                    match read_fd(self.fd, buf) {
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                        result => return result,
                    }
                }
            }

            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Seek, SeekFrom, Write};
    use std::os::fd::AsRawFd;
    use tokio::time::timeout;

    const QUIET: Duration = Duration::from_millis(50);
    const PATIENCE: Duration = Duration::from_secs(2);

    fn flags(fd: RawFd) -> OFlag {
        OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL).unwrap())
    }

    #[test]
    fn guard_restores_blocking_mode() {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        let fd = read_end.as_raw_fd();
        assert!(!flags(fd).contains(OFlag::O_NONBLOCK));

        let guard = NonBlockingGuard::acquire(fd).unwrap();
        assert!(flags(fd).contains(OFlag::O_NONBLOCK));

        drop(guard);
        assert!(!flags(fd).contains(OFlag::O_NONBLOCK));
    }

    #[test]
    fn empty_pipe_would_block() {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        let fd = read_end.as_raw_fd();
        let _guard = NonBlockingGuard::acquire(fd).unwrap();

        let mut buf = [0u8; 8];
        let err = read_fd(fd, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn closed_pipe_reads_end_of_input() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        drop(write_end);

        let mut buf = [0u8; 8];
        assert_eq!(read_fd(read_end.as_raw_fd(), &mut buf).unwrap(), 0);
    }

    #[tokio::test]
    async fn pipe_waits_then_reads_then_ends() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let mut source = StdinSource::from_fd(read_end.as_raw_fd()).unwrap();
        source.subscribe().unwrap();
        assert!(source.is_subscribed());
        let mut buf = [0u8; 16];

        assert!(timeout(QUIET, source.read_chunk(&mut buf)).await.is_err());

        let mut writer = File::from(write_end);
        writer.write_all(b"a\n").unwrap();
        let n = timeout(PATIENCE, source.read_chunk(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"a\n");

        // Drained again, so readiness was cleared.
        assert!(timeout(QUIET, source.read_chunk(&mut buf)).await.is_err());

        drop(writer);
        let n = timeout(PATIENCE, source.read_chunk(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn resubscribe_after_unsubscribe() {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let mut writer = File::from(write_end);
        let mut source = StdinSource::from_fd(read_end.as_raw_fd()).unwrap();
        let mut buf = [0u8; 16];

        source.subscribe().unwrap();
        source.unsubscribe();
        assert!(!source.is_subscribed());

        writer.write_all(b"b\n").unwrap();
        assert!(timeout(QUIET, source.read_chunk(&mut buf)).await.is_err());

        source.subscribe().unwrap();
        let n = timeout(PATIENCE, source.read_chunk(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"b\n");
    }

    #[tokio::test]
    async fn source_restores_flags_on_drop() {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        let fd = read_end.as_raw_fd();

        let mut source = StdinSource::from_fd(fd).unwrap();
        source.subscribe().unwrap();
        assert!(flags(fd).contains(OFlag::O_NONBLOCK));

        drop(source);
        assert!(!flags(fd).contains(OFlag::O_NONBLOCK));
    }

    #[tokio::test]
    async fn regular_file_is_read_directly() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"from a file\n").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut source = StdinSource::from_fd(file.as_raw_fd()).unwrap();
        source.subscribe().unwrap();
        assert!(source.is_subscribed());
        assert!(source.direct);
        assert!(source.registration.is_none());

        let mut buf = [0u8; 64];
        let n = timeout(PATIENCE, source.read_chunk(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"from a file\n");

        let n = timeout(PATIENCE, source.read_chunk(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }
}
