//! Errors raised by the stdin bridge.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to read from input: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write to output: {0}")]
    Write(#[source] io::Error),

    #[error("failed to subscribe to input readiness: {0}")]
    Subscribe(#[source] io::Error),

    #[error("failed to encode broadcast payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("bridge actor is no longer running")]
    ActorGone,
}

impl BridgeError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Read(_) => "read_failed",
            Self::Write(_) => "write_failed",
            Self::Subscribe(_) => "subscribe_failed",
            Self::Encode(_) => "encode_failed",
            Self::ActorGone => "actor_gone",
        }
    }

    /// Whether the downstream reader of the tee went away.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Write(e) if e.kind() == io::ErrorKind::BrokenPipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        let read = BridgeError::Read(io::Error::other("boom"));
        assert_eq!(read.error_code(), "read_failed");
        assert_eq!(BridgeError::ActorGone.error_code(), "actor_gone");
    }

    #[test]
    fn display_includes_cause() {
        let err = BridgeError::Write(io::Error::other("disk full"));
        assert_eq!(err.to_string(), "failed to write to output: disk full");
    }

    #[test]
    fn broken_pipe_detection() {
        let err = BridgeError::Write(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_broken_pipe());

        let err = BridgeError::Read(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(!err.is_broken_pipe());
    }
}
