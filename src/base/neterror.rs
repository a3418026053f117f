use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Error surface of the library.
///
/// Every failure is reported both as a typed variant and a human-readable
/// message. Variants are grouped by failure class: deadline, resolution,
/// connect, handshake, transport I/O, HTTP framing, pool.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // Deadline
    #[error("operation timed out")]
    Timeout,

    // Resolution
    #[error("host not found")]
    HostNotFound,
    #[error("host not found, temporary resolver failure")]
    HostNotFoundTryAgain,
    #[error("name resolution failed: {0}")]
    ResolveFailed(Arc<io::Error>),

    // Connect
    #[error("connection refused")]
    ConnectionRefused,
    #[error("address unreachable")]
    AddressUnreachable,
    #[error("connection aborted")]
    ConnectionAborted,

    // Handshake
    #[error("TLS certificate verification failed: {0}")]
    HandshakeVerification(String),
    #[error("TLS protocol error: {0}")]
    HandshakeProtocol(String),

    // Transport I/O
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("broken pipe")]
    BrokenPipe,
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("socket not connected")]
    NotConnected,
    #[error("session already closed")]
    BadDescriptor,
    #[error("endpoint transport does not match session type")]
    WrongProtocolType,

    // HTTP framing
    #[error("malformed HTTP response: {0}")]
    InvalidResponse(&'static str),
    #[error("receive buffer limit exceeded")]
    BufferOverflow,
    #[error("end of stream before message completed")]
    EndOfStream,

    // Pool
    #[error("connection pool is empty")]
    PoolEmpty,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl Error {
    /// True if this error was produced by a deadline firing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// True for resolution-class failures.
    pub fn is_resolve(&self) -> bool {
        matches!(
            self,
            Error::HostNotFound | Error::HostNotFoundTryAgain | Error::ResolveFailed(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => Error::ConnectionRefused,
            ErrorKind::ConnectionReset => Error::ConnectionReset,
            ErrorKind::ConnectionAborted => Error::ConnectionAborted,
            ErrorKind::NotConnected => Error::NotConnected,
            ErrorKind::BrokenPipe => Error::BrokenPipe,
            ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            ErrorKind::TimedOut => Error::Timeout,
            ErrorKind::AddrNotAvailable => Error::AddressUnreachable,
            _ => Error::Io(Arc::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_classification() {
        let err: Error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(err, Error::ConnectionRefused));

        let err: Error = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(err.is_timeout());

        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, Error::UnexpectedEof));
    }

    #[test]
    fn unclassified_io_error_keeps_source() {
        let err: Error = io::Error::other("weird").into();
        match err {
            Error::Io(source) => assert_eq!(source.kind(), io::ErrorKind::Other),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(Error::Timeout.to_string(), "operation timed out");
        assert_eq!(Error::PoolEmpty.to_string(), "connection pool is empty");
        assert_eq!(
            Error::BufferOverflow.to_string(),
            "receive buffer limit exceeded"
        );
    }

    #[test]
    fn resolve_class_predicate() {
        assert!(Error::HostNotFound.is_resolve());
        assert!(Error::HostNotFoundTryAgain.is_resolve());
        assert!(!Error::Timeout.is_resolve());
    }
}
