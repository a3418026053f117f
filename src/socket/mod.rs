//! Deadline-bounded client sockets.
//!
//! Every session here presents blocking, deadline-bounded I/O on top of an
//! asynchronous transport: the caller supplies a [`Deadline`] (or relies on
//! the session's default I/O timeout) and the call returns when the
//! operation completes or the deadline fires. A fired deadline closes the
//! underlying handle; the session is unusable afterwards and must be
//! discarded.
//!
//! Capability tiers mirror what the layers can do:
//! [`TransportStream`] (whole-buffer send/receive, close) is implemented by
//! all sessions, [`StreamSocket`] adds partial transfers for byte streams,
//! and [`EstablishSession`] is the hook connectors use to manufacture a
//! session of the configured kind at a resolved endpoint.

mod dgram;
mod stream;
mod tls;

pub use dgram::UdpSession;
pub use stream::TcpSession;
pub use tls::TlsSession;

use std::net::SocketAddr;
use std::time::Duration;

use crate::base::neterror::Error;
use crate::base::timed::Deadline;

/// Transport family an endpoint was resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// A transport-tagged (address, port) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub addr: SocketAddr,
    pub transport: Transport,
}

impl Endpoint {
    pub fn new(addr: SocketAddr, transport: Transport) -> Self {
        Endpoint { addr, transport }
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Settings a connector hands to session constructors.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upstream hostname, used for TLS SNI and certificate verification.
    pub host: String,
    /// Default I/O timeout installed on constructed sessions.
    pub operation_timeout: Duration,
    /// Verify the peer certificate chain and hostname (RFC 2818).
    pub tls_verify: bool,
    /// HTTP receive limit for the header section, bytes.
    pub header_limit: usize,
    /// HTTP receive limit for the message body, bytes.
    pub body_limit: usize,
}

/// Whole-message transfer over any transport.
pub trait TransportStream {
    /// Write all of `data` or fail. The deadline is armed once for the
    /// whole call. Returns the number of bytes written.
    fn send(&mut self, data: &[u8], deadline: Deadline) -> Result<usize, Error>;

    /// Fill all of `data` or fail, same deadline semantics.
    fn receive(&mut self, data: &mut [u8], deadline: Deadline) -> Result<usize, Error>;

    /// Graceful close. Idempotent: closing an already-closed session
    /// succeeds.
    fn close(&mut self) -> Result<(), Error>;

    /// Whether the underlying handle is open.
    fn is_open(&self) -> bool;

    /// Deadline derived from the session's default I/O timeout, or
    /// `Never` when the timeout is disabled.
    fn io_deadline(&self) -> Deadline;
}

/// Byte-stream transports: single-operation partial transfers.
pub trait StreamSocket: TransportStream {
    /// One underlying write; returns the count actually transferred.
    fn write_some(&mut self, data: &[u8], deadline: Deadline) -> Result<usize, Error>;

    /// One underlying read; returns the count actually transferred.
    /// A return of 0 signals end of stream.
    fn read_some(&mut self, data: &mut [u8], deadline: Deadline) -> Result<usize, Error>;
}

/// Session kinds a connector can manufacture.
pub trait EstablishSession: Sized + Send + 'static {
    /// Transport family this session kind expects its endpoints in.
    const TRANSPORT: Transport;

    /// Construct a connected session to `endpoint`, bounded by `deadline`
    /// (including any handshake).
    fn establish(
        config: &SessionConfig,
        endpoint: &Endpoint,
        deadline: Deadline,
    ) -> Result<Self, Error>;

    /// Whether the session's handle is still open.
    fn is_open(&self) -> bool;
}
