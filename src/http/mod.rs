//! HTTP/1.1 layer: wire codec and the session type that runs it over any
//! stream socket. Message types are the `http` crate's `Request` and
//! `Response` with `Bytes` bodies.

mod codec;
mod session;

pub use codec::{RequestSerializer, ResponseParser};
pub use session::{HttpSession, DEFAULT_BODY_LIMIT, DEFAULT_HEADER_LIMIT};

use crate::socket::{TcpSession, TlsSession};

/// HTTP over plain TCP.
pub type HttpClient = HttpSession<TcpSession>;
/// HTTP over TLS.
pub type HttpsClient = HttpSession<TlsSession>;
