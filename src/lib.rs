//! # warmline
//!
//! A client-side network session library with synchronous, deadline-bounded
//! I/O over TCP, UDP, TLS and HTTP/1.1, a DNS-refreshing connector, and a
//! connection pool that keeps a warm set of sessions under a pluggable
//! refill strategy.
//!
//! ## Features
//!
//! - **Deadline-bounded blocking I/O**: every operation takes a deadline or
//!   timeout; a fired deadline closes the session.
//! - **Connector**: background DNS refresh with randomized endpoint
//!   selection feeding session construction.
//! - **Connection pool**: bounded FIFO reservoir with idle eviction and
//!   greedy or conservative (exponential back-off) refill.
//! - **TLS**: BoringSSL with SNI and RFC 2818 hostname verification.
//! - **HTTP/1.1**: incremental framing with hard header and body limits.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use warmline::connector::ConnectorConfig;
//! use warmline::pool::HttpPool;
//!
//! let config = ConnectorConfig::new("example.com", 80);
//! let pool = HttpPool::new(4, config).unwrap();
//!
//! let mut session = pool.get_session(Duration::from_secs(5)).unwrap();
//! let request = http::Request::builder()
//!     .uri("/")
//!     .header("host", "example.com")
//!     .body(bytes::Bytes::new())
//!     .unwrap();
//! let response = session.perform(&request, Duration::from_secs(5)).unwrap();
//! pool.return_session(session);
//! println!("status: {}", response.status());
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error taxonomy, deadlines, and the logging interface
//! - [`socket`] - TCP, UDP and TLS sessions
//! - [`http`] - HTTP/1.1 framing and sessions
//! - [`dns`] - Deadline-bounded resolver
//! - [`connector`] - Session factory with background DNS refresh
//! - [`pool`] - Connection pool and refill strategies

pub mod base;
pub mod connector;
pub mod dns;
pub mod http;
pub mod pool;
pub mod socket;

pub use base::logger::{log_level, log_message, set_log_level, set_logger, set_logger_fn};
pub use base::{ConsoleLogger, Deadline, Error, FnLogger, LogHandler, LogLevel};
pub use connector::{Connector, ConnectorConfig};
pub use pool::ConnectionPool;
pub use socket::{Endpoint, StreamSocket, TransportStream};
