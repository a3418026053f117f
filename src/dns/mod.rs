//! Deadline-bounded DNS resolution.
//!
//! [`Resolver`] holds a prebuilt query (host, port, family, flags) and a
//! private reactor; `resolve` runs the system resolver on a blocking pool
//! thread and waits for it under the supplied deadline. Literal IP
//! addresses bypass the system resolver entirely.

use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::base::logger::log_debug;
use crate::base::neterror::Error;
use crate::base::timed::{Deadline, TimedRuntime};
use crate::socket::{Endpoint, Transport};

/// IP protocol family to resolve into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IpFamily {
    V4,
    V6,
    #[default]
    Any,
}

impl IpFamily {
    fn admits(&self, addr: &IpAddr) -> bool {
        match self {
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
            IpFamily::Any => true,
        }
    }
}

/// Hints for how name resolution should be performed.
///
/// `address_configured` mirrors the conventional AI_ADDRCONFIG behavior:
/// only return families the host has an address configured for. The system
/// resolver applies its own variant of this policy; the flag is carried as
/// a best-effort hint.
#[derive(Debug, Clone, Copy)]
pub struct ResolveFlags {
    pub address_configured: bool,
}

impl Default for ResolveFlags {
    fn default() -> Self {
        ResolveFlags {
            address_configured: true,
        }
    }
}

/// DNS resolver with bounded resolution time.
///
/// Not thread-safe: concurrent `resolve` calls must be serialized by the
/// caller, which the `&mut self` receiver enforces.
#[derive(Debug)]
pub struct Resolver {
    host: String,
    port: u16,
    transport: Transport,
    family: IpFamily,
    #[allow(dead_code)]
    flags: ResolveFlags,
    resolve_timeout: Duration,
    rt: TimedRuntime,
}

impl Resolver {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        resolve_timeout: Duration,
        transport: Transport,
        family: IpFamily,
        flags: ResolveFlags,
    ) -> Result<Self, Error> {
        Ok(Resolver {
            host: host.into(),
            port,
            transport,
            family,
            flags,
            resolve_timeout,
            rt: TimedRuntime::new()?,
        })
    }

    /// Default bound for one resolve attempt.
    pub fn resolve_timeout(&self) -> Duration {
        self.resolve_timeout
    }

    /// Resolve the stored query into endpoints, bounded by `deadline`.
    ///
    /// A successful call returns at least one endpoint. A literal IP host
    /// returns exactly one without consulting the system resolver.
    pub fn resolve(&mut self, deadline: impl Into<Deadline>) -> Result<Vec<Endpoint>, Error> {
        let deadline = deadline.into();
        if deadline.expired() {
            return Err(Error::Timeout);
        }
        if let Ok(literal) = self.host.parse::<IpAddr>() {
            if !self.family.admits(&literal) {
                return Err(Error::HostNotFound);
            }
            let addr = SocketAddr::new(literal, self.port);
            return Ok(vec![Endpoint::new(addr, self.transport)]);
        }

        let host = self.host.clone();
        let port = self.port;
        let resolved = self.rt.run_until(deadline, async move {
            tokio::task::spawn_blocking(move || {
                (host.as_str(), port)
                    .to_socket_addrs()
                    .map(|addrs| addrs.collect::<Vec<_>>())
            })
            .await
        })?;

        let addrs = match resolved {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(err)) => return Err(classify_resolve_error(err)),
            Err(join) => {
                return Err(Error::ResolveFailed(Arc::new(io::Error::other(join))));
            }
        };

        let family = self.family;
        let transport = self.transport;
        let endpoints: Vec<Endpoint> = addrs
            .into_iter()
            .filter(|addr| family.admits(&addr.ip()))
            .map(|addr| Endpoint::new(addr, transport))
            .collect();

        if endpoints.is_empty() {
            return Err(Error::HostNotFound);
        }
        log_debug!(
            "resolved {}:{} into {} endpoint(s)",
            self.host,
            self.port,
            endpoints.len()
        );
        Ok(endpoints)
    }
}

/// Split getaddrinfo failures into permanent and transient classes; keep
/// everything else verbatim.
fn classify_resolve_error(err: io::Error) -> Error {
    let text = err.to_string();
    if text.contains("Temporary failure") || text.contains("try again") {
        Error::HostNotFoundTryAgain
    } else if err.kind() == io::ErrorKind::NotFound
        || text.contains("not known")
        || text.contains("No address associated")
        || text.contains("nodename nor servname")
    {
        Error::HostNotFound
    } else {
        Error::ResolveFailed(Arc::new(err))
    }
}
