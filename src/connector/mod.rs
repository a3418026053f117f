//! Session factory with background DNS refresh.
//!
//! A [`Connector`] owns a resolver driven by a worker thread. The worker
//! resolves once at startup and again whenever a refresh is requested;
//! failed resolves are retried on a bounded wait. [`Connector::new_session`]
//! picks a random endpoint from the cached list and constructs a session of
//! the configured kind, requesting a refresh whenever construction fails.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::base::logger::{log_debug, log_info, log_warn};
use crate::base::neterror::Error;
use crate::base::timed::Deadline;
use crate::dns::{IpFamily, Resolver, ResolveFlags};
use crate::http::HttpSession;
use crate::socket::{
    Endpoint, EstablishSession, SessionConfig, TcpSession, TlsSession, UdpSession,
};

/// Bounded wait before the worker retries a failed resolve on its own.
const RESOLVE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Construction-time settings for a connector and the sessions it makes.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Remote hostname: a DNS name or a literal address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Bound for one DNS resolve attempt.
    pub resolve_timeout: Duration,
    /// Default bound for `new_session` (and pool `get_session`).
    pub connect_timeout: Duration,
    /// Default I/O bound installed on constructed sessions.
    pub operation_timeout: Duration,
    /// IP family to resolve into.
    pub ip_family: IpFamily,
    /// Resolution hints.
    pub resolve_flags: ResolveFlags,
    /// Verify TLS peer certificates and hostname (RFC 2818).
    pub tls_verify: bool,
    /// HTTP receive limit for the header section.
    pub header_limit: usize,
    /// HTTP receive limit for the body.
    pub body_limit: usize,
}

impl ConnectorConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectorConfig {
            host: host.into(),
            port,
            resolve_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(30),
            ip_family: IpFamily::default(),
            resolve_flags: ResolveFlags::default(),
            tls_verify: true,
            header_limit: crate::http::DEFAULT_HEADER_LIMIT,
            body_limit: crate::http::DEFAULT_BODY_LIMIT,
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host.clone(),
            operation_timeout: self.operation_timeout,
            tls_verify: self.tls_verify,
            header_limit: self.header_limit,
            body_limit: self.body_limit,
        }
    }
}

/// A (mutex, condvar, flag) triple supporting notify and bounded waits.
struct Event {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl Event {
    fn new(initial: bool) -> Self {
        Event {
            flag: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    fn set(&self) {
        *self.flag.lock() = true;
        self.cv.notify_all();
    }

    fn clear(&self) {
        *self.flag.lock() = false;
    }

    /// Wait until the flag is set or `deadline` passes. Returns the flag
    /// state observed last.
    fn wait_set_until(&self, deadline: Deadline) -> bool {
        let mut flag = self.flag.lock();
        while !*flag {
            match deadline {
                Deadline::Never => self.cv.wait(&mut flag),
                Deadline::At(at) => {
                    if self.cv.wait_until(&mut flag, at).timed_out() {
                        return *flag;
                    }
                }
            }
        }
        true
    }
}

struct Shared {
    endpoints: Mutex<Vec<Endpoint>>,
    resolve_error: Mutex<Option<Error>>,
    resolve_needed: Event,
    resolve_done: Event,
    running: AtomicBool,
}

/// Factory of connected sessions to one logical remote, with DNS kept
/// fresh by a background worker. Thread-safe; one instance supports
/// concurrent `new_session` calls.
pub struct Connector<S: EstablishSession> {
    config: ConnectorConfig,
    session_config: SessionConfig,
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
    _session: PhantomData<fn() -> S>,
}

impl<S: EstablishSession> Connector<S> {
    /// Create the connector and start its refresh worker. The worker
    /// performs an initial resolve immediately; no connections are
    /// established until [`Self::new_session`].
    pub fn new(config: ConnectorConfig) -> Result<Self, Error> {
        let resolver = Resolver::new(
            config.host.clone(),
            config.port,
            config.resolve_timeout,
            S::TRANSPORT,
            config.ip_family,
            config.resolve_flags,
        )?;
        let shared = Arc::new(Shared {
            endpoints: Mutex::new(Vec::new()),
            resolve_error: Mutex::new(None),
            // The worker resolves once at startup: "needed" starts set.
            resolve_needed: Event::new(true),
            resolve_done: Event::new(false),
            running: AtomicBool::new(true),
        });

        let worker_shared = Arc::clone(&shared);
        let resolve_timeout = config.resolve_timeout;
        let worker = thread::Builder::new()
            .name("warmline-resolve".into())
            .spawn(move || refresh_routine(worker_shared, resolver, resolve_timeout))
            .map_err(Error::from)?;

        let session_config = config.session_config();
        Ok(Connector {
            config,
            session_config,
            shared,
            worker: Some(worker),
            _session: PhantomData,
        })
    }

    /// Establish a new session, bounded by `deadline`.
    ///
    /// Picks a random endpoint from the resolved list, waiting for the
    /// first resolve outcome when the list is still empty. A failed
    /// connect requests a DNS refresh (requests are coalesced) and retries
    /// while time remains; the deadline is a hard bound regardless of
    /// refresh progress.
    pub fn new_session(&self, deadline: impl Into<Deadline>) -> Result<S, Error> {
        let deadline = deadline.into();
        loop {
            let endpoint = match self.pick_endpoint() {
                Some(endpoint) => endpoint,
                None => {
                    // The worker always signals "done" after its first
                    // attempt, so this wait terminates at the first
                    // resolve outcome or the deadline.
                    if !self.shared.resolve_done.wait_set_until(deadline) {
                        return Err(self.last_resolve_error().unwrap_or(Error::Timeout));
                    }
                    match self.pick_endpoint() {
                        Some(endpoint) => endpoint,
                        None => {
                            return Err(self.last_resolve_error().unwrap_or(Error::Timeout));
                        }
                    }
                }
            };

            match S::establish(&self.session_config, &endpoint, deadline) {
                Ok(session) => return Ok(session),
                Err(err) => {
                    self.request_refresh();
                    if deadline.expired() {
                        return Err(if err.is_timeout() { Error::Timeout } else { err });
                    }
                    log_debug!(
                        "connect to {} ({}) failed: {}; retrying until deadline",
                        self.target(),
                        endpoint,
                        err
                    );
                }
            }
        }
    }

    /// [`Self::new_session`] bounded by the configured connect timeout.
    pub fn new_session_default(&self) -> Result<S, Error> {
        self.new_session(self.config.connect_timeout)
    }

    /// Remote hostname.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Remote in `host:port` form.
    pub fn target(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Bound for one DNS resolve attempt.
    pub fn resolve_timeout(&self) -> Duration {
        self.config.resolve_timeout
    }

    /// Default bound for `new_session`.
    pub fn connect_timeout(&self) -> Duration {
        self.config.connect_timeout
    }

    /// Default I/O bound on sessions this connector makes.
    pub fn operation_timeout(&self) -> Duration {
        self.config.operation_timeout
    }

    /// Ask the worker for a DNS refresh. Requests are coalesced.
    fn request_refresh(&self) {
        self.shared.resolve_needed.set();
    }

    fn pick_endpoint(&self) -> Option<Endpoint> {
        let endpoints = self.shared.endpoints.lock();
        if endpoints.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..endpoints.len());
        Some(endpoints[index])
    }

    fn last_resolve_error(&self) -> Option<Error> {
        self.shared.resolve_error.lock().clone()
    }
}

impl<S: EstablishSession> Drop for Connector<S> {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.resolve_needed.set();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Background routine keeping the endpoint cache fresh.
fn refresh_routine(shared: Arc<Shared>, mut resolver: Resolver, resolve_timeout: Duration) {
    let mut last_failed = false;
    while shared.running.load(Ordering::Acquire) {
        // Wait for an explicit request; after a failure, retry on a
        // bounded wait even without one.
        if last_failed {
            shared
                .resolve_needed
                .wait_set_until(Deadline::after(RESOLVE_RETRY_DELAY));
        } else {
            shared.resolve_needed.wait_set_until(Deadline::Never);
        }
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        shared.resolve_needed.clear();

        match resolver.resolve(resolve_timeout) {
            Ok(endpoints) => {
                log_info!("endpoint list refreshed: {} entries", endpoints.len());
                *shared.endpoints.lock() = endpoints;
                *shared.resolve_error.lock() = None;
                last_failed = false;
            }
            Err(err) => {
                // Prior endpoints are kept; the error is recorded for
                // new_session to surface when the cache is empty.
                log_warn!("resolve failed: {err}");
                *shared.resolve_error.lock() = Some(err);
                last_failed = true;
            }
        }
        shared.resolve_done.set();
    }
}

/// Connector for plain TCP sessions.
pub type TcpConnector = Connector<TcpSession>;
/// Connector for UDP sessions.
pub type UdpConnector = Connector<UdpSession>;
/// Connector for TLS sessions.
pub type TlsConnector = Connector<TlsSession>;
/// Connector for HTTP sessions.
pub type HttpConnector = Connector<HttpSession<TcpSession>>;
/// Connector for HTTPS sessions.
pub type HttpsConnector = Connector<HttpSession<TlsSession>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wait_times_out_when_clear() {
        let event = Event::new(false);
        assert!(!event.wait_set_until(Deadline::after(Duration::from_millis(20))));
    }

    #[test]
    fn event_wait_returns_immediately_when_set() {
        let event = Event::new(true);
        assert!(event.wait_set_until(Deadline::after(Duration::from_millis(20))));
    }

    #[test]
    fn event_set_wakes_waiter() {
        let event = Arc::new(Event::new(false));
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait_set_until(Deadline::after(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(20));
        event.set();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn config_defaults() {
        let config = ConnectorConfig::new("example.org", 443);
        assert_eq!(config.port, 443);
        assert!(config.tls_verify);
        assert_eq!(config.ip_family, IpFamily::Any);
        assert!(config.resolve_flags.address_configured);
    }
}
