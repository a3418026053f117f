//! Bounded reservoir of established sessions.
//!
//! A [`ConnectionPool`] owns a [`Connector`] and keeps up to `size`
//! connected sessions warm. A watcher thread evicts entries that idled past
//! their timeout and asks the configured [`PoolStrategy`] to refill the
//! vacancies. Entries are delivered FIFO by insertion time.
//!
//! The pool never validates pooled sessions: a session may have been closed
//! by the peer while it sat idle, which surfaces on first use. Such
//! sessions must not be returned.

mod strategy;

pub use strategy::{ConservativeStrategy, GreedyStrategy, PoolStrategy};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::base::logger::{log_debug, log_warn};
use crate::base::neterror::Error;
use crate::base::timed::Deadline;
use crate::connector::{Connector, ConnectorConfig};
use crate::http::HttpSession;
use crate::socket::{EstablishSession, TcpSession, TlsSession, UdpSession};

/// Budget for `return_session` to take the pool lock; a stalled return is
/// worse than a fresh session.
const RETURN_LOCK_BUDGET: Duration = Duration::from_millis(1);
/// Budget for one watcher pass to take the pool lock.
const WATCH_LOCK_BUDGET: Duration = Duration::from_millis(100);
/// Watcher sleep when a pass made no progress.
const WATCH_IDLE_SLEEP: Duration = Duration::from_millis(50);

type Entries<S> = VecDeque<(Instant, S)>;

struct PoolInner<S> {
    entries: Mutex<Entries<S>>,
    cv: Condvar,
    max_size: usize,
    idle_timeout: Option<Duration>,
    watching: AtomicBool,
}

/// Pool of warm sessions to one logical remote.
///
/// Thread-safe; one instance supports concurrent borrows and returns.
/// The live session count may transiently reach `size + 1` when a borrowed
/// session is returned after the watcher already replaced it.
pub struct ConnectionPool<S: EstablishSession, St: PoolStrategy<S> = GreedyStrategy> {
    inner: Arc<PoolInner<S>>,
    connector: Arc<Connector<S>>,
    watcher: Option<thread::JoinHandle<()>>,
    _strategy: std::marker::PhantomData<fn() -> St>,
}

impl<S: EstablishSession> ConnectionPool<S, GreedyStrategy> {
    /// Pool of `size` sessions with greedy refill and no idle expiry.
    pub fn new(size: usize, config: ConnectorConfig) -> Result<Self, Error> {
        Self::with_strategy(size, None, config, GreedyStrategy)
    }

    /// Pool of `size` sessions with greedy refill; entries idling past
    /// `idle_timeout` are evicted by the watcher.
    pub fn with_idle_timeout(
        size: usize,
        idle_timeout: Duration,
        config: ConnectorConfig,
    ) -> Result<Self, Error> {
        Self::with_strategy(size, Some(idle_timeout), config, GreedyStrategy)
    }
}

impl<S, St> ConnectionPool<S, St>
where
    S: EstablishSession,
    St: PoolStrategy<S> + 'static,
{
    /// Fully parameterized constructor. Starts the connector's refresh
    /// worker and the pool watcher; the pool begins filling immediately.
    pub fn with_strategy(
        size: usize,
        idle_timeout: Option<Duration>,
        config: ConnectorConfig,
        strategy: St,
    ) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidConfig("pool size must be at least 1"));
        }
        let connector = Arc::new(Connector::new(config)?);
        let inner = Arc::new(PoolInner {
            entries: Mutex::new(VecDeque::with_capacity(size + 1)),
            cv: Condvar::new(),
            max_size: size,
            idle_timeout,
            watching: AtomicBool::new(true),
        });

        let watcher_inner = Arc::clone(&inner);
        let watcher_connector = Arc::clone(&connector);
        let watcher = thread::Builder::new()
            .name("warmline-pool".into())
            .spawn(move || watch_routine(watcher_inner, watcher_connector, strategy))
            .map_err(Error::from)?;

        Ok(ConnectionPool {
            inner,
            connector,
            watcher: Some(watcher),
            _strategy: std::marker::PhantomData,
        })
    }

    /// Pull the oldest session from the pool, waiting until `deadline`
    /// for one to appear.
    ///
    /// Fails with [`Error::Timeout`] when the pool lock cannot be taken in
    /// time and [`Error::PoolEmpty`] when the pool stayed empty past the
    /// deadline.
    pub fn get_session(&self, deadline: impl Into<Deadline>) -> Result<S, Error> {
        let deadline = deadline.into();
        let mut entries = self.lock_until(deadline)?;
        while entries.is_empty() {
            match deadline {
                Deadline::Never => self.inner.cv.wait(&mut entries),
                Deadline::At(at) => {
                    if self.inner.cv.wait_until(&mut entries, at).timed_out()
                        && entries.is_empty()
                    {
                        return Err(Error::PoolEmpty);
                    }
                }
            }
        }
        let Some((_, session)) = entries.pop_front() else {
            return Err(Error::PoolEmpty);
        };
        Ok(session)
    }

    /// [`Self::get_session`] bounded by the configured connect timeout.
    pub fn get_session_default(&self) -> Result<S, Error> {
        self.get_session(self.connector.connect_timeout())
    }

    /// Pull a session without waiting for the pool to fill: once the lock
    /// is taken, an empty pool fails immediately with
    /// [`Error::PoolEmpty`].
    pub fn try_get_session(&self, deadline: impl Into<Deadline>) -> Result<S, Error> {
        let mut entries = self.lock_until(deadline.into())?;
        let Some((_, session)) = entries.pop_front() else {
            return Err(Error::PoolEmpty);
        };
        Ok(session)
    }

    /// Return a previously pulled session.
    ///
    /// Closed sessions are dropped. If the pool lock stays contested past
    /// a 1 ms budget the session is dropped too, with a warning; a fresh
    /// connection is cheaper than a stalled caller.
    pub fn return_session(&self, session: S) {
        if !session.is_open() {
            log_debug!("dropping closed session returned to pool for {}", self.target());
            return;
        }
        let Some(mut entries) = self.inner.entries.try_lock_for(RETURN_LOCK_BUDGET) else {
            log_warn!(
                "pool lock contested over {RETURN_LOCK_BUDGET:?}; dropping returned session for {}",
                self.target()
            );
            return;
        };
        entries.push_back((Instant::now(), session));
        drop(entries);
        self.inner.cv.notify_all();
    }

    /// Whether the pool holds at least one session, waiting until
    /// `deadline` for it to become non-empty. Fails with
    /// [`Error::Timeout`] only when the pool lock cannot be taken.
    pub fn is_connected(&self, deadline: impl Into<Deadline>) -> Result<bool, Error> {
        let deadline = deadline.into();
        let mut entries = self.lock_until(deadline)?;
        while entries.is_empty() {
            match deadline {
                Deadline::Never => self.inner.cv.wait(&mut entries),
                Deadline::At(at) => {
                    if self.inner.cv.wait_until(&mut entries, at).timed_out() {
                        return Ok(!entries.is_empty());
                    }
                }
            }
        }
        Ok(true)
    }

    /// Number of sessions the pool maintains.
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// The underlying connector.
    pub fn connector(&self) -> &Connector<S> {
        &self.connector
    }

    fn target(&self) -> String {
        self.connector.target()
    }

    fn lock_until(&self, deadline: Deadline) -> Result<MutexGuard<'_, Entries<S>>, Error> {
        match deadline {
            Deadline::Never => Ok(self.inner.entries.lock()),
            Deadline::At(at) => self.inner.entries.try_lock_until(at).ok_or(Error::Timeout),
        }
    }
}

impl<S: EstablishSession, St: PoolStrategy<S>> Drop for ConnectionPool<S, St> {
    fn drop(&mut self) {
        self.inner.watching.store(false, Ordering::Release);
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
    }
}

/// Watcher loop: evict idle entries, refill vacancies via the strategy.
///
/// `append` takes only the pool mutex, so a connector blocked on DNS can
/// never deadlock the pool.
fn watch_routine<S, St>(inner: Arc<PoolInner<S>>, connector: Arc<Connector<S>>, mut strategy: St)
where
    S: EstablishSession,
    St: PoolStrategy<S>,
{
    while inner.watching.load(Ordering::Acquire) {
        let vacant = {
            let Some(mut entries) = inner.entries.try_lock_for(WATCH_LOCK_BUDGET) else {
                continue;
            };
            if let Some(idle) = inner.idle_timeout {
                let now = Instant::now();
                let before = entries.len();
                entries.retain(|(stamp, _)| now.duration_since(*stamp) < idle);
                let evicted = before - entries.len();
                if evicted > 0 {
                    log_debug!("evicted {evicted} idle session(s)");
                }
            }
            inner.max_size.saturating_sub(entries.len())
        };

        if vacant > 0 {
            let append_inner = &inner;
            let append = move |session: S| {
                let mut entries = append_inner.entries.lock();
                entries.push_back((Instant::now(), session));
                drop(entries);
                append_inner.cv.notify_one();
            };
            if strategy.refill(&connector, vacant, &append) {
                continue;
            }
        }
        thread::sleep(WATCH_IDLE_SLEEP);
    }
}

/// Pool of plain TCP sessions, greedy refill.
pub type TcpPool = ConnectionPool<TcpSession>;
/// Pool of plain TCP sessions, conservative refill.
pub type TcpConservativePool = ConnectionPool<TcpSession, ConservativeStrategy>;
/// Pool of UDP sessions, greedy refill.
pub type UdpPool = ConnectionPool<UdpSession>;
/// Pool of UDP sessions, conservative refill.
pub type UdpConservativePool = ConnectionPool<UdpSession, ConservativeStrategy>;
/// Pool of TLS sessions, greedy refill.
pub type TlsPool = ConnectionPool<TlsSession>;
/// Pool of TLS sessions, conservative refill.
pub type TlsConservativePool = ConnectionPool<TlsSession, ConservativeStrategy>;
/// Pool of HTTP sessions, greedy refill.
pub type HttpPool = ConnectionPool<HttpSession<TcpSession>>;
/// Pool of HTTP sessions, conservative refill.
pub type HttpConservativePool = ConnectionPool<HttpSession<TcpSession>, ConservativeStrategy>;
/// Pool of HTTPS sessions, greedy refill.
pub type HttpsPool = ConnectionPool<HttpSession<TlsSession>>;
/// Pool of HTTPS sessions, conservative refill.
pub type HttpsConservativePool = ConnectionPool<HttpSession<TlsSession>, ConservativeStrategy>;
