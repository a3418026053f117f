//! Deadline plumbing: the engine that turns asynchronous transport
//! operations into blocking, deadline-bounded calls.
//!
//! Each session owns a [`TimedRuntime`]: a private current-thread reactor
//! driven one operation at a time with `block_on`. A deadline is armed for
//! exactly the span of one call and disarmed when the call returns,
//! whatever the outcome. When the deadline fires the pending future is
//! dropped, which cancels the in-flight operation; the owning session then
//! decides what that means (sockets close their handle, the resolver
//! abandons the lookup).

use std::future::Future;
use std::time::{Duration, Instant};

use crate::base::neterror::Error;

/// Minimal resolvable duration. Anything shorter is below timer setup
/// overhead and is treated as already expired.
pub const DURATION_RESOLUTION: Duration = Duration::from_micros(1);

/// A point on the monotonic clock by which an operation must complete,
/// or `Never` for unbounded blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    At(Instant),
    Never,
}

impl Deadline {
    /// Deadline `timeout` from now. Sub-resolution timeouts produce an
    /// already-expired deadline.
    pub fn after(timeout: Duration) -> Self {
        Deadline::At(Instant::now() + timeout)
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        match self {
            Deadline::At(at) => *at <= Instant::now() + DURATION_RESOLUTION,
            Deadline::Never => false,
        }
    }

    /// Time left until expiry. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
            Deadline::Never => None,
        }
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        if timeout < DURATION_RESOLUTION {
            // Below the resolution there is nothing to arm; expire now.
            Deadline::At(Instant::now())
        } else {
            Deadline::after(timeout)
        }
    }
}

impl From<Instant> for Deadline {
    fn from(at: Instant) -> Self {
        Deadline::At(at)
    }
}

/// Private single-threaded reactor owned by one session or resolver.
///
/// Not thread-safe by contract: operations on the same owner must be
/// serialized, which `&mut self` receivers on the owners enforce. At most
/// one deadline is armed per runtime at any moment because the runtime is
/// only ever inside a single `run_until` call.
#[derive(Debug)]
pub(crate) struct TimedRuntime {
    rt: tokio::runtime::Runtime,
}

impl TimedRuntime {
    pub(crate) fn new() -> Result<Self, Error> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(TimedRuntime { rt })
    }

    /// Drive `fut` to completion, bounded by `deadline`.
    ///
    /// An expired deadline returns [`Error::Timeout`] without polling the
    /// future. On expiry mid-flight the future is dropped, cancelling the
    /// pending operation.
    pub(crate) fn run_until<F>(&self, deadline: Deadline, fut: F) -> Result<F::Output, Error>
    where
        F: Future,
    {
        match deadline {
            Deadline::Never => Ok(self.rt.block_on(fut)),
            Deadline::At(at) => {
                if deadline.expired() {
                    return Err(Error::Timeout);
                }
                let at = tokio::time::Instant::from_std(at);
                self.rt
                    .block_on(async move { tokio::time::timeout_at(at, fut).await })
                    .map_err(|_| Error::Timeout)
            }
        }
    }
}
