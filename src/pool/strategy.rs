//! Pool refill strategies.
//!
//! A strategy decides how aggressively vacant pool slots are refilled.
//! The watcher calls [`PoolStrategy::refill`] with the number of vacancies
//! and an `append` hook; `true` means progress was made and the watcher may
//! loop immediately, `false` means the strategy wants to yield.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::base::logger::{log_debug, log_warn};
use crate::base::neterror::Error;
use crate::connector::Connector;
use crate::socket::EstablishSession;

/// Policy deciding how to refill vacant pool slots.
pub trait PoolStrategy<S: EstablishSession>: Send {
    /// Try to fill up to `vacant` slots with sessions from `connector`,
    /// handing each one to `append`. Errors from the connector must be
    /// swallowed (logged) to keep the pool loop alive.
    fn refill(&mut self, connector: &Connector<S>, vacant: usize, append: &(dyn Fn(S) + Sync))
        -> bool;
}

/// Refill every vacancy at once, one connect attempt per slot.
#[derive(Debug, Default)]
pub struct GreedyStrategy;

impl GreedyStrategy {
    pub fn new() -> Self {
        GreedyStrategy
    }
}

impl<S: EstablishSession> PoolStrategy<S> for GreedyStrategy {
    fn refill(
        &mut self,
        connector: &Connector<S>,
        vacant: usize,
        append: &(dyn Fn(S) + Sync),
    ) -> bool {
        if vacant == 0 {
            return false;
        }
        thread::scope(|scope| {
            for _ in 0..vacant {
                scope.spawn(|| match connector.new_session_default() {
                    Ok(session) => append(session),
                    Err(err) => log_warn!("refill connect to {} failed: {err}", connector.target()),
                });
            }
        });
        true
    }
}

/// Maximum back-off delay for [`ConservativeStrategy`].
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Exponential back-off refill with jitter.
///
/// While the peer keeps refusing sessions the strategy backs off
/// geometrically (initial delay, then multiplied per failure round,
/// clamped at 10 s) and schedules its next attempt after a jittered wait.
/// Any success resets the back-off.
#[derive(Debug)]
pub struct ConservativeStrategy {
    initial_delay: Duration,
    multiplier: f64,
    delay: Duration,
    wait_until: Instant,
}

impl ConservativeStrategy {
    /// Default first-failure delay, 50 ms.
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(50);
    /// Default per-failure growth factor.
    pub const DEFAULT_MULTIPLIER: f64 = 3.0;

    /// `multiplier` must be at least 1, otherwise the back-off would
    /// shrink on failure.
    pub fn new(initial_delay: Duration, multiplier: f64) -> Result<Self, Error> {
        if multiplier < 1.0 {
            return Err(Error::InvalidConfig("back-off multiplier must be >= 1"));
        }
        Ok(ConservativeStrategy {
            initial_delay,
            multiplier,
            delay: Duration::ZERO,
            wait_until: Instant::now(),
        })
    }

    fn note_success(&mut self) {
        self.delay = Duration::ZERO;
    }

    /// Grow the back-off and schedule the next attempt with jitter in
    /// [0, 1) applied to the wait.
    fn note_failure(&mut self) {
        self.delay = if self.delay.is_zero() {
            self.initial_delay
        } else {
            self.delay.mul_f64(self.multiplier)
        }
        .min(MAX_BACKOFF);
        let wait = self.delay.mul_f64(rand::rng().random::<f64>());
        self.wait_until = Instant::now() + wait;
    }

    #[cfg(test)]
    fn backoff_delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ConservativeStrategy {
    fn default() -> Self {
        ConservativeStrategy {
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
            multiplier: Self::DEFAULT_MULTIPLIER,
            delay: Duration::ZERO,
            wait_until: Instant::now(),
        }
    }
}

impl<S: EstablishSession> PoolStrategy<S> for ConservativeStrategy {
    fn refill(
        &mut self,
        connector: &Connector<S>,
        vacant: usize,
        append: &(dyn Fn(S) + Sync),
    ) -> bool {
        if vacant == 0 || Instant::now() < self.wait_until {
            return false;
        }
        // One attempt always runs inline; extra parallelism only while the
        // back-off is idle.
        let parallel = if self.delay.is_zero() {
            (vacant.div_ceil(3)).saturating_sub(1)
        } else {
            0
        };

        let progressed = AtomicBool::new(false);
        thread::scope(|scope| {
            for _ in 0..parallel {
                scope.spawn(|| match connector.new_session_default() {
                    Ok(session) => {
                        progressed.store(true, Ordering::Relaxed);
                        append(session);
                    }
                    Err(err) => {
                        log_debug!("refill connect to {} failed: {err}", connector.target())
                    }
                });
            }
            match connector.new_session_default() {
                Ok(session) => {
                    progressed.store(true, Ordering::Relaxed);
                    append(session);
                }
                Err(err) => log_debug!("refill connect to {} failed: {err}", connector.target()),
            }
        });

        if progressed.load(Ordering::Relaxed) {
            self.note_success();
            true
        } else {
            self.note_failure();
            false
        }
    }
}
