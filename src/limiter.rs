//! Shared request budget for one remote API.
//!
//! Every caller consults the same `RateLimiter` before issuing a request. It tracks a
//! `next_allowed` instant (pushed forward by a minimum inter-request interval and by
//! explicit rate-limit suspensions). Time is read through a [`Clock`] so tests can run
//! against virtual time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Time source used by the limiter and by retry backoff.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    fn sleep(&self, d: Duration);
}

/// Wall clock backed by `Instant` and `thread::sleep`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
    fn sleep(&self, d: Duration) {
        sleep(d);
    }
}

/// Virtual clock: `sleep` advances time instantly and records the requested duration.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn advance(&self, d: Duration) {
        *self.now.lock() += d;
    }
    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
    fn sleep(&self, d: Duration) {
        self.sleeps.lock().push(d);
        self.advance(d);
    }
}

struct LimiterState {
    next_allowed: Duration,
    min_interval: Duration,
    issued: u64,
    suspensions: u64,
}

/// Cloneable handle to one shared budget.
#[derive(Clone)]
pub struct RateLimiter {
    name: &'static str,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<LimiterState>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        let next_allowed = clock.now();
        Self {
            name,
            clock,
            state: Arc::new(Mutex::new(LimiterState {
                next_allowed,
                min_interval,
                issued: 0,
                suspensions: 0,
            })),
        }
    }

    /// No pacing between requests; only explicit suspensions delay callers.
    pub fn unpaced(name: &'static str, clock: Arc<dyn Clock>) -> Self {
        Self::new(name, Duration::ZERO, clock)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Block until a request may be issued, then reserve the slot.
    /// The lock is held while waiting so callers are admitted one at a time.
    pub fn acquire(&self) {
        let mut st = self.state.lock();
        let now = self.clock.now();
        if st.next_allowed > now {
            self.clock.sleep(st.next_allowed - now);
        }
        let now = self.clock.now();
        st.next_allowed = now.max(st.next_allowed) + st.min_interval;
        st.issued += 1;
    }

    /// Hold every caller back for `wait`, measured from now.
    pub fn suspend(&self, wait: Duration) {
        let mut st = self.state.lock();
        let until = self.clock.now() + wait;
        if until > st.next_allowed {
            st.next_allowed = until;
        }
        st.suspensions += 1;
        tracing::warn!("{}: rate limited, suspending requests for {:?}", self.name, wait);
    }

    /// Feed server-reported budget headers; an exhausted budget suspends until reset.
    pub fn observe(&self, remaining: f64, reset: Duration) {
        if remaining < 1.0 {
            self.suspend(reset);
        }
    }

    /// Requests admitted so far.
    pub fn issued(&self) -> u64 {
        self.state.lock().issued
    }

    pub fn suspensions(&self) -> u64 {
        self.state.lock().suspensions
    }
}
