//! Adaptive rate limiting with sliding-window admission control
//!
//! Two cooperating layers guard the remote API:
//!
//! - [`AdaptiveRateLimiter::acquire`] enforces proactive per-second and
//!   per-minute request budgets with FIFO timestamp windows, sleeping the
//!   calling worker thread when a window is saturated.
//! - [`RateLimiterState`] reacts to observed HTTP 429 responses with a
//!   multiplicative backoff multiplier that decays after sustained success.
//!
//! The multiplier is deliberately NOT consulted inside `acquire()`'s wait
//! computation: proactive window enforcement and reactive backoff signalling
//! stay separate and independently testable. The multiplier is exposed via
//! [`AdaptiveRateLimiter::stats`] for reporting and for callers that wish to
//! throttle themselves further.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Growth factor applied to the backoff multiplier on each 429.
const BACKOFF_GROWTH: f64 = 1.5;

/// Decay factor applied after a full success streak.
const BACKOFF_DECAY: f64 = 0.9;

/// Consecutive successes required before the multiplier decays one step.
const SUCCESS_STREAK: u32 = 10;

/// Fixed jitter added to every admission sleep so workers waking together
/// don't stampede the same window slot.
const ACQUIRE_JITTER: Duration = Duration::from_millis(25);

/// Immutable snapshot of the backoff state machine.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RateLimiterStats {
    /// Current backoff multiplier (≥ 1.0)
    pub backoff_multiplier: f64,
    /// Successes observed since the last 429
    pub consecutive_successes: u32,
    /// Total 429 responses observed over the run
    pub total_429_count: u64,
    /// Seconds since the last 429, if any was ever observed
    pub seconds_since_last_429: Option<f64>,
}

/// Pure state machine for adaptive backoff, shared across all workers.
#[derive(Debug)]
pub struct RateLimiterState {
    backoff_multiplier: f64,
    last_429: Option<Instant>,
    consecutive_successes: u32,
    total_429_count: u64,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterState {
    /// Create a fresh state with a neutral multiplier.
    pub fn new() -> Self {
        Self {
            backoff_multiplier: 1.0,
            last_429: None,
            consecutive_successes: 0,
            total_429_count: 0,
        }
    }

    /// React to an observed HTTP 429: grow the multiplier by 1.5x and reset
    /// the success streak.
    pub fn on_rate_limit_detected(&mut self) {
        self.backoff_multiplier *= BACKOFF_GROWTH;
        self.last_429 = Some(Instant::now());
        self.consecutive_successes = 0;
        self.total_429_count += 1;
        warn!(
            backoff_multiplier = self.backoff_multiplier,
            total_429_count = self.total_429_count,
            "rate limit detected, backoff multiplier increased"
        );
    }

    /// React to a successful request. Every 10th consecutive success decays
    /// the multiplier by 0.9x, floored at 1.0.
    pub fn on_success(&mut self) {
        self.consecutive_successes += 1;
        if self.consecutive_successes >= SUCCESS_STREAK {
            self.backoff_multiplier = (self.backoff_multiplier * BACKOFF_DECAY).max(1.0);
            self.consecutive_successes = 0;
            debug!(
                backoff_multiplier = self.backoff_multiplier,
                "success streak completed, backoff multiplier decayed"
            );
        }
    }

    /// Immutable snapshot of the current state.
    pub fn get_stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            backoff_multiplier: self.backoff_multiplier,
            consecutive_successes: self.consecutive_successes,
            total_429_count: self.total_429_count,
            seconds_since_last_429: self.last_429.map(|at| at.elapsed().as_secs_f64()),
        }
    }
}

#[derive(Debug, Default)]
struct AdmissionWindows {
    second: VecDeque<Instant>,
    minute: VecDeque<Instant>,
}

impl AdmissionWindows {
    fn purge(&mut self, now: Instant) {
        while self
            .second
            .front()
            .is_some_and(|&at| now.duration_since(at) >= Duration::from_secs(1))
        {
            self.second.pop_front();
        }
        while self
            .minute
            .front()
            .is_some_and(|&at| now.duration_since(at) >= Duration::from_secs(60))
        {
            self.minute.pop_front();
        }
    }
}

/// Sliding-window admission control shared by all workers of a run.
///
/// [`acquire`](Self::acquire) is the only suspension point: it sleeps the
/// calling thread outside the lock, so a saturated window never blocks other
/// workers from checking their own admission.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    windows: Mutex<AdmissionWindows>,
    state: Mutex<RateLimiterState>,
    requests_per_second: usize,
    requests_per_minute: usize,
    adaptive: bool,
}

impl AdaptiveRateLimiter {
    /// Create a limiter with the given per-window request budgets.
    ///
    /// A zero budget would never admit a request, so both budgets are clamped
    /// to at least one request per window.
    pub fn new(requests_per_minute: usize, requests_per_second: usize, adaptive: bool) -> Self {
        Self {
            windows: Mutex::new(AdmissionWindows::default()),
            state: Mutex::new(RateLimiterState::new()),
            requests_per_second: requests_per_second.max(1),
            requests_per_minute: requests_per_minute.max(1),
            adaptive,
        }
    }

    /// Block the calling thread until both windows have room, then record the
    /// request in both windows.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut windows = self.windows.lock().unwrap();
                let now = Instant::now();
                windows.purge(now);

                if windows.second.len() < self.requests_per_second
                    && windows.minute.len() < self.requests_per_minute
                {
                    windows.second.push_back(now);
                    windows.minute.push_back(now);
                    return;
                }

                // Sleep until the oldest offending entry ages out of its
                // window; the loop re-checks both windows afterwards.
                let mut wait = Duration::ZERO;
                if windows.second.len() >= self.requests_per_second {
                    if let Some(&oldest) = windows.second.front() {
                        let aged =
                            Duration::from_secs(1).saturating_sub(now.duration_since(oldest));
                        wait = wait.max(aged);
                    }
                }
                if windows.minute.len() >= self.requests_per_minute {
                    if let Some(&oldest) = windows.minute.front() {
                        let aged =
                            Duration::from_secs(60).saturating_sub(now.duration_since(oldest));
                        wait = wait.max(aged);
                    }
                }
                wait
            };

            debug!(wait_ms = wait.as_millis() as u64, "admission window saturated");
            std::thread::sleep(wait + ACQUIRE_JITTER);
        }
    }

    /// Forward a 429 signal to the backoff state machine (no-op unless
    /// adaptive mode is enabled).
    pub fn on_429_detected(&self) {
        if self.adaptive {
            self.state.lock().unwrap().on_rate_limit_detected();
        }
    }

    /// Forward a success signal to the backoff state machine (no-op unless
    /// adaptive mode is enabled).
    pub fn on_success(&self) {
        if self.adaptive {
            self.state.lock().unwrap().on_success();
        }
    }

    /// Current backoff multiplier, for reporting.
    pub fn backoff_multiplier(&self) -> f64 {
        self.state.lock().unwrap().backoff_multiplier
    }

    /// Snapshot of the backoff state machine.
    pub fn stats(&self) -> RateLimiterStats {
        self.state.lock().unwrap().get_stats()
    }
}
