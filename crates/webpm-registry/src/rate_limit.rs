//! Sliding-window rate limiter with a refilling burst allowance (spec §4.3).
//!
//! Each granted request is timestamped; on every call both logs are pruned of
//! entries older than the 60 s window before counts are checked, so the
//! budget rolls continuously rather than resetting in a single step at a
//! fixed boundary. Waiters are serviced FIFO by the caller, which always
//! retries after the oldest log entry ages out (spec §6 "the rate limiter is
//! global to a registry instance; waiters are serviced FIFO").

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

struct Window {
    requests: VecDeque<Instant>,
    bursts: VecDeque<Instant>,
}

pub struct RateLimiter {
    requests_per_minute: u32,
    burst_limit: u32,
    window: Mutex<Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(requests_per_minute: u32, burst_limit: u32) -> Self {
        Self {
            requests_per_minute,
            burst_limit,
            window: Mutex::new(Window { requests: VecDeque::new(), bursts: VecDeque::new() }),
        }
    }

    /// Records one request attempt. `Ok(())` means proceed; `Err(secs)` means
    /// the caller exhausted both the window budget and the burst allowance
    /// and should wait `secs` before retrying.
    pub fn try_acquire(&self) -> Result<(), u64> {
        let mut window = self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        prune(&mut window.requests, now);
        prune(&mut window.bursts, now);

        if (window.requests.len() as u32) < self.requests_per_minute {
            window.requests.push_back(now);
            return Ok(());
        }

        if (window.bursts.len() as u32) < self.burst_limit {
            window.bursts.push_back(now);
            return Ok(());
        }

        let oldest = oldest_of(&window.requests, &window.bursts).unwrap_or(now);
        let remaining = WINDOW.saturating_sub(now.duration_since(oldest));
        Err(remaining.as_secs().max(1))
    }
}

fn prune(log: &mut VecDeque<Instant>, now: Instant) {
    while log.front().is_some_and(|oldest| now.duration_since(*oldest) >= WINDOW) {
        log.pop_front();
    }
}

fn oldest_of(requests: &VecDeque<Instant>, bursts: &VecDeque<Instant>) -> Option<Instant> {
    match (requests.front(), bursts.front()) {
        (Some(a), Some(b)) => Some(*a.min(b)),
        (Some(a), None) => Some(*a),
        (None, Some(b)) => Some(*b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_window_limit() {
        let limiter = RateLimiter::new(2, 0);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn burst_allowance_extends_the_window_limit() {
        let limiter = RateLimiter::new(1, 2);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn the_window_rolls_instead_of_resetting_in_one_step() {
        let limiter = RateLimiter::new(1, 0);
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        // A manually-aged entry should free exactly one slot, not the whole
        // window at once, unlike a fixed-reset implementation.
        {
            let mut window = limiter.window.lock().unwrap_or_else(|p| p.into_inner());
            window.requests[0] = Instant::now() - WINDOW - Duration::from_secs(1);
        }
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());
    }
}
