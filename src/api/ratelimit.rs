//! Sliding-window rate limiting, one counter per credential (bearer token
//! hash or chat user ID), matching the `allow(credentialID) -> (allowed,
//! remaining, resetEpoch)` shape from the component design.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a single `allow` check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests remaining in the current window after this decision.
    pub remaining: u32,
    /// Unix epoch seconds at which the window resets.
    pub reset_epoch: u64,
}

/// A sliding window of request timestamps per credential, bounded to
/// `limit` requests per 60-second window.
pub struct RateLimiter {
    limit: u32,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Builds a limiter allowing `limit` requests per credential per minute.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Records a request attempt for `credential_id` and returns whether it
    /// is allowed under the sliding window, plus the remaining-count and
    /// reset-epoch headers the API front reports back to the caller.
    #[must_use]
    pub fn allow(&self, credential_id: &str) -> RateLimitDecision {
        let now = Instant::now();
        let Ok(mut windows) = self.windows.lock() else {
            return RateLimitDecision {
                allowed: true,
                remaining: self.limit,
                reset_epoch: epoch_now(),
            };
        };
        let entry = windows.entry(credential_id.to_string()).or_default();
        while let Some(&front) = entry.front() {
            if now.duration_since(front) >= WINDOW {
                entry.pop_front();
            } else {
                break;
            }
        }

        let reset_epoch = entry.front().map_or_else(epoch_now, |&oldest| epoch_now() + WINDOW.saturating_sub(now.duration_since(oldest)).as_secs());

        if entry.len() as u32 >= self.limit {
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_epoch,
            }
        } else {
            entry.push_back(now);
            RateLimitDecision {
                allowed: true,
                remaining: self.limit - entry.len() as u32,
                reset_epoch,
            }
        }
    }
}

fn epoch_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow("cred-a").allowed);
        assert!(limiter.allow("cred-a").allowed);
        let third = limiter.allow("cred-a");
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[test]
    fn credentials_are_isolated() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.allow("cred-a").allowed);
        assert!(limiter.allow("cred-b").allowed);
    }
}
