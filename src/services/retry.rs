//! Retry policy for AI service calls.
//!
//! The policy itself is pure: given the number of attempts made so far it says
//! whether to try again and how long to wait first. Sleeping goes through the
//! [`Sleeper`] trait so callers can be tested without real time passing.

use futures::future::BoxFuture;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Decide what to do after `attempts_made` failed attempts (1-based).
    ///
    /// Delays start at `base_delay` and double each time.
    pub fn decide(&self, attempts_made: u32) -> RetryDecision {
        if attempts_made >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let exponent = attempts_made.saturating_sub(1).min(31);
        RetryDecision::Retry(self.base_delay.saturating_mul(1u32 << exponent))
    }

    /// A fresh stateful schedule over this policy.
    pub fn schedule(&self) -> RetrySchedule {
        RetrySchedule {
            policy: *self,
            attempts_made: 0,
        }
    }
}

/// Stateful view of a [`RetryPolicy`] for a single call.
///
/// Each `next_backoff` records one failed attempt.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    attempts_made: u32,
}

impl RetrySchedule {
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }
}

impl backoff::backoff::Backoff for RetrySchedule {
    fn reset(&mut self) {
        self.attempts_made = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.attempts_made += 1;
        match self.policy.decide(self.attempts_made) {
            RetryDecision::Retry(delay) => Some(delay),
            RetryDecision::GiveUp => None,
        }
    }
}

/// Waits between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
