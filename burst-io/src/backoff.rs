//! Back-off for consumers polling an empty ring.
//!
//! A policy is chosen once per worker. `none` spins with a CPU hint, `fixed:<d>`
//! sleeps `d` on every empty poll and `exp:<a>..<b>` starts at `a` and doubles on
//! each consecutive empty poll up to `b`. Durations use humantime syntax,
//! e.g. `fixed:5us` or `exp:1us..1ms`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    None,
    Fixed(Duration),
    Exponential { initial: Duration, max: Duration },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed(Duration::from_micros(5))
    }
}

#[derive(Debug, Error)]
pub enum ParseBackoffError {
    #[error("unknown backoff policy {0:?}, expected none, fixed:<duration> or exp:<min>..<max>")]
    Unknown(String),
    #[error("invalid duration: {0}")]
    Duration(#[from] humantime::DurationError),
    #[error("exponential backoff needs min <= max and min > 0")]
    Range,
}

impl FromStr for BackoffPolicy {
    type Err = ParseBackoffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "none" {
            return Ok(BackoffPolicy::None);
        }
        if let Some(d) = s.strip_prefix("fixed:") {
            return Ok(BackoffPolicy::Fixed(humantime::parse_duration(d.trim())?));
        }
        if let Some(range) = s.strip_prefix("exp:") {
            let (a, b) = range
                .split_once("..")
                .ok_or_else(|| ParseBackoffError::Unknown(s.to_string()))?;
            let initial = humantime::parse_duration(a.trim())?;
            let max = humantime::parse_duration(b.trim())?;
            if initial.is_zero() || initial > max {
                return Err(ParseBackoffError::Range);
            }
            return Ok(BackoffPolicy::Exponential { initial, max });
        }
        Err(ParseBackoffError::Unknown(s.to_string()))
    }
}

impl fmt::Display for BackoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffPolicy::None => f.write_str("none"),
            BackoffPolicy::Fixed(d) => write!(f, "fixed:{}", humantime::format_duration(*d)),
            BackoffPolicy::Exponential { initial, max } => write!(
                f,
                "exp:{}..{}",
                humantime::format_duration(*initial),
                humantime::format_duration(*max)
            ),
        }
    }
}

/// Per-worker back-off state.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let mut backoff = Backoff {
            policy,
            current: Duration::ZERO,
        };
        backoff.reset();
        backoff
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// The pause the next `snooze` will take.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Waits once according to the policy.
    pub fn snooze(&mut self) {
        match self.policy {
            BackoffPolicy::None => std::hint::spin_loop(),
            BackoffPolicy::Fixed(d) => std::thread::sleep(d),
            BackoffPolicy::Exponential { max, .. } => {
                std::thread::sleep(self.current);
                self.current = (self.current * 2).min(max);
            }
        }
    }

    /// Call after a successful poll.
    pub fn reset(&mut self) {
        self.current = match self.policy {
            BackoffPolicy::None => Duration::ZERO,
            BackoffPolicy::Fixed(d) => d,
            BackoffPolicy::Exponential { initial, .. } => initial,
        };
    }
}
