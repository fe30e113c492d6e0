//! # Throughput Sampler
//!
//! Counts packets and bytes seen by one worker and reports throughput every
//! `window` packets (a power of two). The sampler stays idle until the first
//! non-empty burst, which starts the clock; each time the cumulative packet count
//! crosses a multiple of the window a [`Sample`] is produced and the window
//! counters restart. Cumulative counters only ever grow.
//!
//! Time is passed in by the caller, so the sampler itself never reads a clock.

use crate::error::SetupError;
use std::fmt;
use std::time::{Duration, Instant};

/// Bytes (or packets) per second for `amount` over `elapsed`, 0 for an empty interval.
pub fn rate(amount: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { amount as f64 / secs } else { 0.0 }
}

/// A byte rate, printed in bits per second with a decimal prefix.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Throughput(f64);

impl Throughput {
    pub fn from_bytes(bytes: u64, elapsed: Duration) -> Self {
        Throughput(rate(bytes, elapsed))
    }

    pub fn bytes_per_sec(&self) -> f64 {
        self.0
    }

    pub fn bits_per_sec(&self) -> f64 {
        self.0 * 8.0
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.bits_per_sec();
        let (value, unit) = if bits >= 1e9 {
            (bits / 1e9, "Gbit/s")
        } else if bits >= 1e6 {
            (bits / 1e6, "Mbit/s")
        } else if bits >= 1e3 {
            (bits / 1e3, "kbit/s")
        } else {
            (bits, "bit/s")
        };
        write!(f, "{value:.2} {unit}")
    }
}

/// Throughput figures at a window boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Time since the first non-empty burst.
    pub elapsed: Duration,
    /// Time since the previous window closed.
    pub window_elapsed: Duration,
    pub total_packets: u64,
    pub total_bytes: u64,
    pub window_packets: u64,
    pub window_bytes: u64,
}

impl Sample {
    pub fn bytes_per_sec(&self) -> f64 {
        rate(self.total_bytes, self.elapsed)
    }

    pub fn packets_per_sec(&self) -> f64 {
        rate(self.total_packets, self.elapsed)
    }

    pub fn window_bytes_per_sec(&self) -> f64 {
        rate(self.window_bytes, self.window_elapsed)
    }
}

#[derive(Debug, Clone)]
pub struct ThroughputSampler {
    window: u64,
    start: Option<Instant>,
    window_start: Option<Instant>,
    total_packets: u64,
    total_bytes: u64,
    window_packets: u64,
    window_bytes: u64,
}

impl ThroughputSampler {
    /// Creates a sampler closing a window every `window` packets.
    pub fn new(window: u64) -> Result<Self, SetupError> {
        if !window.is_power_of_two() {
            return Err(SetupError::Config(format!(
                "sampling window {window} is not a power of two"
            )));
        }
        Ok(ThroughputSampler {
            window,
            start: None,
            window_start: None,
            total_packets: 0,
            total_bytes: 0,
            window_packets: 0,
            window_bytes: 0,
        })
    }

    /// Creates a sampler with a window of `2^shift` packets.
    pub fn with_window_log2(shift: u32) -> Result<Self, SetupError> {
        let window = 1u64.checked_shl(shift).filter(|w| *w != 0).ok_or_else(|| {
            SetupError::Config(format!("sampling window 2^{shift} is out of range"))
        })?;
        ThroughputSampler::new(window)
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// `true` once the first packet has been recorded.
    pub fn is_armed(&self) -> bool {
        self.start.is_some()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.start
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Adds one burst observed at `now`; returns a sample if a window closed.
    pub fn record(&mut self, now: Instant, packets: u64, bytes: u64) -> Option<Sample> {
        if packets == 0 {
            return None;
        }
        let start = *self.start.get_or_insert(now);
        let window_start = *self.window_start.get_or_insert(now);

        let before = self.total_packets;
        self.total_packets = self.total_packets.saturating_add(packets);
        self.total_bytes = self.total_bytes.saturating_add(bytes);
        self.window_packets += packets;
        self.window_bytes += bytes;

        if before / self.window == self.total_packets / self.window {
            return None;
        }
        let sample = Sample {
            elapsed: now.saturating_duration_since(start),
            window_elapsed: now.saturating_duration_since(window_start),
            total_packets: self.total_packets,
            total_bytes: self.total_bytes,
            window_packets: self.window_packets,
            window_bytes: self.window_bytes,
        };
        self.window_start = Some(now);
        self.window_packets = 0;
        self.window_bytes = 0;
        Some(sample)
    }

    /// Aggregate figures from arming until `now`, or `None` if nothing was recorded.
    pub fn finish(&self, now: Instant) -> Option<Sample> {
        let start = self.start?;
        let window_start = self.window_start.unwrap_or(start);
        Some(Sample {
            elapsed: now.saturating_duration_since(start),
            window_elapsed: now.saturating_duration_since(window_start),
            total_packets: self.total_packets,
            total_bytes: self.total_bytes,
            window_packets: self.window_packets,
            window_bytes: self.window_bytes,
        })
    }
}
